/*
 * Scheduler Policies
 *
 * The policy decides, the kernel dispatches. On every kernel entry the
 * dispatcher hands the active policy a view of the process table, the
 * ready queue, the current descriptor and the remaining quantum; the
 * policy answers with a decision: keep the current descriptor, switch to a
 * specific slot, or idle until the next interrupt.
 *
 * Policies move descriptors between "running" and "ready" only through the
 * context helpers, so the queue discipline and the metric counters stay
 * consistent no matter which policy is active.
 */

use crate::process::{ProcessState, ProcessTable};
use crate::queue::{QueueOrder, ReadyQueue};

mod priority;
mod round_robin;
mod simple;

pub use priority::PriorityRr;
pub use round_robin::RoundRobin;
pub use simple::Simple;

/// Which scheduling discipline the kernel runs, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    /// Keep the current descriptor while it runs, otherwise first ready in
    /// table order. No preemption.
    Simple,
    /// Quantum-driven FIFO rotation.
    RoundRobin,
    /// Quantum-driven rotation over a priority-ordered queue with ageing.
    PriorityRr,
}

impl SchedulerKind {
    pub(crate) fn build(self) -> Box<dyn SchedPolicy> {
        match self {
            SchedulerKind::Simple => Box::new(Simple),
            SchedulerKind::RoundRobin => Box::new(RoundRobin),
            SchedulerKind::PriorityRr => Box::new(PriorityRr),
        }
    }

    /// Queue discipline the policy expects.
    pub(crate) fn queue_order(self) -> QueueOrder {
        match self {
            SchedulerKind::Simple | SchedulerKind::RoundRobin => QueueOrder::Fifo,
            SchedulerKind::PriorityRr => QueueOrder::ByPriority,
        }
    }
}

/// Outcome of one scheduling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The current descriptor stays on the CPU.
    Keep,
    /// Dispatch this slot next.
    Switch(usize),
    /// Nothing is ready; wait for the next interrupt.
    Idle,
}

/// Kernel state a policy may inspect and adjust while deciding.
pub struct SchedCtx<'a> {
    pub table: &'a mut ProcessTable,
    pub queue: &'a mut ReadyQueue,
    pub current: Option<usize>,
    pub quantum: u32,
}

impl SchedCtx<'_> {
    /// Whether the current descriptor is still on the CPU and runnable.
    pub fn current_running(&self) -> bool {
        self.current
            .and_then(|slot| self.table.get(slot))
            .is_some_and(|p| p.state == ProcessState::Running)
    }

    pub fn state_of(&self, slot: usize) -> Option<ProcessState> {
        self.table.get(slot).map(|p| p.state)
    }

    /// Return a descriptor to the ready queue under its current priority.
    pub fn requeue(&mut self, slot: usize) {
        if let Some(proc) = self.table.get_mut(slot) {
            proc.transition(ProcessState::Ready);
            let key = proc.priority;
            self.queue.push(slot, key);
        }
    }

    /// Charge an involuntary loss of the CPU to a descriptor.
    pub fn count_preemption(&mut self, slot: usize) {
        if let Some(proc) = self.table.get_mut(slot) {
            proc.metrics.preemptions += 1;
        }
    }
}

/// A scheduling discipline. Implementations only choose; the kernel owns
/// queue removal of the chosen slot, the current handle and the quantum
/// reset.
pub trait SchedPolicy {
    fn choose_next(&mut self, ctx: &mut SchedCtx<'_>) -> Decision;

    /// Policy name for logs and the metrics report.
    fn name(&self) -> &'static str;
}
