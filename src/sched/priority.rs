/*
 * Priority Round-Robin Policy
 *
 * The ready queue is ordered by ascending priority (lower runs earlier)
 * and the current descriptor is re-rated every time it comes off the CPU:
 *
 *   new = (old + t_exec / QUANTUM) / 2
 *
 * where t_exec is the part of the quantum it consumed. A descriptor that
 * burns its whole quantum drifts toward 1.0 and yields the head of the
 * queue to the ones that blocked early, which drift toward 0.0.
 */

use super::{Decision, SchedCtx, SchedPolicy};
use crate::QUANTUM;
use crate::process::ProcessState;

pub struct PriorityRr;

impl PriorityRr {
    /// Re-rate a descriptor from the share of the quantum it consumed.
    fn rerate(ctx: &mut SchedCtx<'_>, slot: usize) {
        let consumed = (QUANTUM - ctx.quantum.min(QUANTUM)) as f64 / QUANTUM as f64;
        if let Some(proc) = ctx.table.get_mut(slot) {
            proc.priority = (proc.priority + consumed) / 2.0;
        }
    }
}

impl SchedPolicy for PriorityRr {
    fn choose_next(&mut self, ctx: &mut SchedCtx<'_>) -> Decision {
        if ctx.current_running() && ctx.quantum > 0 {
            return Decision::Keep;
        }

        // The descriptor coming off the CPU gets a new rating; if it is
        // still runnable it re-enters the queue at its new position.
        let mut preempted = None;
        if let Some(cur) = ctx.current {
            match ctx.state_of(cur) {
                Some(ProcessState::Finished) | None => {}
                Some(state) => {
                    Self::rerate(ctx, cur);
                    if state == ProcessState::Running {
                        ctx.requeue(cur);
                        preempted = Some(cur);
                    }
                }
            }
        }

        match ctx.queue.head() {
            Some(next) => {
                if let Some(cur) = preempted {
                    if cur != next {
                        ctx.count_preemption(cur);
                    }
                }
                Decision::Switch(next)
            }
            None => Decision::Idle,
        }
    }

    fn name(&self) -> &'static str {
        "priority-rr"
    }
}
