/*
 * Round-Robin Policy
 *
 * FIFO rotation driven by the quantum. The timer IRQ burns one quantum
 * tick per interrupt; once the quantum is exhausted the current descriptor
 * goes to the tail of the queue, its preemption counter is charged, and
 * the head of the queue is dispatched with a fresh quantum.
 *
 * A descriptor that blocks or finishes gives up the CPU immediately and
 * the head runs next, without a preemption charge.
 */

use super::{Decision, SchedCtx, SchedPolicy};

pub struct RoundRobin;

impl SchedPolicy for RoundRobin {
    fn choose_next(&mut self, ctx: &mut SchedCtx<'_>) -> Decision {
        if ctx.current_running() {
            if ctx.quantum > 0 {
                return Decision::Keep;
            }
            // Quantum exhausted: rotate the current descriptor to the tail.
            if let Some(cur) = ctx.current {
                ctx.requeue(cur);
                ctx.count_preemption(cur);
            }
        }
        match ctx.queue.head() {
            Some(next) => Decision::Switch(next),
            None => Decision::Idle,
        }
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}
