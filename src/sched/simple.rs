/*
 * Simple Policy
 *
 * Keep the current descriptor for as long as it is runnable; when it gives
 * up the CPU, take the first ready descriptor in table order. The quantum
 * is ignored, so a CPU-bound process runs until it blocks or finishes.
 */

use super::{Decision, SchedCtx, SchedPolicy};
use crate::process::ProcessState;

pub struct Simple;

impl SchedPolicy for Simple {
    fn choose_next(&mut self, ctx: &mut SchedCtx<'_>) -> Decision {
        if ctx.current_running() {
            return Decision::Keep;
        }
        for slot in 0..ctx.table.len() {
            if ctx.state_of(slot) == Some(ProcessState::Ready) {
                return Decision::Switch(slot);
            }
        }
        Decision::Idle
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QUANTUM;
    use crate::process::ProcessTable;
    use crate::queue::{QueueOrder, ReadyQueue};

    fn fixture(n: usize) -> (ProcessTable, ReadyQueue) {
        let mut table = ProcessTable::new();
        let mut queue = ReadyQueue::new(QueueOrder::Fifo);
        for slot in 0..n {
            let _ = table.create(0);
            queue.push(slot, 0.5);
        }
        (table, queue)
    }

    #[test]
    fn keeps_a_running_descriptor_even_without_quantum() {
        let (mut table, mut queue) = fixture(2);
        queue.remove(0);
        table.get_mut(0).unwrap().transition(ProcessState::Running);
        let mut ctx = SchedCtx {
            table: &mut table,
            queue: &mut queue,
            current: Some(0),
            quantum: 0,
        };
        assert_eq!(Simple.choose_next(&mut ctx), Decision::Keep);
    }

    #[test]
    fn picks_the_first_ready_slot_in_table_order() {
        let (mut table, mut queue) = fixture(3);
        queue.remove(0);
        table.get_mut(0).unwrap().transition(ProcessState::Finished);
        let mut ctx = SchedCtx {
            table: &mut table,
            queue: &mut queue,
            current: Some(0),
            quantum: QUANTUM,
        };
        assert_eq!(Simple.choose_next(&mut ctx), Decision::Switch(1));
    }

    #[test]
    fn idles_when_nothing_is_ready() {
        let (mut table, mut queue) = fixture(1);
        queue.remove(0);
        table.get_mut(0).unwrap().transition(ProcessState::Finished);
        let mut ctx = SchedCtx {
            table: &mut table,
            queue: &mut queue,
            current: None,
            quantum: 0,
        };
        assert_eq!(Simple.choose_next(&mut ctx), Decision::Idle);
    }
}
