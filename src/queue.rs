/*
 * Ready Queue
 *
 * Doubly-linked list of the descriptors that are ready to run. The queue
 * never owns a descriptor: nodes are slot indices into the process table,
 * and the links live in a fixed array parallel to the table, so membership
 * tests and removal are O(1) lookups plus pointer surgery.
 *
 * Insertion order is the scheduling key. FIFO appends at the tail;
 * priority order inserts before the first node with a strictly larger key,
 * which keeps equal keys in arrival order.
 */

use crate::MAX_PROCS;

/// Insertion discipline, fixed by the scheduling policy at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOrder {
    /// Arrival order.
    Fifo,
    /// Non-decreasing key, ties in arrival order.
    ByPriority,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    next: Option<usize>,
    prev: Option<usize>,
    key: f64,
}

/// The ready queue. A slot is linked here iff its descriptor is `Ready`.
#[derive(Debug)]
pub struct ReadyQueue {
    order: QueueOrder,
    head: Option<usize>,
    tail: Option<usize>,
    links: [Option<Link>; MAX_PROCS],
    len: usize,
}

impl ReadyQueue {
    pub fn new(order: QueueOrder) -> Self {
        ReadyQueue {
            order,
            head: None,
            tail: None,
            links: [None; MAX_PROCS],
            len: 0,
        }
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }

    /// First slot in queue order.
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.links.get(slot).is_some_and(|l| l.is_some())
    }

    /// Link a slot into the queue under the given key. The key is ignored
    /// under FIFO order. Linking an already-queued slot is a bug upstream
    /// and is left unchanged.
    pub fn push(&mut self, slot: usize, key: f64) {
        debug_assert!(slot < MAX_PROCS, "slot {slot} outside the table");
        if self.contains(slot) {
            debug_assert!(false, "slot {slot} pushed twice");
            return;
        }
        let at = match self.order {
            QueueOrder::Fifo => None,
            QueueOrder::ByPriority => {
                let mut at = self.head;
                while let Some(i) = at {
                    match self.links[i] {
                        Some(link) if link.key > key => break,
                        Some(link) => at = link.next,
                        None => break,
                    }
                }
                at
            }
        };
        self.insert_before(at, slot, key);
    }

    /// Unlink a slot. Returns whether it was queued.
    pub fn remove(&mut self, slot: usize) -> bool {
        let Some(link) = self.links.get_mut(slot).and_then(Option::take) else {
            return false;
        };
        match link.prev {
            Some(p) => {
                if let Some(l) = self.links[p].as_mut() {
                    l.next = link.next;
                }
            }
            None => self.head = link.next,
        }
        match link.next {
            Some(n) => {
                if let Some(l) = self.links[n].as_mut() {
                    l.prev = link.prev;
                }
            }
            None => self.tail = link.prev,
        }
        self.len -= 1;
        true
    }

    /// Slots in queue order, front to back.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        core::iter::successors(self.head, move |&i| self.links[i].and_then(|l| l.next))
    }

    fn insert_before(&mut self, at: Option<usize>, slot: usize, key: f64) {
        let prev = match at {
            Some(i) => self.links[i].and_then(|l| l.prev),
            None => self.tail,
        };
        self.links[slot] = Some(Link {
            next: at,
            prev,
            key,
        });
        match prev {
            Some(p) => {
                if let Some(l) = self.links[p].as_mut() {
                    l.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        match at {
            Some(i) => {
                if let Some(l) = self.links[i].as_mut() {
                    l.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }
        self.len += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(q: &ReadyQueue) -> Vec<usize> {
        q.iter().collect()
    }

    #[test]
    fn fifo_keeps_arrival_order() {
        let mut q = ReadyQueue::new(QueueOrder::Fifo);
        q.push(2, 0.9);
        q.push(0, 0.1);
        q.push(1, 0.5);
        assert_eq!(drain(&q), vec![2, 0, 1]);
        assert_eq!(q.head(), Some(2));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn priority_order_is_non_decreasing_with_stable_ties() {
        let mut q = ReadyQueue::new(QueueOrder::ByPriority);
        q.push(0, 0.5);
        q.push(1, 0.5);
        q.push(2, 0.75);
        q.push(3, 0.5);
        q.push(4, 0.25);
        assert_eq!(drain(&q), vec![4, 0, 1, 3, 2]);
    }

    #[test]
    fn remove_head_middle_and_tail() {
        let mut q = ReadyQueue::new(QueueOrder::Fifo);
        for slot in 0..5 {
            q.push(slot, 0.0);
        }
        assert!(q.remove(0));
        assert!(q.remove(2));
        assert!(q.remove(4));
        assert_eq!(drain(&q), vec![1, 3]);
        assert!(!q.remove(0));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn removing_the_last_slot_empties_the_queue() {
        let mut q = ReadyQueue::new(QueueOrder::Fifo);
        q.push(3, 0.0);
        assert!(q.remove(3));
        assert!(q.is_empty());
        assert_eq!(q.head(), None);
        q.push(1, 0.0);
        assert_eq!(drain(&q), vec![1]);
    }

    #[test]
    fn reinsert_after_remove_goes_to_the_new_position() {
        let mut q = ReadyQueue::new(QueueOrder::ByPriority);
        q.push(0, 0.5);
        q.push(1, 0.5);
        assert!(q.remove(0));
        q.push(0, 0.75);
        assert_eq!(drain(&q), vec![1, 0]);
    }

    #[test]
    fn contains_tracks_membership() {
        let mut q = ReadyQueue::new(QueueOrder::Fifo);
        assert!(!q.contains(1));
        q.push(1, 0.0);
        assert!(q.contains(1));
        q.remove(1);
        assert!(!q.contains(1));
    }
}
