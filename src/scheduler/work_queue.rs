//! The mark queue: the worklist of references discovered live but whose
//! fields are not yet scanned.
//!
//! The queue is an unordered multiset with concurrent producers and
//! consumers.  Each auxiliary worker owns a local deque for its own pushes
//! and pops; everything else (roots, cooperating mutators, overflow) goes
//! through a global injector.  Markers that run dry steal from each other.

use crate::util::ObjectReference;
use crossbeam::deque::{Injector, Steal, Stealer, Worker};

/// A marker's private end of the queue.  Not `Sync`; owned by exactly one
/// marker thread at a time.
pub(crate) type LocalQueue = Worker<ObjectReference>;

/// The shared part of the mark queue.
pub(crate) struct MarkQueue {
    injector: Injector<ObjectReference>,
    /// One stealer per auxiliary worker's local deque.  Fixed at pool
    /// construction; rebuilding the pool rebuilds the queue.
    stealers: Vec<Stealer<ObjectReference>>,
}

impl MarkQueue {
    /// Create the queue along with `local_count` local deques for the
    /// auxiliary workers.  The controller and cooperating mutators use
    /// unregistered locals (or the injector directly); their deques are
    /// always drained before those markers deactivate, so the emptiness
    /// check below stays sound.
    pub fn new(local_count: usize) -> (Self, Vec<LocalQueue>) {
        let locals: Vec<LocalQueue> = (0..local_count).map(|_| Worker::new_fifo()).collect();
        let stealers = locals.iter().map(|w| w.stealer()).collect();
        let queue = MarkQueue {
            injector: Injector::new(),
            stealers,
        };
        (queue, locals)
    }

    /// Push a reference for later field scanning.  The object must already be
    /// marked by the pusher (`try_mark` returned true), which keeps each
    /// object's scan unique.
    pub fn push(&self, object: ObjectReference) {
        self.injector.push(object);
    }

    /// Get a reference to scan, without retry.
    fn pop_once(&self, local: &LocalQueue) -> Steal<ObjectReference> {
        // Try the marker's own deque first.
        if let Some(object) = local.pop() {
            return Steal::Success(object);
        }
        let mut should_retry = false;
        // Then take a batch from the injector.
        match self.injector.steal_batch_and_pop(local) {
            Steal::Success(object) => return Steal::Success(object),
            Steal::Retry => should_retry = true,
            Steal::Empty => {}
        }
        // Finally steal from other markers.
        for stealer in &self.stealers {
            match stealer.steal() {
                Steal::Success(object) => return Steal::Success(object),
                Steal::Retry => should_retry = true,
                Steal::Empty => {}
            }
        }
        if should_retry {
            Steal::Retry
        } else {
            Steal::Empty
        }
    }

    /// Get a reference to scan.  Returns `None` only when every queue was
    /// observed empty.
    pub fn pop(&self, local: &LocalQueue) -> Option<ObjectReference> {
        loop {
            match self.pop_once(local) {
                Steal::Success(object) => return Some(object),
                Steal::Retry => {
                    std::thread::yield_now();
                    continue;
                }
                Steal::Empty => return None,
            }
        }
    }

    /// Is every shared queue empty?  Local deques of active markers may still
    /// hold work; termination detection only consults this after the last
    /// marker has deactivated, at which point all locals are drained.
    pub fn is_empty(&self) -> bool {
        self.injector.is_empty() && self.stealers.iter().all(|s| s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Address;

    fn obj(raw: usize) -> ObjectReference {
        ObjectReference::from_raw_address(unsafe { Address::from_usize(raw) }).unwrap()
    }

    #[test]
    fn pop_prefers_local_work() {
        let (queue, mut locals) = MarkQueue::new(1);
        let local = locals.pop().unwrap();
        queue.push(obj(0x1000));
        local.push(obj(0x2000));
        assert_eq!(queue.pop(&local), Some(obj(0x2000)));
        assert_eq!(queue.pop(&local), Some(obj(0x1000)));
        assert_eq!(queue.pop(&local), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn markers_steal_from_each_other() {
        let (queue, mut locals) = MarkQueue::new(2);
        let thief_local = locals.pop().unwrap();
        let victim_local = locals.pop().unwrap();
        for i in 1..=4 {
            victim_local.push(obj(i * 0x100));
        }
        // The thief's own deque and the injector are empty, so it must steal.
        assert!(queue.pop(&thief_local).is_some());
        assert!(!queue.is_empty());
        while queue.pop(&victim_local).is_some() {}
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_producers_and_consumers_drain() {
        let (queue, locals) = MarkQueue::new(4);
        let total = 4 * 1000;
        let popped = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for local in locals {
                let queue = &queue;
                let popped = &popped;
                scope.spawn(move || {
                    for i in 1..=1000 {
                        queue.push(obj(i * 8));
                    }
                    while queue.pop(&local).is_some() {
                        popped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                });
            }
        });
        // A worker may give up while others are still pushing, but every item
        // is popped by whichever worker drains last; nothing is lost.
        assert!(queue.is_empty());
        assert_eq!(popped.load(std::sync::atomic::Ordering::Relaxed), total);
    }
}
