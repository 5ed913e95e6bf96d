//! The finalizer processor: a background thread that runs finalization
//! callbacks per epoch, so the next epoch can begin before finalizers
//! complete.

use crate::pmcs::PMCS;
use crate::util::epoch::Epoch;
use crate::util::opaque_pointer::*;
use crate::util::ObjectReference;
use crate::vm::{Collection, GCThreadContext, ObjectModel, VMBinding};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Condvar, Mutex};

/// A batch of objects whose finalizers must still run for one epoch.
/// Produced by the sweep, consumed FIFO by the finalizer thread.
pub struct FinalizerQueue {
    objects: VecDeque<ObjectReference>,
}

impl FinalizerQueue {
    pub fn new() -> Self {
        Self {
            objects: VecDeque::new(),
        }
    }

    pub fn push(&mut self, object: ObjectReference) {
        self.objects.push_back(object);
    }

    /// Move every object of `other` into this queue.
    pub fn append(&mut self, mut other: FinalizerQueue) {
        self.objects.append(&mut other.objects);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectReference> {
        self.objects.iter()
    }
}

impl Default for FinalizerQueue {
    fn default() -> Self {
        Self::new()
    }
}

struct FinalizerBatch {
    epoch: Epoch,
    queue: FinalizerQueue,
}

struct FinalizerSync {
    batches: VecDeque<FinalizerBatch>,
    /// The finalizer thread exists and has not been stopped.
    running: bool,
    /// The thread is between popping a batch and reporting it finalized.
    in_flight: bool,
    stop_requested: bool,
}

/// Owns the finalizer thread and the epoch-ordered batch queue.
///
/// Epochs finalize strictly in order.  An epoch with no finalizable garbage
/// is reported finalized inline by [`FinalizerProcessor::schedule_tasks`] --
/// but only when no earlier batch is pending or in flight, which preserves
/// the ordering without requiring the thread to exist.
pub struct FinalizerProcessor<VM: VMBinding> {
    sync: Mutex<FinalizerSync>,
    work_available: Condvar,
    /// Signals both batch completion and thread exit.
    state_changed: Condvar,
    phantom: PhantomData<VM>,
}

impl<VM: VMBinding> FinalizerProcessor<VM> {
    pub fn new() -> Self {
        Self {
            sync: Mutex::new(FinalizerSync {
                batches: VecDeque::new(),
                running: false,
                in_flight: false,
                stop_requested: false,
            }),
            work_available: Condvar::new(),
            state_changed: Condvar::new(),
            phantom: PhantomData,
        }
    }

    /// Enqueue the finalizer batch of `epoch`.  Returns immediately; the
    /// caller must not hold the GC mutex (starting the thread may block on
    /// OS primitives that themselves acquire library-global locks).
    pub fn schedule_tasks(&self, pmcs: &'static PMCS<VM>, queue: FinalizerQueue, epoch: Epoch) {
        let start_thread = {
            let mut sync = self.sync.lock().unwrap();
            if queue.is_empty() && sync.batches.is_empty() && !sync.in_flight {
                // Nothing to run and nothing pending: the epoch finalizes
                // trivially, in order, without needing the thread.
                drop(sync);
                pmcs.epoch_states.finalized(epoch);
                return;
            }
            debug!(
                "Scheduling {} finalizers for epoch {}",
                queue.len(),
                epoch
            );
            sync.batches.push_back(FinalizerBatch { epoch, queue });
            self.work_available.notify_all();
            !sync.running
        };
        if start_thread {
            self.start_finalizer_thread_if_none(pmcs, VMThread::UNINITIALIZED);
        }
    }

    /// Start the finalizer thread if it is not running.  Returns true if this
    /// call started it.
    pub fn start_finalizer_thread_if_none(&self, pmcs: &'static PMCS<VM>, tls: VMThread) -> bool {
        {
            let mut sync = self.sync.lock().unwrap();
            if sync.running {
                return false;
            }
            sync.running = true;
            sync.stop_requested = false;
        }
        debug!("Starting the finalizer thread");
        VM::VMCollection::spawn_gc_thread(
            tls,
            GCThreadContext::Finalizer(Box::new(FinalizerThread { pmcs })),
        );
        true
    }

    /// Stop the finalizer thread and wait for it to exit.  Batches already
    /// scheduled are drained (and their epochs finalized) first.
    pub fn stop_finalizer_thread(&self) {
        let mut sync = self.sync.lock().unwrap();
        if !sync.running {
            return;
        }
        debug!("Stopping the finalizer thread");
        sync.stop_requested = true;
        self.work_available.notify_all();
        while sync.running {
            sync = self.state_changed.wait(sync).unwrap();
        }
    }

    /// Is the finalizer thread running?
    pub fn is_running(&self) -> bool {
        self.sync.lock().unwrap().running
    }
}

impl<VM: VMBinding> Default for FinalizerProcessor<VM> {
    fn default() -> Self {
        Self::new()
    }
}

/// The finalizer thread's context; its `run` loop drains batches FIFO and
/// reports each epoch finalized once all of its finalizers have returned.
pub struct FinalizerThread<VM: VMBinding> {
    pmcs: &'static PMCS<VM>,
}

impl<VM: VMBinding> FinalizerThread<VM> {
    pub fn run(&mut self, _tls: VMWorkerThread) {
        let processor = &self.pmcs.finalizer;
        loop {
            let batch = {
                let mut sync = processor.sync.lock().unwrap();
                loop {
                    if let Some(batch) = sync.batches.pop_front() {
                        sync.in_flight = true;
                        break batch;
                    }
                    if sync.stop_requested {
                        sync.running = false;
                        processor.state_changed.notify_all();
                        return;
                    }
                    sync = processor.work_available.wait(sync).unwrap();
                }
            };

            trace!(
                "Running {} finalizers for epoch {}",
                batch.queue.len(),
                batch.epoch
            );
            for object in batch.queue.iter() {
                // A finalizer that panics is caught and logged; it does not
                // abort the loop, and the epoch still finalizes normally.
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    VM::VMObjectModel::finalize(*object);
                }));
                if let Err(e) = result {
                    error!("Finalizer for {} panicked: {:?}", object, e);
                }
            }

            self.pmcs.epoch_states.finalized(batch.epoch);
            let mut sync = processor.sync.lock().unwrap();
            sync.in_flight = false;
        }
    }
}
