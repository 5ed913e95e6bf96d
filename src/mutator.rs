//! Per-mutator GC state.  Every registered mutator owns one
//! [`MutatorContext`]; the binding stores it (usually in TLS) and enumerates
//! it through its thread registry.

use crate::pmcs::PMCS;
use crate::util::opaque_pointer::*;
use crate::vm::{Collection, VMBinding};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-mutator GC state: the safepoint hook and the three per-epoch flags.
///
/// All three flags are reset between epochs by the dispatcher.  Sets use
/// release ordering and reads use acquire ordering throughout, so whoever
/// observes a flag also observes the work it covers (a locked root set
/// happens-before any read of those roots; a published buffer happens-before
/// the sweep reading its objects).
pub struct MutatorContext<VM: VMBinding> {
    tls: VMMutatorThread,
    /// Claimed by whichever agent scans this mutator's roots this epoch.
    root_set_locked: AtomicBool,
    /// This mutator entered cooperative-marking mode this epoch.
    cooperative: AtomicBool,
    /// This mutator's thread-local allocation buffer has been flushed to the
    /// global allocator.
    published: AtomicBool,
    phantom: PhantomData<VM>,
}

impl<VM: VMBinding> MutatorContext<VM> {
    pub(crate) fn new(tls: VMMutatorThread) -> Self {
        Self {
            tls,
            root_set_locked: AtomicBool::new(false),
            cooperative: AtomicBool::new(false),
            published: AtomicBool::new(false),
            phantom: PhantomData,
        }
    }

    /// The thread this context belongs to.
    pub fn tls(&self) -> VMMutatorThread {
        self.tls
    }

    /// Attempt to claim scanning rights for this mutator's root set.  Exactly
    /// one agent per epoch succeeds.
    pub fn try_lock_root_set(&self) -> bool {
        self.root_set_locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Has this mutator's root set been claimed this epoch?
    pub fn is_root_set_locked(&self) -> bool {
        self.root_set_locked.load(Ordering::Acquire)
    }

    /// Did this mutator assist with marking this epoch?
    pub fn is_cooperative(&self) -> bool {
        self.cooperative.load(Ordering::Acquire)
    }

    pub(crate) fn set_cooperative(&self) {
        self.cooperative.store(true, Ordering::Release);
    }

    /// Has this mutator's allocation buffer been published this epoch?
    pub fn is_published(&self) -> bool {
        self.published.load(Ordering::Acquire)
    }

    /// Flush this mutator's thread-local allocations to the shared pool so
    /// the sweeper can see them.  Idempotent per epoch; called during
    /// stop-the-world by either the mutator itself (after a root scan) or the
    /// GC thread.
    pub fn publish_object_factory(&self) {
        if self
            .published
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            use crate::vm::Allocation;
            VM::VMAllocation::publish(self.tls);
        }
    }

    /// Reset the per-epoch flags.  Called by the dispatcher between epochs,
    /// under the registry iteration lock.
    pub fn clear_mark_flags(&self) {
        self.published.store(false, Ordering::Release);
        self.cooperative.store(false, Ordering::Release);
        self.root_set_locked.store(false, Ordering::Release);
    }

    /// The safepoint hook, called at compiler-inserted points and before any
    /// blocking call.  The fast path is a single flag load; the slow path
    /// runs the suspension hook once and parks until the GC releases this
    /// mutator.
    pub fn safe_point(&self, pmcs: &PMCS<VM>) {
        if pmcs.state.is_stw_requested() {
            self.park_until_resumed(pmcs);
        }
    }

    /// Invoked while parking; delegates to the dispatcher's suspension hook.
    pub fn on_suspend_for_gc(&self, pmcs: &PMCS<VM>) {
        pmcs.scheduler.on_mutator_suspension(self);
    }

    fn park_until_resumed(&self, pmcs: &PMCS<VM>) {
        trace!("Mutator {:?} parking for GC", self.tls);
        self.on_suspend_for_gc(pmcs);
        pmcs.scheduler.rendezvous.mutator_parked();
        // Instead of sleeping straight away, a parked mutator may spend the
        // marking phase as an extra traversal worker.
        #[cfg(feature = "cooperative_marking")]
        pmcs.scheduler.assist_while_parked(self);
        VM::VMCollection::park_for_gc(self.tls);
        pmcs.scheduler.rendezvous.mutator_resumed();
        trace!("Mutator {:?} resumed", self.tls);
    }

    /// Allocation failed: synchronously schedule a collection and block until
    /// it finishes.  While blocked, this mutator counts as implicitly
    /// suspended -- its roots are claimed and scanned by a GC thread.
    pub fn on_oom(&self, pmcs: &PMCS<VM>, size: usize) {
        warn!(
            "Mutator {:?} failed to allocate {} bytes; forcing a collection",
            self.tls, size
        );
        let epoch = pmcs.requester.request();
        pmcs.scheduler.rendezvous.mutator_parked();
        pmcs.epoch_states.wait_epoch_finished(epoch);
        pmcs.scheduler.rendezvous.mutator_resumed();
    }
}
