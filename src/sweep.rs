//! The sweep driver.  Runs on the controller after mutators have been
//! resumed, concurrently with the application.  Reclaims every unmarked
//! object, resets the marks of the survivors (tri-color: survivors become
//! white for the next epoch), and collects the epoch's finalizer queue.
//!
//! The integration with the allocator is chosen at compile time via
//! [`Allocation::NATIVE_SWEEP`]; the `if` below is on an associated constant
//! and monomorphizes into a single path.

use crate::finalizer::FinalizerQueue;
use crate::pmcs::PMCS;
use crate::util::epoch::{Epoch, GCHandle};
use crate::vm::{Allocation, ObjectModel, ThreadRegistry, VMBinding};

pub(crate) fn sweep<VM: VMBinding>(
    pmcs: &PMCS<VM>,
    epoch: Epoch,
    handle: &mut GCHandle,
    factory_lock: <VM::VMAllocation as Allocation<VM>>::FactoryLockGuard,
) -> FinalizerQueue {
    let queue = if <VM::VMAllocation as Allocation<VM>>::NATIVE_SWEEP {
        native_sweep::<VM>(pmcs, epoch)
    } else {
        generic_sweep::<VM>(pmcs, handle)
    };
    // The factory iteration lock was taken before stop-the-world ended and
    // stays held until the whole sweep is done.
    drop(factory_lock);
    queue
}

/// Generic path: iterate the global object factory and decide per object.
/// The extra-object registry is swept first, while this epoch's marks are
/// still set, because the object pass clears them.
fn generic_sweep<VM: VMBinding>(pmcs: &PMCS<VM>, handle: &mut GCHandle) -> FinalizerQueue {
    let mut queue = FinalizerQueue::new();
    let queued = pmcs.extra_objects.sweep_registry(&mut queue, true);

    let mut reclaimed = 0usize;
    VM::VMAllocation::retain_objects(|object| {
        if VM::VMObjectModel::try_reset_mark(object) {
            // Live this epoch; now white for the next.
            return true;
        }
        if queued.contains(&object) {
            // Dead, but its finalizer still has to run; keep the storage
            // until the epoch after the finalizer.
            return true;
        }
        reclaimed += 1;
        false
    });
    handle.reclaimed = reclaimed;
    debug!(
        "Sweep reclaimed {} objects, queued {} finalizers",
        reclaimed,
        queue.len()
    );
    queue
}

/// Native path: the allocator sweeps its own regions, then the per-mutator
/// local finalizer queues and heap-level leftovers are drained into the
/// global queue.  The epoch's handoff happens before the next epoch's sweep
/// can begin, because the controller schedules the batch before releasing
/// control.
fn native_sweep<VM: VMBinding>(pmcs: &PMCS<VM>, epoch: Epoch) -> FinalizerQueue {
    // Entries whose base died still leave the registry, and weak cells are
    // still cleared; the allocator owns reclamation and finalizer tracking.
    let mut queue = FinalizerQueue::new();
    let _queued = pmcs.extra_objects.sweep_registry(&mut queue, false);

    queue.append(VM::VMAllocation::sweep(epoch));
    {
        let _guard = VM::VMThreadRegistry::lock_for_iter();
        for mutator in VM::VMThreadRegistry::mutators() {
            queue.append(VM::VMAllocation::drain_local_finalizables(mutator));
        }
    }
    queue.append(VM::VMAllocation::drain_heap_finalizables());
    debug!("Native sweep queued {} finalizers", queue.len());
    queue
}
