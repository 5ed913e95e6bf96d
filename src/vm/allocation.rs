use crate::finalizer::FinalizerQueue;
use crate::mutator::MutatorContext;
use crate::util::epoch::Epoch;
use crate::util::opaque_pointer::*;
use crate::util::ObjectReference;
use crate::vm::VMBinding;

/// The runtime's object allocator.  PMCS does not manage memory itself; it
/// asks the allocator to produce objects and, during the sweep, to surrender
/// the dead ones.
///
/// The allocator contract during a collection:
/// * objects allocated while the sweep runs concurrently with mutators are
///   born unmarked AND excluded from the current epoch's iteration set;
/// * a mutator's thread-local allocation buffer becomes visible to the sweep
///   only after [`Allocation::publish`] for that thread.
///
/// Two sweep integrations exist, selected at compile time through
/// [`Allocation::NATIVE_SWEEP`] (the branch is monomorphized away; there is
/// no runtime dispatch in the sweep hot loop):
/// * generic (`NATIVE_SWEEP = false`): PMCS iterates the object factory via
///   [`Allocation::retain_objects`] and decides per object;
/// * native (`NATIVE_SWEEP = true`): the allocator sweeps its own regions in
///   [`Allocation::sweep`] and returns the finalizer queue.
pub trait Allocation<VM: VMBinding> {
    /// Whether the allocator exposes its own sweeping interface.
    const NATIVE_SWEEP: bool = false;

    /// The guard returned by [`Allocation::lock_object_factory`].  The
    /// controller acquires it before stop-the-world ends and holds it across
    /// the sweep, so a terminating thread cannot publish into global state at
    /// an unexpected time.
    type FactoryLockGuard;

    /// Allocate an object of the given type.  Returns `None` on exhaustion;
    /// PMCS then forces a collection and retries before reporting OOM.
    fn allocate_object(
        tls: VMMutatorThread,
        type_info: &'static VM::VMTypeInfo,
    ) -> Option<ObjectReference>;

    /// Allocate an array of the given type and length.
    fn allocate_array(
        tls: VMMutatorThread,
        type_info: &'static VM::VMTypeInfo,
        length: usize,
    ) -> Option<ObjectReference>;

    /// The byte size an object of this type occupies.  Used for OOM
    /// reporting before any object exists.
    fn size_of(type_info: &'static VM::VMTypeInfo) -> usize;

    /// The byte size an array of this type and length occupies.
    fn size_of_array(type_info: &'static VM::VMTypeInfo, length: usize) -> usize;

    /// Flush the thread-local allocation buffer of `tls` to the global
    /// object factory, so the sweeper can see its objects.  Called during
    /// stop-the-world by either the mutator itself or the GC thread.
    fn publish(tls: VMMutatorThread);

    /// Called at the start of a collection, before any marking.
    fn prepare_for_gc();

    /// Lock the global object factory against publication.
    fn lock_object_factory() -> Self::FactoryLockGuard;

    /// Total bytes currently allocated.  Reported to the external scheduler
    /// at the end of each collection.
    fn allocated_bytes() -> usize;

    /// Generic sweep support: present every object of the current epoch's
    /// iteration set to `retain`, freeing those for which it returns false.
    /// Only called when `NATIVE_SWEEP` is false.
    fn retain_objects(retain: impl FnMut(ObjectReference) -> bool) {
        let _ = retain;
        unreachable!("retain_objects called on an allocator with NATIVE_SWEEP");
    }

    /// Native sweep: reclaim all unmarked objects, reset the marks of the
    /// survivors, and return the objects awaiting finalization.  Only called
    /// when `NATIVE_SWEEP` is true.
    fn sweep(epoch: Epoch) -> FinalizerQueue {
        let _ = epoch;
        unreachable!("sweep called on an allocator without NATIVE_SWEEP");
    }

    /// Native sweep: drain one mutator's local finalizer queue.  Only called
    /// when `NATIVE_SWEEP` is true.
    fn drain_local_finalizables(mutator: &MutatorContext<VM>) -> FinalizerQueue {
        let _ = mutator;
        FinalizerQueue::new()
    }

    /// Native sweep: drain heap-level finalizable leftovers that belong to no
    /// mutator.  Only called when `NATIVE_SWEEP` is true.
    fn drain_heap_finalizables() -> FinalizerQueue {
        FinalizerQueue::new()
    }
}
