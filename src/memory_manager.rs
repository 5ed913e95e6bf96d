//! VM-to-PMCS interface: the functions a runtime calls into.
//!
//! This module covers initialization, thread registration, object creation,
//! safepoint entry, collection requests and waits, the finalizer-thread
//! lifecycle, weak-reference loads, reconfiguration and shutdown.  Functions
//! in this module operate on a [`PMCS`] instance the binding keeps at a
//! stable address for the life of the process.

use crate::mutator::MutatorContext;
use crate::pmcs::{PMCSBuilder, PMCS};
use crate::scheduler::GCController;
use crate::util::epoch::Epoch;
use crate::util::extra_objects::ExtraObjectData;
use crate::util::opaque_pointer::*;
use crate::util::{Address, ObjectReference};
use crate::vm::{
    Allocation, AllocationError, Collection, GCThreadContext, ObjectModel, VMBinding,
};
use atomic::{Atomic, Ordering};
use std::sync::Arc;

/// How many forced collections an allocation may trigger before the failure
/// is reported to the binding as an out-of-memory condition.
const MAX_COLLECTION_ATTEMPTS: usize = 3;

/// Build a PMCS instance from a builder.  This also initializes the built-in
/// logger (if the `builtin_env_logger` feature is enabled).
pub fn pmcs_init<VM: VMBinding>(builder: &PMCSBuilder) -> Box<PMCS<VM>> {
    crate::util::logger::try_init();
    let pmcs = Box::new(builder.build());
    info!(
        "PMCS initialized (aux workers: {}, max parallelism: {}, cooperate: {})",
        *pmcs.options.threads,
        *pmcs.options.max_parallelism,
        *pmcs.options.mutators_cooperate
    );
    pmcs
}

/// Spawn the GC threads (the controller and the auxiliary mark workers) and
/// make the instance ready for collection.  `tls` identifies the requesting
/// thread and is passed through to
/// [`crate::vm::Collection::spawn_gc_thread`].
pub fn initialize_collection<VM: VMBinding>(pmcs: &'static PMCS<VM>, tls: VMThread) {
    assert!(
        !pmcs.state.is_initialized(),
        "initialize_collection called twice"
    );
    VM::VMCollection::spawn_gc_thread(tls, GCThreadContext::Controller(GCController::new(pmcs)));
    pmcs.scheduler.spawn_gc_threads(tls);
    pmcs.state
        .initialized
        .store(true, std::sync::atomic::Ordering::SeqCst);
    info!("Collection initialized");
}

/// Create the per-thread GC state for a newly registered mutator.  The
/// binding stores the returned context (usually in TLS) and makes it visible
/// through its thread registry.  Registration must behave like a safepoint:
/// a thread that registers while a stop-the-world is being established has
/// to reach [`on_safe_point`] before touching the heap, so the rendezvous
/// can count it.
pub fn bind_mutator<VM: VMBinding>(
    _pmcs: &PMCS<VM>,
    tls: VMMutatorThread,
) -> Box<MutatorContext<VM>> {
    debug!("Binding mutator {:?}", tls);
    Box::new(MutatorContext::new(tls))
}

/// Reclaim a de-registered mutator's context.  The binding must have removed
/// the thread from its registry first; this re-evaluates the stop-the-world
/// rendezvous so a collection waiting on the departed thread can proceed.
/// Any roots the thread's scan had partially discovered stay in the mark
/// queue; de-registration published all of its objects, so nothing escapes.
pub fn destroy_mutator<VM: VMBinding>(pmcs: &PMCS<VM>, mutator: Box<MutatorContext<VM>>) {
    debug!("Destroying mutator {:?}", mutator.tls());
    pmcs.scheduler.rendezvous.registry_changed();
    drop(mutator);
}

/// The safepoint entry point, called at compiler-inserted points and before
/// any blocking call.  Cheap when nothing is pending: a single flag load.
pub fn on_safe_point<VM: VMBinding>(pmcs: &PMCS<VM>, mutator: &MutatorContext<VM>) {
    mutator.safe_point(pmcs);
}

/// The suspension hook, for bindings that park mutators through their own
/// machinery (e.g. signals) instead of [`on_safe_point`].  Must be invoked
/// exactly once per parked mutator per stop-the-world.
pub fn on_suspend_for_gc<VM: VMBinding>(pmcs: &PMCS<VM>, mutator: &MutatorContext<VM>) {
    mutator.on_suspend_for_gc(pmcs);
}

/// Request a collection.  Returns the epoch the collection will run as;
/// consecutive requests collapse into the same epoch until it starts.
/// Non-blocking.
pub fn schedule_gc<VM: VMBinding>(pmcs: &PMCS<VM>) -> Epoch {
    pmcs.requester.request()
}

/// Block until `epoch` has finished its sweep (or shutdown occurred).
pub fn wait_epoch_finished<VM: VMBinding>(pmcs: &PMCS<VM>, epoch: Epoch) {
    pmcs.epoch_states.wait_epoch_finished(epoch);
}

/// Block until every finalizer of `epoch` has returned (or shutdown
/// occurred).
pub fn wait_epoch_finalized<VM: VMBinding>(pmcs: &PMCS<VM>, epoch: Epoch) {
    pmcs.epoch_states.wait_epoch_finalized(epoch);
}

/// Allocate an object.  On exhaustion, forces collections (blocking the
/// caller as implicitly suspended) and retries; after
/// `MAX_COLLECTION_ATTEMPTS` failed rounds the binding's `out_of_memory` is
/// invoked and the allocator surfaces the failure.
pub fn create_object<VM: VMBinding>(
    pmcs: &PMCS<VM>,
    mutator: &MutatorContext<VM>,
    type_info: &'static VM::VMTypeInfo,
) -> ObjectReference {
    alloc_with_retry::<VM>(pmcs, mutator, VM::VMAllocation::size_of(type_info), || {
        VM::VMAllocation::allocate_object(mutator.tls(), type_info)
    })
}

/// Allocate an array of `length` elements.
pub fn create_array<VM: VMBinding>(
    pmcs: &PMCS<VM>,
    mutator: &MutatorContext<VM>,
    type_info: &'static VM::VMTypeInfo,
    length: usize,
) -> ObjectReference {
    alloc_with_retry::<VM>(
        pmcs,
        mutator,
        VM::VMAllocation::size_of_array(type_info, length),
        || VM::VMAllocation::allocate_array(mutator.tls(), type_info, length),
    )
}

fn alloc_with_retry<VM: VMBinding>(
    pmcs: &PMCS<VM>,
    mutator: &MutatorContext<VM>,
    size: usize,
    mut allocate: impl FnMut() -> Option<ObjectReference>,
) -> ObjectReference {
    let mut attempts = 0;
    loop {
        // Allocation is a safepoint: a pending stop-the-world is honored
        // before touching the allocator.
        mutator.safe_point(pmcs);
        if let Some(object) = allocate() {
            pmcs.state
                .increase_allocation_bytes_by(VM::VMObjectModel::get_current_size(object));
            return object;
        }
        attempts += 1;
        if attempts > MAX_COLLECTION_ATTEMPTS {
            VM::VMCollection::out_of_memory(mutator.tls().0, AllocationError::HeapExhausted);
            panic!("allocator failed a {}-byte request after the out-of-memory report", size);
        }
        mutator.on_oom(pmcs, size);
    }
}

/// Attach extra data (finalization, weak associations) to an object.
/// Whether the object is finalizable is taken from the object model.
pub fn create_extra_object_data<VM: VMBinding>(
    pmcs: &PMCS<VM>,
    object: ObjectReference,
    type_info: &'static VM::VMTypeInfo,
) -> Arc<ExtraObjectData<VM>> {
    let finalizable = VM::VMObjectModel::has_finalizer(object);
    pmcs.extra_objects.register(object, type_info, finalizable)
}

/// Is the object marked in the current epoch?  This is the liveness
/// predicate weak-reference processing uses.
pub fn is_marked<VM: VMBinding>(_pmcs: &PMCS<VM>, object: ObjectReference) -> bool {
    VM::VMObjectModel::is_marked(object)
}

/// Load a weak cell, respecting a concurrent collection: while the weak
/// barriers are armed for the in-flight epoch, a referent the marker has not
/// reached reads as cleared.
pub fn try_ref<VM: VMBinding>(pmcs: &PMCS<VM>, cell: &Atomic<Address>) -> Option<ObjectReference> {
    let object = ObjectReference::from_raw_address(cell.load(Ordering::Acquire))?;
    if pmcs.state.weak_barriers_armed() && !VM::VMObjectModel::is_marked(object) {
        return None;
    }
    Some(object)
}

/// Start the finalizer thread if it is not running.  Returns true if this
/// call started it.
pub fn start_finalizer_thread_if_needed<VM: VMBinding>(
    pmcs: &'static PMCS<VM>,
    tls: VMThread,
) -> bool {
    pmcs.finalizer.start_finalizer_thread_if_none(pmcs, tls)
}

/// Stop the finalizer thread, draining scheduled batches first, and wait for
/// it to exit.  No-op if it is not running.
pub fn stop_finalizer_thread_if_running<VM: VMBinding>(pmcs: &PMCS<VM>) {
    pmcs.finalizer.stop_finalizer_thread();
}

/// Is the finalizer thread running?
pub fn finalizers_thread_is_running<VM: VMBinding>(pmcs: &PMCS<VM>) -> bool {
    pmcs.finalizer.is_running()
}

/// Rebuild the mark worker pool with a new marker budget.  Serialized
/// against collections by the GC mutex; `on_teardown` runs once, after the
/// old pool has fully stopped.
pub fn reconfigure<VM: VMBinding>(
    pmcs: &PMCS<VM>,
    tls: VMThread,
    max_parallelism: usize,
    mutators_cooperate: bool,
    on_teardown: impl FnOnce(),
) {
    let _gc_guard = pmcs.gc_lock.lock().unwrap();
    pmcs.scheduler
        .reset(tls, max_parallelism, mutators_cooperate, on_teardown);
}

/// Tear the instance down: unblock all waiters, let an in-flight epoch
/// complete, stop the worker pool and join the finalizer thread.
pub fn shutdown_gc<VM: VMBinding>(pmcs: &PMCS<VM>) {
    pmcs.epoch_states.shutdown();
    if pmcs.state.is_initialized() {
        pmcs.controller_exit.wait_exited();
    }
    info!("PMCS shut down after {} collections", pmcs.state.gc_count());
}

/// Bytes allocated since the last collection finished.
pub fn allocation_bytes<VM: VMBinding>(pmcs: &PMCS<VM>) -> usize {
    pmcs.state.allocation_bytes()
}

/// Number of completed collections.
pub fn gc_count<VM: VMBinding>(pmcs: &PMCS<VM>) -> usize {
    pmcs.state.gc_count()
}
