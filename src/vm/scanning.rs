use crate::mutator::MutatorContext;
use crate::util::ObjectReference;
use crate::vm::VMBinding;

/// Callback invoked with every outgoing reference of a scanned object.  The
/// marker passes a tracer that marks the reachable object and, if it was
/// unmarked, queues it for its own field scan.
pub trait ObjectTracer {
    /// Report one outgoing reference.
    fn trace(&mut self, object: ObjectReference);
}

/// Every `trace` call on a closure is an `ObjectTracer`; convenient for tests
/// and simple bindings.
impl<F: FnMut(ObjectReference)> ObjectTracer for F {
    fn trace(&mut self, object: ObjectReference) {
        self(object)
    }
}

/// Sink for roots discovered while scanning a thread or the VM's global
/// state.  The factory the marker passes in feeds the mark queue.
pub trait RootsWorkFactory {
    /// Report a batch of roots.  Duplicates are fine; the mark bit keeps each
    /// object's field scan unique.
    fn create_process_roots_work(&mut self, roots: Vec<ObjectReference>);
}

/// VM-specific object and root scanning.  The binding consults its type-info
/// system to enumerate reference fields; PMCS never inspects object layout.
pub trait Scanning<VM: VMBinding> {
    /// Visit every outgoing reference of `object`.  This single entry point
    /// covers plain objects and arrays; the binding dispatches on the
    /// object's type info.  Must not recurse into referents.
    fn scan_object(object: ObjectReference, tracer: &mut impl ObjectTracer);

    /// Scan the roots of one mutator: its stack, thread-locals, and any
    /// thread-owned handles.  Called exactly once per (epoch, mutator) by
    /// whichever agent won that mutator's root-set lock -- the mutator itself
    /// at its safepoint, or a GC thread.
    fn scan_roots_in_mutator_thread(
        mutator: &MutatorContext<VM>,
        factory: &mut impl RootsWorkFactory,
    );

    /// Scan roots that belong to no particular thread: globals, interned
    /// state, the binding's own tables.  Called once per epoch on the
    /// controller.
    fn scan_vm_specific_roots(factory: &mut impl RootsWorkFactory);
}
