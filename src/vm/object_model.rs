use crate::util::ObjectReference;
use crate::vm::VMBinding;

/// Per-object operations.  The allocator supplies each object's mark byte;
/// PMCS only manipulates it through this trait.  All mark operations must be
/// atomic: markers race on `try_mark` and the winner owns the object's field
/// scan for the epoch.
pub trait ObjectModel<VM: VMBinding> {
    /// Atomically set the mark bit.  Returns true iff the bit was previously
    /// clear, i.e. the caller is the unique winner for this epoch.
    fn try_mark(object: ObjectReference) -> bool;

    /// Atomically clear the mark bit.  Returns true iff the object was
    /// previously marked, i.e. it is live and survives this epoch ("survivors
    /// become white for the next epoch").
    fn try_reset_mark(object: ObjectReference) -> bool;

    /// Read the mark bit.  Used by weak-reference processing as the liveness
    /// predicate for the current epoch.
    fn is_marked(object: ObjectReference) -> bool;

    /// The current size of an object, in bytes.  Used for allocation
    /// accounting.
    fn get_current_size(object: ObjectReference) -> usize;

    /// Does the object's type declare a finalizer?  Consulted when extra
    /// object data is attached, so the sweep knows whether a dead object must
    /// pass through the finalizer queue.
    fn has_finalizer(object: ObjectReference) -> bool;

    /// Run the object's finalizer.  Called on the finalizer thread, for
    /// objects the sweep moved to the finalizer queue.  A panic from the
    /// finalizer body is caught by the caller and logged; it does not abort
    /// the finalizer loop.
    fn finalize(object: ObjectReference);
}
