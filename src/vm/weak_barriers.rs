use crate::util::epoch::Epoch;
use crate::vm::VMBinding;

/// Weak-reference barriers, owned by the runtime.  When the crate is built
/// with the `concurrent_weak_sweep` feature, the controller enables the
/// barriers after marking, resumes mutators, processes weak references
/// concurrently, then briefly re-suspends mutators to disable the barriers.
/// While the barriers are enabled, the runtime must route every weak-cell
/// read through [`crate::memory_manager::try_ref`], which consults the
/// current epoch's mark bits.
///
/// The default methods are no-ops, for bindings that never build with the
/// concurrent path.
pub trait WeakRefBarriers<VM: VMBinding> {
    /// Arm the barriers for the given epoch.  Called during stop-the-world.
    fn enable(epoch: Epoch) {
        let _ = epoch;
    }

    /// Disarm the barriers.  Called during the brief re-suspension.
    fn disable() {}
}
