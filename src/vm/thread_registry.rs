use crate::mutator::MutatorContext;
use crate::util::opaque_pointer::*;
use crate::vm::VMBinding;

/// The runtime's thread registry.  PMCS observes mutators only through this
/// trait (weak enumeration); the binding owns each mutator's
/// [`MutatorContext`] and keeps the registry consistent with thread
/// registration and de-registration.
pub trait ThreadRegistry<VM: VMBinding> {
    /// The guard returned by [`ThreadRegistry::lock_for_iter`].  While a
    /// guard is alive, no thread may register or de-register, so iteration
    /// sees a stable set.
    type IterGuard;

    /// Lock the registry against registration changes.  Root claiming and
    /// flag resets iterate under this guard.
    fn lock_for_iter() -> Self::IterGuard;

    /// The number of registered mutators.  May change between calls as
    /// threads register and de-register; the stop-the-world rendezvous
    /// re-reads it on every wakeup.
    fn number_of_mutators() -> usize;

    /// Is `tls` a registered mutator?
    fn is_mutator(tls: VMThread) -> bool;

    /// The mutator context of a registered mutator thread.
    fn mutator(tls: VMMutatorThread) -> &'static MutatorContext<VM>;

    /// Iterate over the contexts of all registered mutators.  Callers must
    /// hold an iteration guard.
    fn mutators<'a>() -> Box<dyn Iterator<Item = &'a MutatorContext<VM>> + 'a>;
}
