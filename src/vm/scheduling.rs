use crate::pmcs::PMCS;
use crate::util::epoch::Epoch;
use crate::vm::VMBinding;

/// Callbacks into the external GC scheduler.  The scheduler decides *when* to
/// request collections (PMCS only exposes the "schedule now" entry point);
/// PMCS reports collection boundaries and the post-sweep heap size through
/// this trait so the scheduler can adjust its policy.
pub trait SchedulerHooks<VM: VMBinding>: Send + Sync {
    /// A collection has started: all mutators are parked, marking is about to
    /// begin.
    fn on_gc_start(&self, pmcs: &PMCS<VM>);

    /// A collection has finished its sweep.  `allocated_bytes` is the
    /// allocator's live figure after reclamation.
    fn on_gc_finish(&self, pmcs: &PMCS<VM>, epoch: Epoch, allocated_bytes: usize);
}

/// Hooks that do nothing.  The default for bindings without a scheduler.
pub struct NullSchedulerHooks;

impl<VM: VMBinding> SchedulerHooks<VM> for NullSchedulerHooks {
    fn on_gc_start(&self, _pmcs: &PMCS<VM>) {}
    fn on_gc_finish(&self, _pmcs: &PMCS<VM>, _epoch: Epoch, _allocated_bytes: usize) {}
}
