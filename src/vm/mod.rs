//! PMCS-to-VM interfaces: the traits a runtime implements so that PMCS can
//! reach its allocator, thread registry, type-info system, GC scheduler and
//! weak-reference barriers.  These are the external collaborators of the GC
//! core; PMCS never assumes anything about the runtime beyond these traits.

mod allocation;
mod collection;
mod object_model;
mod scanning;
mod scheduling;
mod thread_registry;
mod weak_barriers;

pub use self::allocation::Allocation;
pub use self::collection::{AllocationError, Collection, GCThreadContext};
pub use self::object_model::ObjectModel;
pub use self::scanning::{ObjectTracer, RootsWorkFactory, Scanning};
pub use self::scheduling::{NullSchedulerHooks, SchedulerHooks};
pub use self::thread_registry::ThreadRegistry;
pub use self::weak_barriers::WeakRefBarriers;

/// The `VMBinding` trait associates the collaborating traits with a VM.  A
/// binding implements this trait once for its runtime, usually on an empty
/// struct, and hands the type to [`crate::PMCSBuilder::build`].
pub trait VMBinding: 'static + Send + Sync + Sized {
    /// The runtime's type-information record.  PMCS stores references to type
    /// info (object creation, extra object data) but never inspects it; field
    /// enumeration goes through [`Scanning`].
    type VMTypeInfo: 'static + Sync;

    /// The thread registry: enumerates registered mutators.
    type VMThreadRegistry: ThreadRegistry<Self>;
    /// Thread suspension, GC-thread spawning and OOM reporting.
    type VMCollection: Collection<Self>;
    /// Per-object operations: the mark byte, sizes, finalizer bodies.
    type VMObjectModel: ObjectModel<Self>;
    /// Root and field scanning.
    type VMScanning: Scanning<Self>;
    /// The object allocator.
    type VMAllocation: Allocation<Self>;
    /// Weak-reference barriers, toggled around the concurrent weak sweep.
    /// Bindings that do not build with `concurrent_weak_sweep` can use the
    /// default no-op methods.
    type VMWeakBarriers: WeakRefBarriers<Self>;
}
