//! PMCS is a parallel-mark, concurrent-sweep garbage collection core for
//! managed-object runtimes.  It coordinates many mutator threads with a
//! dedicated controller thread and a pool of auxiliary mark workers, and it
//! reclaims memory without ever moving objects.
//!
//! Logically, this crate includes these major parts:
//! * The [epoch state machine](scheduler/epoch_state/struct.EpochStates.html):
//!   collections are a monotonic sequence of numbered epochs, each progressing
//!   through `Scheduled -> Started -> Finished -> Finalized`, with blocking
//!   waits for external consumers.
//! * The [mark dispatcher](scheduler/marking/struct.MarkDispatcher.html): a
//!   stop-the-world root-scan phase that hands work to mutator threads and a
//!   pool of GC worker threads, with per-thread root-set acquisition via
//!   lock-free flags, followed by a work-stealing heap traversal.
//! * The [sweep driver](sweep/index.html) and the
//!   [finalizer processor](finalizer/struct.FinalizerProcessor.html): a
//!   post-STW sweep that reclaims unmarked objects and hands finalizable
//!   objects to a dedicated finalizer thread, allowing the next epoch to begin
//!   before finalizers complete.
//! * Interfaces: [the memory manager API](memory_manager/index.html) that a
//!   runtime calls into, and [the VMBinding trait](vm/trait.VMBinding.html)
//!   through which PMCS reaches the runtime's allocator, thread registry,
//!   type-info system and GC scheduler.

extern crate libc;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate static_assertions;

#[macro_use]
pub mod util;
mod global_state;
pub mod memory_manager;
mod mutator;
mod pmcs;
pub mod scheduler;
pub mod vm;

pub(crate) mod finalizer;
pub(crate) mod sweep;

pub use crate::finalizer::{FinalizerQueue, FinalizerThread};
pub use crate::mutator::MutatorContext;
pub use crate::pmcs::{PMCSBuilder, PMCS};

#[cfg(test)]
mod tests;
