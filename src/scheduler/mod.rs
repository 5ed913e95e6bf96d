//! Collection scheduling and the GC threads: the epoch state machine, the
//! request collapser, the mark dispatcher with its worker pool, and the
//! controller that drives each collection from start to finish.

pub(crate) mod controller;
pub(crate) mod epoch_state;
pub(crate) mod marking;
pub(crate) mod requester;
pub(crate) mod work_queue;
pub(crate) mod worker;
pub(crate) mod worker_monitor;

pub use self::controller::GCController;
pub use self::epoch_state::EpochStates;
pub use self::marking::MarkDispatcher;
pub use self::requester::GCRequester;
pub use self::worker::GCWorker;
