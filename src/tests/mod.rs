//! Scenario tests driving full collections against the mock runtime.

mod mock_test_prelude {
    pub use crate::memory_manager;
    pub use crate::util::test_util::fixtures::*;
    pub use crate::util::test_util::mock_vm::*;
    pub use crate::util::{Address, Epoch, ObjectReference, VMThread};
    pub use crate::vm::*;
}

mod mock_test_finalizers;
mod mock_test_liveness;
mod mock_test_oom_recovery;
mod mock_test_parallel_root_scan;
mod mock_test_reachability;
mod mock_test_reconfigure;
mod mock_test_schedule_collapse;
mod mock_test_shutdown;
mod mock_test_sweep_unreachable;
mod mock_test_weak_refs;
