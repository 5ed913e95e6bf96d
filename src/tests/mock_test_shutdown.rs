use super::mock_test_prelude::*;
use crate::pmcs::PMCSBuilder;
use crate::PMCS;

/// Shutdown with a collection in flight: the epoch completes, every waiter
/// unblocks, the worker pool stops and the finalizer thread is joined.  Uses
/// its own instance so the shared one stays usable for other tests.
#[test]
fn shutdown_completes_in_flight_epoch_and_unblocks_waiters() {
    with_mock_env(|_env| {
        let pmcs: &'static PMCS<MockVM> =
            Box::leak(memory_manager::pmcs_init(&PMCSBuilder::new_no_env_vars()));
        memory_manager::initialize_collection(pmcs, VMThread::UNINITIALIZED);

        let host = MutatorHost::spawn(pmcs);
        let objects = allocate_published(pmcs, &TI_PLAIN, 4);
        host.set_roots(vec![objects[0]]);

        let epoch = memory_manager::schedule_gc(pmcs);

        // Tear down while the collection may still be anywhere in its
        // lifecycle.  The state machine unblocks everyone; the controller
        // finishes the epoch if it already started it.
        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                memory_manager::wait_epoch_finalized(pmcs, epoch);
            });
            memory_manager::shutdown_gc(pmcs);
            waiter.join().unwrap();
        });

        // The controller has exited and joined its machinery.
        assert!(!memory_manager::finalizers_thread_is_running(pmcs));
        host.retire();
    });
}
