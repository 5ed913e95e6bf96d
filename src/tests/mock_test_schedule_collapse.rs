use super::mock_test_prelude::*;

/// Repeated schedule requests before the collection starts collapse into a
/// single epoch.  Holding the GC mutex keeps the controller from starting
/// the epoch while the requests are issued.
#[test]
fn consecutive_requests_collapse_into_one_epoch() {
    with_mock_env(|env| {
        let epochs = {
            let _gc_guard = env.pmcs.gc_lock.lock().unwrap();
            let e1 = memory_manager::schedule_gc(env.pmcs);
            let e2 = memory_manager::schedule_gc(env.pmcs);
            let e3 = memory_manager::schedule_gc(env.pmcs);
            (e1, e2, e3)
        };
        assert_eq!(epochs.0, epochs.1);
        assert_eq!(epochs.1, epochs.2);

        memory_manager::wait_epoch_finalized(env.pmcs, epochs.0);

        // The collapsed epoch ran as exactly one collection; a fresh request
        // now allocates the next epoch number.
        let next = memory_manager::schedule_gc(env.pmcs);
        assert_eq!(next.number(), epochs.0.number() + 1);
        memory_manager::wait_epoch_finalized(env.pmcs, next);
    });
}
