use super::mock_test_prelude::*;

/// Reconfiguring rebuilds the worker pool: the teardown callback runs
/// exactly once after the old pool stopped, the new pool respects the marker
/// budget, and collections keep working afterwards.
#[test]
fn reconfigure_rebuilds_the_worker_pool() {
    with_mock_env(|env| {
        let default_parallelism = *env.pmcs.get_options().max_parallelism;
        let teardowns = std::sync::atomic::AtomicUsize::new(0);

        memory_manager::reconfigure(env.pmcs, VMThread::UNINITIALIZED, 2, false, || {
            teardowns.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        assert_eq!(teardowns.load(std::sync::atomic::Ordering::SeqCst), 1);
        // Budget of 2 leaves at most one auxiliary worker beside the
        // controller.
        assert!(env.pmcs.num_workers() <= 1);

        // The rebuilt pool still collects correctly.
        let objects = allocate_published(env.pmcs, &TI_PLAIN, 8);
        let host = MutatorHost::spawn(env.pmcs);
        host.set_roots(vec![objects[0]]);
        collect_and_wait(env.pmcs);
        assert!(MOCK.heap.contains(objects[0]));
        assert!(!MOCK.heap.contains(objects[7]));
        host.retire();

        // Restore the configured budget for the remaining tests.
        memory_manager::reconfigure(
            env.pmcs,
            VMThread::UNINITIALIZED,
            default_parallelism,
            true,
            || {},
        );
    });
}
