use super::mock_test_prelude::*;

/// An unreachable finalizable object runs its finalizer exactly once before
/// `wait_epoch_finalized` returns; its storage is retained for the epoch the
/// finalizer runs in and reclaimed by the next one.
#[test]
fn finalizer_runs_once_before_wait_returns() {
    with_mock_env(|env| {
        let objects = allocate_published(env.pmcs, &TI_FINALIZABLE, 1);
        let doomed = objects[0];
        memory_manager::create_extra_object_data(env.pmcs, doomed, &TI_FINALIZABLE);

        collect_and_wait(env.pmcs);

        {
            let finalized = MOCK.finalized.lock().unwrap();
            assert_eq!(
                finalized.iter().filter(|o| **o == doomed).count(),
                1,
                "the finalizer must run exactly once"
            );
        }
        // Still present: the queue kept it alive while its finalizer ran.
        assert!(MOCK.heap.contains(doomed));

        // The next epoch reclaims it without running the finalizer again,
        // and its side-table entry leaves the registry with it.
        collect_and_wait(env.pmcs);
        assert!(!MOCK.heap.contains(doomed));
        assert!(env.pmcs.extra_objects.get(doomed).is_none());
        let finalized = MOCK.finalized.lock().unwrap();
        assert_eq!(finalized.iter().filter(|o| **o == doomed).count(), 1);
    });
}

/// A panicking finalizer is caught and logged; the epoch still finalizes,
/// and finalizers of other objects in the same batch still run.
#[test]
fn panicking_finalizer_does_not_abort_the_epoch() {
    with_mock_env(|env| {
        let panicking = allocate_published(env.pmcs, &TI_PANICKING, 1)[0];
        let wellbehaved = allocate_published(env.pmcs, &TI_FINALIZABLE, 1)[0];
        memory_manager::create_extra_object_data(env.pmcs, panicking, &TI_PANICKING);
        memory_manager::create_extra_object_data(env.pmcs, wellbehaved, &TI_FINALIZABLE);

        // Returns only once the whole batch completed, panic included.
        collect_and_wait(env.pmcs);

        let finalized = MOCK.finalized.lock().unwrap();
        assert!(finalized.contains(&panicking));
        assert!(finalized.contains(&wellbehaved));
        drop(finalized);

        // Clean up the retained storage.
        collect_and_wait(env.pmcs);
    });
}

/// The finalizer thread lifecycle entry points: explicit start, running
/// query, and stop-with-join.
#[test]
fn finalizer_thread_lifecycle() {
    with_mock_env(|env| {
        memory_manager::stop_finalizer_thread_if_running(env.pmcs);
        assert!(!memory_manager::finalizers_thread_is_running(env.pmcs));

        assert!(memory_manager::start_finalizer_thread_if_needed(
            env.pmcs,
            VMThread::UNINITIALIZED
        ));
        assert!(memory_manager::finalizers_thread_is_running(env.pmcs));
        // Already running: a second start is a no-op.
        assert!(!memory_manager::start_finalizer_thread_if_needed(
            env.pmcs,
            VMThread::UNINITIALIZED
        ));

        memory_manager::stop_finalizer_thread_if_running(env.pmcs);
        assert!(!memory_manager::finalizers_thread_is_running(env.pmcs));

        // Collections keep working without a standing finalizer thread; the
        // handoff restarts it on demand.
        let doomed = allocate_published(env.pmcs, &TI_FINALIZABLE, 1)[0];
        memory_manager::create_extra_object_data(env.pmcs, doomed, &TI_FINALIZABLE);
        collect_and_wait(env.pmcs);
        assert!(MOCK.finalized.lock().unwrap().contains(&doomed));
        collect_and_wait(env.pmcs);
    });
}
