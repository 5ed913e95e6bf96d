use super::mock_test_prelude::*;

/// A thousand unreachable objects are all reclaimed by one collection, and
/// the heap size reported to the scheduler afterwards reflects only the
/// survivors.
#[test]
fn unreachable_objects_are_swept() {
    with_mock_env(|env| {
        // Flush garbage left behind by earlier tests so the count is clean.
        collect_and_wait(env.pmcs);

        let garbage = allocate_published(env.pmcs, &TI_PLAIN, 1000);
        let epoch = collect_and_wait(env.pmcs);

        for object in &garbage {
            assert!(
                !MOCK.heap.contains(*object),
                "unreachable object {} survived",
                object
            );
        }

        let log = MOCK.gc_finish_log.lock().unwrap();
        let (logged_epoch, live_after) = *log.last().expect("on_gc_finish not called");
        assert_eq!(logged_epoch, epoch);
        assert_eq!(
            live_after,
            MOCK.heap.live_bytes(),
            "the scheduler callback must see the post-sweep heap size"
        );
    });
}
