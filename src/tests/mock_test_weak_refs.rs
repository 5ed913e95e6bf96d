use super::mock_test_prelude::*;

/// A weak association does not keep its target alive: once the target is
/// otherwise unreachable, the collection clears the weak cell and `try_ref`
/// reads it as gone, while the base object survives.
#[test]
fn weak_target_is_cleared_when_it_dies() {
    with_mock_env(|env| {
        let objects = allocate_published(env.pmcs, &TI_PLAIN, 2);
        let (base, target) = (objects[0], objects[1]);
        let data = memory_manager::create_extra_object_data(env.pmcs, base, &TI_PLAIN);
        data.set_weak_target(target);

        let host = MutatorHost::spawn(env.pmcs);
        host.set_roots(vec![base]);

        assert_eq!(
            memory_manager::try_ref(env.pmcs, data.weak_cell()),
            Some(target)
        );

        collect_and_wait(env.pmcs);

        assert!(MOCK.heap.contains(base));
        assert!(!MOCK.heap.contains(target));
        assert_eq!(memory_manager::try_ref(env.pmcs, data.weak_cell()), None);
        // The surviving base keeps its side-table entry.
        assert!(env.pmcs.extra_objects.get(base).is_some());

        host.retire();
    });
}

/// A weak association to a strongly reachable target stays readable across
/// collections.
#[test]
fn weak_target_survives_while_strongly_reachable() {
    with_mock_env(|env| {
        let objects = allocate_published(env.pmcs, &TI_PLAIN, 2);
        let (base, target) = (objects[0], objects[1]);
        let data = memory_manager::create_extra_object_data(env.pmcs, base, &TI_PLAIN);
        data.set_weak_target(target);

        let host = MutatorHost::spawn(env.pmcs);
        host.set_roots(vec![base, target]);

        collect_and_wait(env.pmcs);

        assert_eq!(
            memory_manager::try_ref(env.pmcs, data.weak_cell()),
            Some(target)
        );

        host.retire();
    });
}
