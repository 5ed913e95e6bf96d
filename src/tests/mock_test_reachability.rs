use super::mock_test_prelude::*;

/// One mutator with a root chain R -> A -> B and nothing else: the chain
/// survives a collection untouched and no finalizer runs for it.
#[test]
fn rooted_chain_survives_collection() {
    with_mock_env(|env| {
        let objects = allocate_published(env.pmcs, &TI_PLAIN, 3);
        let (r, a, b) = (objects[0], objects[1], objects[2]);
        set_field(r, 0, a);
        set_field(a, 0, b);

        let host = MutatorHost::spawn(env.pmcs);
        host.set_roots(vec![r]);

        collect_and_wait(env.pmcs);

        assert!(MOCK.heap.contains(r));
        assert!(MOCK.heap.contains(a));
        assert!(MOCK.heap.contains(b));
        let finalized = MOCK.finalized.lock().unwrap();
        assert!(
            !finalized.contains(&r) && !finalized.contains(&a) && !finalized.contains(&b),
            "no finalizer may run for plain objects"
        );
        drop(finalized);

        // Survivors are white again for the next epoch.
        assert!(!memory_manager::is_marked(env.pmcs, r));
        assert!(!memory_manager::is_marked(env.pmcs, a));
        assert!(!memory_manager::is_marked(env.pmcs, b));

        host.retire();
    });
}

/// An object that loses its last root is reclaimed by the following
/// collection, while the still-rooted part of the graph stays.
#[test]
fn dropping_a_root_reclaims_its_subgraph() {
    with_mock_env(|env| {
        let objects = allocate_published(env.pmcs, &TI_PLAIN, 2);
        let (kept, dropped) = (objects[0], objects[1]);

        let host = MutatorHost::spawn(env.pmcs);
        host.set_roots(vec![kept, dropped]);
        collect_and_wait(env.pmcs);
        assert!(MOCK.heap.contains(kept));
        assert!(MOCK.heap.contains(dropped));

        host.set_roots(vec![kept]);
        collect_and_wait(env.pmcs);
        assert!(MOCK.heap.contains(kept));
        assert!(!MOCK.heap.contains(dropped));

        host.retire();
    });
}
