use super::mock_test_prelude::*;

/// Four mutators with ten roots each: all forty root sets are scanned, every
/// rooted object survives, and each mutator's roots are scanned by exactly
/// one agent (the CAS on the root-set lock admits a single winner per epoch).
#[test]
fn every_root_set_is_scanned_exactly_once() {
    with_mock_env(|env| {
        let objects = allocate_published(env.pmcs, &TI_PLAIN, 40);
        let hosts: Vec<MutatorHost> =
            (0..4).map(|_| MutatorHost::spawn(env.pmcs)).collect();
        for (i, host) in hosts.iter().enumerate() {
            host.set_roots(objects[i * 10..(i + 1) * 10].to_vec());
        }

        collect_and_wait(env.pmcs);

        for object in &objects {
            assert!(MOCK.heap.contains(*object), "rooted object {} swept", object);
        }
        for host in &hosts {
            assert_eq!(
                host.times_scanned(),
                1,
                "exactly one agent may scan a mutator's roots per epoch"
            );
        }

        // A second epoch scans each root set exactly once more: the flags
        // were reset in between.
        collect_and_wait(env.pmcs);
        for host in &hosts {
            assert_eq!(host.times_scanned(), 2);
        }

        for host in hosts {
            host.retire();
        }
    });
}
