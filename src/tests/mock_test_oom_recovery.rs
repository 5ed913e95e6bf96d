use super::mock_test_prelude::*;
use crate::vm::Allocation;

/// Allocation failure forces a synchronous collection: the mutator blocks as
/// implicitly suspended, the collection reclaims the garbage, and the retry
/// succeeds without the binding ever seeing an OOM.
#[test]
fn allocation_failure_forces_a_collection_and_retries() {
    with_mock_env(|env| {
        // Sweep leftovers from other tests so the budget math is exact.
        collect_and_wait(env.pmcs);

        let object_size = <MockVM as Allocation<MockVM>>::size_of(&TI_PLAIN);
        let baseline = MOCK.heap.live_bytes();
        MOCK.heap.set_budget(baseline + 50 * object_size);

        let mutator = SelfMutator::register(env.pmcs);
        let gcs_before = memory_manager::gc_count(env.pmcs);

        // Fill the budget with garbage this thread never roots.
        for _ in 0..50 {
            memory_manager::create_object(env.pmcs, mutator.ctx(), &TI_PLAIN);
        }
        assert_eq!(MOCK.heap.live_bytes(), baseline + 50 * object_size);

        // The 51st allocation cannot fit; create_object schedules a
        // collection, waits for it as an implicitly suspended mutator, and
        // retries.  The garbage above is unrooted, so the retry fits.
        let survivor = memory_manager::create_object(env.pmcs, mutator.ctx(), &TI_PLAIN);

        assert!(memory_manager::gc_count(env.pmcs) > gcs_before);
        assert!(MOCK.heap.live_bytes() <= baseline + 2 * object_size);
        let _ = survivor;

        mutator.retire(env.pmcs);
        MOCK.heap.set_budget(usize::MAX);
    });
}
