use super::mock_test_prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet, VecDeque};

/// Randomized object graphs: after a collection, the surviving objects are
/// exactly the transitive closure of the root set, and every survivor's mark
/// is clear.
#[test]
fn survivors_equal_transitive_closure_of_roots() {
    with_mock_env(|env| {
        let mut rng = ChaCha8Rng::seed_from_u64(0x9e3779b97f4a7c15);
        for round in 0..4 {
            let node_count = 150;
            let out_degrees: Vec<usize> =
                (0..node_count).map(|_| rng.random_range(0..4)).collect();
            let objects =
                allocate_published_arrays(env.pmcs, &TI_PLAIN, &out_degrees);

            // Random edges, self references and duplicates included.
            let mut edges: HashMap<ObjectReference, Vec<ObjectReference>> = HashMap::new();
            for (i, &object) in objects.iter().enumerate() {
                for slot in 0..out_degrees[i] {
                    let target = objects[rng.random_range(0..node_count)];
                    set_field(object, slot, target);
                    edges.entry(object).or_default().push(target);
                }
            }

            let roots: Vec<ObjectReference> = objects
                .iter()
                .copied()
                .filter(|_| rng.random_bool(0.1))
                .collect();

            let expected = transitive_closure(&roots, &edges);

            let host = MutatorHost::spawn(env.pmcs);
            host.set_roots(roots);
            collect_and_wait(env.pmcs);

            for &object in &objects {
                assert_eq!(
                    MOCK.heap.contains(object),
                    expected.contains(&object),
                    "round {}: object {} live-set mismatch",
                    round,
                    object
                );
            }
            for &survivor in &expected {
                assert!(
                    !memory_manager::is_marked(env.pmcs, survivor),
                    "round {}: survivor {} still marked after sweep",
                    round,
                    survivor
                );
            }

            host.retire();
        }
    });
}

fn transitive_closure(
    roots: &[ObjectReference],
    edges: &HashMap<ObjectReference, Vec<ObjectReference>>,
) -> HashSet<ObjectReference> {
    let mut reachable: HashSet<ObjectReference> = roots.iter().copied().collect();
    let mut work: VecDeque<ObjectReference> = roots.iter().copied().collect();
    while let Some(object) = work.pop_front() {
        if let Some(children) = edges.get(&object) {
            for &child in children {
                if reachable.insert(child) {
                    work.push_back(child);
                }
            }
        }
    }
    reachable
}
