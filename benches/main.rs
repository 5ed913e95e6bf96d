use criterion::{criterion_group, criterion_main, Criterion};
use pmcs::scheduler::EpochStates;

fn bench_epoch_lifecycle(c: &mut Criterion) {
    c.bench_function("epoch_lifecycle", |b| {
        let states = EpochStates::new();
        b.iter(|| {
            let epoch = states.schedule();
            states.start(epoch);
            states.finish(epoch);
            states.finalized(epoch);
            epoch
        });
    });
}

fn bench_schedule_collapse(c: &mut Criterion) {
    c.bench_function("schedule_collapse", |b| {
        let states = EpochStates::new();
        // One epoch stays pending; every call collapses into it.
        let pending = states.schedule();
        b.iter(|| {
            let epoch = states.schedule();
            assert_eq!(epoch, pending);
            epoch
        });
    });
}

fn bench_wait_finished_fast_path(c: &mut Criterion) {
    c.bench_function("wait_finished_fast_path", |b| {
        let states = EpochStates::new();
        let epoch = states.schedule();
        states.start(epoch);
        states.finish(epoch);
        b.iter(|| states.wait_epoch_finished(epoch));
    });
}

criterion_group!(
    benches,
    bench_epoch_lifecycle,
    bench_schedule_collapse,
    bench_wait_finished_fast_path
);
criterion_main!(benches);
