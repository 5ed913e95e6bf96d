//! Fixtures for MockVM tests.  All tests share one PMCS instance and one
//! mock runtime state, so they serialize through a global lock and reset the
//! per-test parts of the mock state on entry.

use crate::memory_manager;
use crate::mutator::MutatorContext;
use crate::pmcs::PMCSBuilder;
use crate::util::opaque_pointer::*;
use crate::util::test_util::mock_vm::{
    deregister_mutator, register_mutator, tls_key, MockTypeInfo, MockVM, MOCK,
};
use crate::util::{Address, ObjectReference};
use crate::PMCS;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::thread::JoinHandle;

lazy_static! {
    static ref SERIAL: Mutex<()> = Mutex::new(());
    static ref PMCS_SINGLETON: Box<PMCS<MockVM>> =
        memory_manager::pmcs_init(&PMCSBuilder::new_no_env_vars());
}

static INIT: Once = Once::new();
static MUTATOR_TLS_IDS: AtomicUsize = AtomicUsize::new(0x0002_0000);

/// The shared test environment: the singleton instance, plus the serial
/// guard that keeps tests from interleaving on the mock runtime state.
pub struct MockEnv {
    pub pmcs: &'static PMCS<MockVM>,
    _serial: MutexGuard<'static, ()>,
}

/// Run a test body against the shared instance.  Serializes with every
/// other MockVM test and clears the per-test mock state (roots, logs,
/// scan counts) first.
pub fn with_mock_env<F: FnOnce(&MockEnv)>(f: F) {
    // A panicked test poisons the serial lock; later tests still run.
    let serial = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let pmcs: &'static PMCS<MockVM> = &PMCS_SINGLETON;
    INIT.call_once(|| {
        memory_manager::initialize_collection(pmcs, VMThread::UNINITIALIZED);
    });

    MOCK.roots.lock().unwrap().clear();
    MOCK.global_roots.lock().unwrap().clear();
    MOCK.scan_counts.lock().unwrap().clear();
    MOCK.finalized.lock().unwrap().clear();
    MOCK.gc_finish_log.lock().unwrap().clear();
    MOCK.heap.set_budget(usize::MAX);

    f(&MockEnv {
        pmcs,
        _serial: serial,
    });
}

fn fresh_mutator_tls() -> VMMutatorThread {
    let id = MUTATOR_TLS_IDS.fetch_add(0x100, Ordering::SeqCst);
    VMMutatorThread(VMThread(OpaquePointer::from_address(unsafe {
        Address::from_usize(id)
    })))
}

/// A mutator thread that spins on its safepoint until stopped, so
/// stop-the-world rendezvous can complete during tests.
pub struct MutatorHost {
    pub tls: VMMutatorThread,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MutatorHost {
    /// Spawn a mutator host and wait until it is registered.
    pub fn spawn(pmcs: &'static PMCS<MockVM>) -> Self {
        let tls = fresh_mutator_tls();
        let stop = Arc::new(AtomicBool::new(false));
        let ready = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = stop.clone();
            let ready = ready.clone();
            std::thread::spawn(move || {
                let ctx: &'static MutatorContext<MockVM> =
                    Box::leak(memory_manager::bind_mutator(pmcs, tls));
                register_mutator(ctx);
                ready.store(true, Ordering::SeqCst);
                while !stop.load(Ordering::SeqCst) {
                    memory_manager::on_safe_point(pmcs, ctx);
                    std::thread::yield_now();
                }
                deregister_mutator(tls);
                // The registry no longer references the context; reclaim it.
                let raw = ctx as *const MutatorContext<MockVM> as *mut MutatorContext<MockVM>;
                memory_manager::destroy_mutator(pmcs, unsafe { Box::from_raw(raw) });
            })
        };
        while !ready.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        MutatorHost {
            tls,
            stop,
            handle: Some(handle),
        }
    }

    /// Assign this mutator's root set.
    pub fn set_roots(&self, roots: Vec<ObjectReference>) {
        MOCK.roots.lock().unwrap().insert(tls_key(self.tls), roots);
    }

    /// How many times this mutator's roots were scanned since the counters
    /// were last cleared.
    pub fn times_scanned(&self) -> usize {
        MOCK.scan_counts
            .lock()
            .unwrap()
            .get(&tls_key(self.tls))
            .copied()
            .unwrap_or(0)
    }

    /// Stop the host thread, de-registering its mutator.
    pub fn retire(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

impl Drop for MutatorHost {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A mutator registered on the calling thread itself.  The caller is
/// responsible for being parked (or blocked in an epoch wait) whenever a
/// collection needs it; allocation and `on_oom` do this automatically.
pub struct SelfMutator {
    pub tls: VMMutatorThread,
    ctx: &'static MutatorContext<MockVM>,
}

impl SelfMutator {
    pub fn register(pmcs: &'static PMCS<MockVM>) -> Self {
        let tls = fresh_mutator_tls();
        let ctx: &'static MutatorContext<MockVM> =
            Box::leak(memory_manager::bind_mutator(pmcs, tls));
        register_mutator(ctx);
        SelfMutator { tls, ctx }
    }

    pub fn ctx(&self) -> &'static MutatorContext<MockVM> {
        self.ctx
    }

    pub fn retire(self, pmcs: &'static PMCS<MockVM>) {
        deregister_mutator(self.tls);
        let raw = self.ctx as *const MutatorContext<MockVM> as *mut MutatorContext<MockVM>;
        memory_manager::destroy_mutator(pmcs, unsafe { Box::from_raw(raw) });
    }
}

/// Allocate `count` published objects from a scratch (unregistered) thread.
/// Only valid while no collection can be in flight: the scratch thread never
/// parks, so it must not exist as far as the rendezvous is concerned.
pub fn allocate_published(
    pmcs: &'static PMCS<MockVM>,
    type_info: &'static MockTypeInfo,
    count: usize,
) -> Vec<ObjectReference> {
    let tls = fresh_mutator_tls();
    let scratch = memory_manager::bind_mutator(pmcs, tls);
    let objects: Vec<ObjectReference> = (0..count)
        .map(|_| memory_manager::create_object(pmcs, &scratch, type_info))
        .collect();
    // Push the scratch buffer to the global factory so the sweep sees it.
    use crate::vm::Allocation;
    <MockVM as Allocation<MockVM>>::publish(tls);
    objects
}

/// Like [`allocate_published`], but arrays: one object per requested length.
pub fn allocate_published_arrays(
    pmcs: &'static PMCS<MockVM>,
    type_info: &'static MockTypeInfo,
    lengths: &[usize],
) -> Vec<ObjectReference> {
    let tls = fresh_mutator_tls();
    let scratch = memory_manager::bind_mutator(pmcs, tls);
    let objects: Vec<ObjectReference> = lengths
        .iter()
        .map(|&len| memory_manager::create_array(pmcs, &scratch, type_info, len))
        .collect();
    use crate::vm::Allocation;
    <MockVM as Allocation<MockVM>>::publish(tls);
    objects
}

/// Request a collection and wait until its finalizers have completed.
pub fn collect_and_wait(pmcs: &'static PMCS<MockVM>) -> crate::util::Epoch {
    let epoch = memory_manager::schedule_gc(pmcs);
    memory_manager::wait_epoch_finalized(pmcs, epoch);
    epoch
}
