//! A mock runtime ("MockVM") for testing PMCS without a real language
//! implementation.  Objects are boxed Rust structs, the thread registry is a
//! global vector, and stop-the-world parking is a flag + condvar.  One
//! MockVM-wide state instance backs all tests; tests serialize through
//! [`crate::util::test_util::fixtures`].

use crate::mutator::MutatorContext;
use crate::util::epoch::Epoch;
use crate::util::opaque_pointer::*;
use crate::util::{Address, ObjectReference};
use crate::vm::*;
use crate::PMCS;
use atomic::Atomic;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

/// The mock binding type.
pub struct MockVM;

impl VMBinding for MockVM {
    type VMTypeInfo = MockTypeInfo;
    type VMThreadRegistry = MockVM;
    type VMCollection = MockVM;
    type VMObjectModel = MockVM;
    type VMScanning = MockVM;
    type VMAllocation = MockVM;
    type VMWeakBarriers = MockVM;
}

/// Mock type information: enough layout for the scanner and the finalizer.
pub struct MockTypeInfo {
    pub name: &'static str,
    /// Number of reference fields objects of this type carry.
    pub field_count: usize,
    pub has_finalizer: bool,
    /// The finalizer body panics (for failure-path tests).
    pub finalizer_panics: bool,
}

/// A plain two-field object type.
pub static TI_PLAIN: MockTypeInfo = MockTypeInfo {
    name: "plain",
    field_count: 2,
    has_finalizer: false,
    finalizer_panics: false,
};

/// A finalizable two-field object type.
pub static TI_FINALIZABLE: MockTypeInfo = MockTypeInfo {
    name: "finalizable",
    field_count: 2,
    has_finalizer: true,
    finalizer_panics: false,
};

/// A finalizable type whose finalizer panics.
pub static TI_PANICKING: MockTypeInfo = MockTypeInfo {
    name: "panicking",
    field_count: 0,
    has_finalizer: true,
    finalizer_panics: true,
};

/// The mock object header and body.  The mark byte is CAS-settable, as the
/// allocator contract requires.
#[repr(C)]
pub struct MockObject {
    mark: AtomicU8,
    type_info: &'static MockTypeInfo,
    fields: Vec<Atomic<Address>>,
}

fn object(obj: ObjectReference) -> &'static MockObject {
    unsafe { &*obj.to_raw_address().to_ptr::<MockObject>() }
}

/// Point `obj`'s field `index` at `target`.
pub fn set_field(obj: ObjectReference, index: usize, target: ObjectReference) {
    object(obj).fields[index].store(target.to_raw_address(), atomic::Ordering::Release);
}

/// Clear `obj`'s field `index`.
pub fn clear_field(obj: ObjectReference, index: usize) {
    object(obj).fields[index].store(Address::ZERO, atomic::Ordering::Release);
}

pub fn tls_key(tls: VMMutatorThread) -> usize {
    tls.0 .0.to_address().as_usize()
}

/// The mock heap: a budgeted pool of boxed objects with per-thread
/// allocation buffers and a published global factory, which is the sweep's
/// iteration set.  Unpublished objects and objects allocated after the
/// factory lock was taken are invisible to the current sweep, matching the
/// allocator contract.
pub struct MockHeap {
    budget: AtomicUsize,
    live_bytes: AtomicUsize,
    global: Mutex<Vec<ObjectReference>>,
    tlabs: Mutex<HashMap<usize, Vec<ObjectReference>>>,
    factory_lock: Mutex<()>,
}

impl MockHeap {
    fn new() -> Self {
        Self {
            budget: AtomicUsize::new(usize::MAX),
            live_bytes: AtomicUsize::new(0),
            global: Mutex::new(Vec::new()),
            tlabs: Mutex::new(HashMap::new()),
            factory_lock: Mutex::new(()),
        }
    }

    /// Cap the heap at `bytes` live bytes (for OOM tests).
    pub fn set_budget(&self, bytes: usize) {
        self.budget.store(bytes, Ordering::SeqCst);
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }

    /// Number of objects in the published factory.
    pub fn object_count(&self) -> usize {
        self.global.lock().unwrap().len()
    }

    /// Is `obj` still in the published factory (i.e. not reclaimed)?
    pub fn contains(&self, obj: ObjectReference) -> bool {
        self.global.lock().unwrap().contains(&obj)
    }

    fn try_reserve(&self, size: usize) -> bool {
        loop {
            let current = self.live_bytes.load(Ordering::SeqCst);
            if current + size > self.budget.load(Ordering::SeqCst) {
                return false;
            }
            if self
                .live_bytes
                .compare_exchange(current, current + size, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn allocate(&self, tls: VMMutatorThread, type_info: &'static MockTypeInfo, fields: usize) -> Option<ObjectReference> {
        let size = object_size(fields);
        if !self.try_reserve(size) {
            return None;
        }
        let boxed = Box::new(MockObject {
            mark: AtomicU8::new(0),
            type_info,
            fields: (0..fields).map(|_| Atomic::new(Address::ZERO)).collect(),
        });
        let obj = ObjectReference::from_raw_address(Address::from_mut_ptr(Box::into_raw(boxed)))
            .unwrap();
        self.tlabs
            .lock()
            .unwrap()
            .entry(tls_key(tls))
            .or_default()
            .push(obj);
        Some(obj)
    }

    fn publish(&self, tls: VMMutatorThread) {
        let _factory = self.factory_lock.lock().unwrap();
        let mut buffered = Vec::new();
        if let Some(tlab) = self.tlabs.lock().unwrap().get_mut(&tls_key(tls)) {
            std::mem::swap(&mut buffered, tlab);
        }
        self.global.lock().unwrap().append(&mut buffered);
    }

    fn retain_objects(&self, mut retain: impl FnMut(ObjectReference) -> bool) {
        let mut global = self.global.lock().unwrap();
        global.retain(|&obj| {
            if retain(obj) {
                return true;
            }
            let size = object_size(object(obj).fields.len());
            self.live_bytes.fetch_sub(size, Ordering::SeqCst);
            drop(unsafe { Box::from_raw(obj.to_raw_address().to_mut_ptr::<MockObject>()) });
            false
        });
    }
}

fn object_size(fields: usize) -> usize {
    std::mem::size_of::<MockObject>() + fields * std::mem::size_of::<Atomic<Address>>()
}

/// Stop-the-world parking shared by all mock mutators.
struct StwPark {
    stopped: Mutex<bool>,
    resumed: Condvar,
}

/// Everything mutable the mock runtime keeps between calls.
pub struct MockState {
    pub heap: MockHeap,
    mutators: Mutex<Vec<&'static MutatorContext<MockVM>>>,
    registry_iter_lock: Mutex<()>,
    park: StwPark,
    /// Per-mutator roots, keyed by `tls_key`.
    pub roots: Mutex<HashMap<usize, Vec<ObjectReference>>>,
    pub global_roots: Mutex<Vec<ObjectReference>>,
    /// How many times each mutator's roots were scanned, keyed by `tls_key`.
    /// Reset per test; with one collection per test this must read 1
    /// everywhere.
    pub scan_counts: Mutex<HashMap<usize, usize>>,
    /// Objects whose finalizer ran, in order.
    pub finalized: Mutex<Vec<ObjectReference>>,
    /// `(epoch, allocated_bytes)` per `on_gc_finish` callback.
    pub gc_finish_log: Mutex<Vec<(Epoch, usize)>>,
    pub gc_start_count: AtomicUsize,
    gc_thread_ids: AtomicUsize,
}

lazy_static! {
    /// The mock runtime state.  One per process, like a real runtime.
    pub static ref MOCK: MockState = MockState {
        heap: MockHeap::new(),
        mutators: Mutex::new(Vec::new()),
        registry_iter_lock: Mutex::new(()),
        park: StwPark {
            stopped: Mutex::new(false),
            resumed: Condvar::new(),
        },
        roots: Mutex::new(HashMap::new()),
        global_roots: Mutex::new(Vec::new()),
        scan_counts: Mutex::new(HashMap::new()),
        finalized: Mutex::new(Vec::new()),
        gc_finish_log: Mutex::new(Vec::new()),
        gc_start_count: AtomicUsize::new(0),
        gc_thread_ids: AtomicUsize::new(0x0100_0000),
    };
}

/// Add a mutator to the registry.  The context must outlive the test (the
/// fixtures leak it and reclaim it on de-registration).
pub fn register_mutator(ctx: &'static MutatorContext<MockVM>) {
    let _iter = MOCK.registry_iter_lock.lock().unwrap();
    MOCK.mutators.lock().unwrap().push(ctx);
}

/// Remove a mutator from the registry.
pub fn deregister_mutator(tls: VMMutatorThread) {
    let _iter = MOCK.registry_iter_lock.lock().unwrap();
    MOCK.mutators.lock().unwrap().retain(|m| m.tls() != tls);
}

impl ThreadRegistry<MockVM> for MockVM {
    type IterGuard = MutexGuard<'static, ()>;

    fn lock_for_iter() -> Self::IterGuard {
        MOCK.registry_iter_lock.lock().unwrap()
    }

    fn number_of_mutators() -> usize {
        MOCK.mutators.lock().unwrap().len()
    }

    fn is_mutator(tls: VMThread) -> bool {
        MOCK.mutators.lock().unwrap().iter().any(|m| m.tls().0 == tls)
    }

    fn mutator(tls: VMMutatorThread) -> &'static MutatorContext<MockVM> {
        MOCK.mutators
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.tls() == tls)
            .expect("unknown mutator")
    }

    fn mutators<'a>() -> Box<dyn Iterator<Item = &'a MutatorContext<MockVM>> + 'a> {
        let snapshot: Vec<&'a MutatorContext<MockVM>> = MOCK.mutators.lock().unwrap().clone();
        Box::new(snapshot.into_iter())
    }
}

impl Collection<MockVM> for MockVM {
    fn request_threads_suspension(_tls: VMWorkerThread) {
        let mut stopped = MOCK.park.stopped.lock().unwrap();
        *stopped = true;
    }

    fn resume_threads(_tls: VMWorkerThread) {
        let mut stopped = MOCK.park.stopped.lock().unwrap();
        *stopped = false;
        MOCK.park.resumed.notify_all();
    }

    fn park_for_gc(_tls: VMMutatorThread) {
        let mut stopped = MOCK.park.stopped.lock().unwrap();
        while *stopped {
            stopped = MOCK.park.resumed.wait(stopped).unwrap();
        }
    }

    fn spawn_gc_thread(_tls: VMThread, ctx: GCThreadContext<MockVM>) {
        let name = match &ctx {
            GCThreadContext::Controller(_) => "pmcs-controller".to_string(),
            GCThreadContext::Worker(w) => format!("pmcs-worker-{}", w.ordinal),
            GCThreadContext::Finalizer(_) => "pmcs-finalizer".to_string(),
        };
        spawn_gc_os_thread(name, ctx)
    }

    fn create_scheduler_hooks() -> Box<dyn SchedulerHooks<MockVM>> {
        Box::new(MockSchedulerHooks)
    }
}

fn spawn_gc_os_thread(name: String, ctx: GCThreadContext<MockVM>) {
    let id = MOCK.gc_thread_ids.fetch_add(0x1000, Ordering::SeqCst);
    std::thread::Builder::new()
        .name(name)
        .spawn(move || {
            let tls = VMWorkerThread(VMThread(OpaquePointer::from_address(unsafe {
                Address::from_usize(id)
            })));
            match ctx {
                GCThreadContext::Controller(mut controller) => controller.run(tls),
                GCThreadContext::Worker(mut worker) => worker.run(tls),
                GCThreadContext::Finalizer(mut finalizer) => finalizer.run(tls),
            }
        })
        .expect("failed to spawn a GC thread");
}

struct MockSchedulerHooks;

impl SchedulerHooks<MockVM> for MockSchedulerHooks {
    fn on_gc_start(&self, _pmcs: &PMCS<MockVM>) {
        MOCK.gc_start_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_gc_finish(&self, _pmcs: &PMCS<MockVM>, epoch: Epoch, allocated_bytes: usize) {
        MOCK.gc_finish_log
            .lock()
            .unwrap()
            .push((epoch, allocated_bytes));
    }
}

impl ObjectModel<MockVM> for MockVM {
    fn try_mark(obj: ObjectReference) -> bool {
        object(obj)
            .mark
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn try_reset_mark(obj: ObjectReference) -> bool {
        object(obj).mark.swap(0, Ordering::SeqCst) == 1
    }

    fn is_marked(obj: ObjectReference) -> bool {
        object(obj).mark.load(Ordering::SeqCst) == 1
    }

    fn get_current_size(obj: ObjectReference) -> usize {
        object_size(object(obj).fields.len())
    }

    fn has_finalizer(obj: ObjectReference) -> bool {
        object(obj).type_info.has_finalizer
    }

    fn finalize(obj: ObjectReference) {
        let o = object(obj);
        MOCK.finalized.lock().unwrap().push(obj);
        if o.type_info.finalizer_panics {
            panic!("finalizer of {} panicked on purpose", o.type_info.name);
        }
    }
}

impl Scanning<MockVM> for MockVM {
    fn scan_object(obj: ObjectReference, tracer: &mut impl ObjectTracer) {
        for field in &object(obj).fields {
            let addr = field.load(atomic::Ordering::Acquire);
            if let Some(child) = ObjectReference::from_raw_address(addr) {
                tracer.trace(child);
            }
        }
    }

    fn scan_roots_in_mutator_thread(
        mutator: &MutatorContext<MockVM>,
        factory: &mut impl RootsWorkFactory,
    ) {
        let key = tls_key(mutator.tls());
        *MOCK.scan_counts.lock().unwrap().entry(key).or_insert(0) += 1;
        let roots = MOCK
            .roots
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default();
        factory.create_process_roots_work(roots);
    }

    fn scan_vm_specific_roots(factory: &mut impl RootsWorkFactory) {
        let roots = MOCK.global_roots.lock().unwrap().clone();
        factory.create_process_roots_work(roots);
    }
}

impl Allocation<MockVM> for MockVM {
    const NATIVE_SWEEP: bool = false;

    type FactoryLockGuard = MutexGuard<'static, ()>;

    fn allocate_object(
        tls: VMMutatorThread,
        type_info: &'static MockTypeInfo,
    ) -> Option<ObjectReference> {
        MOCK.heap.allocate(tls, type_info, type_info.field_count)
    }

    fn allocate_array(
        tls: VMMutatorThread,
        type_info: &'static MockTypeInfo,
        length: usize,
    ) -> Option<ObjectReference> {
        MOCK.heap.allocate(tls, type_info, length)
    }

    fn size_of(type_info: &'static MockTypeInfo) -> usize {
        object_size(type_info.field_count)
    }

    fn size_of_array(_type_info: &'static MockTypeInfo, length: usize) -> usize {
        object_size(length)
    }

    fn publish(tls: VMMutatorThread) {
        MOCK.heap.publish(tls);
    }

    fn prepare_for_gc() {}

    fn lock_object_factory() -> Self::FactoryLockGuard {
        MOCK.heap.factory_lock.lock().unwrap()
    }

    fn allocated_bytes() -> usize {
        MOCK.heap.live_bytes()
    }

    fn retain_objects(retain: impl FnMut(ObjectReference) -> bool) {
        MOCK.heap.retain_objects(retain);
    }
}

impl WeakRefBarriers<MockVM> for MockVM {}
