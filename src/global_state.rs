use atomic_refcell::AtomicRefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Process-wide flags and counters for a PMCS instance.  Components keep a
/// reference to this struct instead of reaching through the instance, so the
/// access pattern stays easy to reason about: everything here is a plain
/// atomic, written by the controller and read from mutator fast paths.
pub struct GlobalState {
    /// Whether PMCS is ready for collection.  Set when `pmcs_init` has
    /// spawned the controller.
    pub(crate) initialized: AtomicBool,
    /// The global "pending STW" flag.  The safepoint fast path is one load of
    /// this flag; the controller raises it before asking the binding to
    /// deliver the suspension request and clears it right before resuming.
    pub(crate) stw_requested: AtomicBool,
    /// Whether a marking epoch has begun and not yet ended.  Gates the
    /// suspension hook's root claiming and cooperative assistance.
    pub(crate) marking_active: AtomicBool,
    /// The epoch the mark dispatcher is currently armed for (raw number, 0
    /// when idle).  Only meaningful while `marking_active` is set.
    pub(crate) marking_epoch: AtomicU64,
    /// Whether the weak-reference barriers are armed for the in-flight epoch.
    /// Read by `try_ref`.
    pub(crate) weak_barriers_armed: AtomicBool,
    /// When did the current collection start?  Only accessed by the
    /// controller.
    pub(crate) gc_start_time: AtomicRefCell<Option<Instant>>,
    /// Bytes allocated since the last collection finished.  Only used for the
    /// end-of-GC log line; the external scheduler gets the allocator's own
    /// live figure.
    pub(crate) allocation_bytes: AtomicUsize,
    /// Number of completed collections.
    pub(crate) gc_count: AtomicUsize,
}

impl GlobalState {
    /// Is PMCS initialized?
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Is a stop-the-world request pending?  This is the safepoint fast-path
    /// check, so it is a relaxed load; the slow path synchronizes through the
    /// rendezvous mutex.
    pub fn is_stw_requested(&self) -> bool {
        self.stw_requested.load(Ordering::Relaxed)
    }

    pub(crate) fn set_stw_requested(&self, requested: bool) {
        self.stw_requested.store(requested, Ordering::SeqCst);
    }

    /// Is a marking phase currently armed?
    pub fn is_marking_active(&self) -> bool {
        self.marking_active.load(Ordering::Acquire)
    }

    /// Increase the allocation bytes and return the current allocation bytes
    /// after increasing.
    pub fn increase_allocation_bytes_by(&self, size: usize) -> usize {
        let old_allocation_bytes = self.allocation_bytes.fetch_add(size, Ordering::SeqCst);
        trace!(
            "old_allocation_bytes = {}, size = {}, allocation_bytes = {}",
            old_allocation_bytes,
            size,
            self.allocation_bytes.load(Ordering::Relaxed),
        );
        old_allocation_bytes + size
    }

    /// Bytes allocated since the last collection finished.
    pub fn allocation_bytes(&self) -> usize {
        self.allocation_bytes.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_allocation_bytes(&self) {
        self.allocation_bytes.store(0, Ordering::SeqCst);
    }

    /// Number of completed collections.
    pub fn gc_count(&self) -> usize {
        self.gc_count.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_gc_count(&self) {
        self.gc_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Are the weak-reference barriers armed for the in-flight epoch?
    pub fn weak_barriers_armed(&self) -> bool {
        self.weak_barriers_armed.load(Ordering::Acquire)
    }

    #[cfg(feature = "concurrent_weak_sweep")]
    pub(crate) fn set_weak_barriers_armed(&self, armed: bool) {
        self.weak_barriers_armed.store(armed, Ordering::Release);
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            stw_requested: AtomicBool::new(false),
            marking_active: AtomicBool::new(false),
            marking_epoch: AtomicU64::new(0),
            gc_start_time: AtomicRefCell::new(None),
            weak_barriers_armed: AtomicBool::new(false),
            allocation_bytes: AtomicUsize::new(0),
            gc_count: AtomicUsize::new(0),
        }
    }
}
