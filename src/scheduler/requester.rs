use crate::scheduler::EpochStates;
use crate::util::epoch::Epoch;
use crate::vm::VMBinding;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// This data structure lets mutators trigger GC without taking the epoch
/// state machine's mutex on every call.
///
/// [`EpochStates::schedule`] already collapses consecutive requests into a
/// single pending epoch, but it always takes a mutex.  Allocation slow paths
/// and safepoint polls may request collections at a high rate while one is
/// already pending, so the requester caches the pending epoch behind an
/// atomic flag and answers repeat requests without the lock.
pub struct GCRequester<VM: VMBinding> {
    /// Set between a successful `request` and the start of the collection it
    /// scheduled.  While set, `last_requested` holds the pending epoch.
    request_flag: AtomicBool,
    /// The epoch number handed out for the current request.  Only valid
    /// while `request_flag` is observed set (the flag is stored with release
    /// ordering after this field).
    last_requested: AtomicU64,
    state: Arc<EpochStates>,
    phantom: PhantomData<VM>,
}

impl<VM: VMBinding> GCRequester<VM> {
    pub fn new(state: Arc<EpochStates>) -> Self {
        GCRequester {
            request_flag: AtomicBool::new(false),
            last_requested: AtomicU64::new(0),
            state,
            phantom: PhantomData,
        }
    }

    /// Request a GC.  Returns the epoch the collection will run as.  Called
    /// by mutators when polling (during allocation), from `on_oom`, and when
    /// handling user GC requests.
    pub fn request(&self) -> Epoch {
        // Fast path: a request is already pending; return its epoch without
        // touching the state machine.  The acquire load pairs with the
        // release store in the slow path, so `last_requested` is visible.
        if self.request_flag.load(Ordering::Acquire) {
            let cached = self.last_requested.load(Ordering::Relaxed);
            if cached != 0 {
                return Epoch::from_number(cached);
            }
        }

        let epoch = self.state.schedule();
        self.last_requested.store(epoch.number(), Ordering::Relaxed);
        self.request_flag.store(true, Ordering::Release);
        epoch
    }

    /// Clear the "GC requested" flag so that mutators can trigger the next
    /// GC.  Called by the controller once all mutators have come to a stop;
    /// a `request` racing with this may still observe the epoch that just
    /// started, which is indistinguishable from having requested just before
    /// the stop.
    pub fn clear_request(&self) {
        self.request_flag.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_requests_collapse() {
        let state = Arc::new(EpochStates::new());
        let requester: GCRequester<crate::util::test_util::mock_vm::MockVM> =
            GCRequester::new(state.clone());
        let e1 = requester.request();
        assert_eq!(requester.request(), e1);
        state.start(e1);
        requester.clear_request();
        let e2 = requester.request();
        assert_eq!(e2, e1.next());
    }
}
