//! Side-table data for objects that need more than a header: finalization
//! and weak associations.  Entries are swept independently of their base
//! objects; when the base object dies, the entry is discarded (after routing
//! a finalizable base through the finalizer queue exactly once).

use crate::finalizer::FinalizerQueue;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, VMBinding};
use atomic::{Atomic, Ordering};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

/// A side-table entry attached to one object.
pub struct ExtraObjectData<VM: VMBinding> {
    base: ObjectReference,
    type_info: &'static VM::VMTypeInfo,
    /// The base object has a finalizer that must run when it dies.
    finalizable: bool,
    /// The finalizer has been queued; the base object's storage is retained
    /// for one more epoch and then reclaimed without re-queueing.
    finalized: AtomicBool,
    /// A weak association: cleared (set to zero) once the target is found
    /// dead.  Read through [`crate::memory_manager::try_ref`].
    weak_target: Atomic<Address>,
}

impl<VM: VMBinding> ExtraObjectData<VM> {
    /// The object this entry belongs to.
    pub fn base(&self) -> ObjectReference {
        self.base
    }

    /// The type info recorded at creation.
    pub fn type_info(&self) -> &'static VM::VMTypeInfo {
        self.type_info
    }

    /// Associate a weak target with this entry.
    pub fn set_weak_target(&self, target: ObjectReference) {
        self.weak_target
            .store(target.to_raw_address(), Ordering::Release);
    }

    /// The weak cell, for [`crate::memory_manager::try_ref`].
    pub fn weak_cell(&self) -> &Atomic<Address> {
        &self.weak_target
    }

    fn clear_dead_weak(&self) {
        let target = self.weak_target.load(Ordering::Acquire);
        if let Some(object) = ObjectReference::from_raw_address(target) {
            if !VM::VMObjectModel::is_marked(object) {
                trace!("Clearing weak reference {} -> {}", self.base, object);
                self.weak_target.store(Address::ZERO, Ordering::Release);
            }
        }
    }
}

/// The registry of all extra object data, keyed by base object.
pub(crate) struct ExtraObjectRegistry<VM: VMBinding> {
    entries: Mutex<HashMap<ObjectReference, Arc<ExtraObjectData<VM>>>>,
}

impl<VM: VMBinding> ExtraObjectRegistry<VM> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Attach extra data to `object`.  `finalizable` records whether the
    /// object's type has a finalizer.
    pub fn register(
        &self,
        object: ObjectReference,
        type_info: &'static VM::VMTypeInfo,
        finalizable: bool,
    ) -> Arc<ExtraObjectData<VM>> {
        let data = Arc::new(ExtraObjectData {
            base: object,
            type_info,
            finalizable,
            finalized: AtomicBool::new(false),
            weak_target: Atomic::new(Address::ZERO),
        });
        let previous = self
            .entries
            .lock()
            .unwrap()
            .insert(object, data.clone());
        debug_assert!(previous.is_none(), "extra object data registered twice");
        data
    }

    /// Look up the entry for `object`.
    pub fn get(&self, object: ObjectReference) -> Option<Arc<ExtraObjectData<VM>>> {
        self.entries.lock().unwrap().get(&object).cloned()
    }

    /// Clear every weak cell whose target is unmarked.  Used by the
    /// concurrent weak sweep, while mutators run behind the weak barriers.
    #[cfg(feature = "concurrent_weak_sweep")]
    pub fn process_weak_refs(&self) {
        let entries = self.entries.lock().unwrap();
        for data in entries.values() {
            data.clear_dead_weak();
        }
    }

    /// The registry's share of the sweep.  Runs before the object pass, while
    /// this epoch's marks are still set:
    /// * weak cells of surviving entries pointing at dead targets are
    ///   cleared;
    /// * if `route_finalizable` is set (the generic sweep path), entries of
    ///   dead, finalizable, not-yet-finalized bases move the base into
    ///   `queue` and stay for one more epoch;
    /// * all other entries of dead bases are dropped.  Allocators with a
    ///   native sweep track finalizables themselves, so their path passes
    ///   `route_finalizable = false` and dead entries simply leave.
    ///
    /// Returns the set of objects queued for finalization, so the object
    /// pass can retain their storage.
    pub fn sweep_registry(
        &self,
        queue: &mut FinalizerQueue,
        route_finalizable: bool,
    ) -> HashSet<ObjectReference> {
        let mut queued = HashSet::new();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|&base, data| {
            if VM::VMObjectModel::is_marked(base) {
                data.clear_dead_weak();
                return true;
            }
            if route_finalizable
                && data.finalizable
                && !data.finalized.swap(true, Ordering::SeqCst)
            {
                trace!("Queueing {} for finalization", base);
                queue.push(base);
                queued.insert(base);
                return true;
            }
            trace!("Dropping extra object data of dead object {}", base);
            false
        });
        queued
    }
}
