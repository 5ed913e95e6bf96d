//! A PMCS instance.

use crate::finalizer::FinalizerProcessor;
use crate::global_state::GlobalState;
use crate::scheduler::controller::ControllerExit;
use crate::scheduler::{EpochStates, GCRequester, MarkDispatcher};
use crate::util::extra_objects::ExtraObjectRegistry;
use crate::util::options::Options;
use crate::vm::{Collection, SchedulerHooks, VMBinding};
use std::default::Default;
use std::sync::{Arc, Mutex};

/// PMCS builder.  This is used to set options before actually creating an
/// instance.
pub struct PMCSBuilder {
    /// The options for this instance.
    pub options: Options,
}

impl PMCSBuilder {
    /// Create a builder with options read from environment variables, or
    /// using built-in defaults if not overridden by environment variables.
    pub fn new() -> Self {
        let mut builder = Self::new_no_env_vars();
        builder.options.read_env_var_settings();
        builder
    }

    /// Create a builder with built-in default options, without reading
    /// environment variables.
    pub fn new_no_env_vars() -> Self {
        PMCSBuilder {
            options: Options::default(),
        }
    }

    /// Set an option by name.
    pub fn set_option(&mut self, name: &str, val: &str) -> bool {
        self.options.set_from_string(name, val)
    }

    /// Build a PMCS instance from this builder.
    pub fn build<VM: VMBinding>(&self) -> PMCS<VM> {
        PMCS::new(Arc::new(self.options.clone()))
    }
}

impl Default for PMCSBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A PMCS instance: the garbage collection core for one heap.  Bindings
/// create it through [`PMCSBuilder`], keep it at a stable address for the
/// lifetime of the process, and talk to it through
/// [`crate::memory_manager`].
pub struct PMCS<VM: VMBinding> {
    pub(crate) options: Arc<Options>,
    pub(crate) state: Arc<GlobalState>,
    pub(crate) epoch_states: Arc<EpochStates>,
    pub(crate) requester: GCRequester<VM>,
    pub(crate) scheduler: Arc<MarkDispatcher<VM>>,
    pub(crate) finalizer: FinalizerProcessor<VM>,
    pub(crate) extra_objects: ExtraObjectRegistry<VM>,
    pub(crate) hooks: Box<dyn SchedulerHooks<VM>>,
    /// Serializes `perform_full_gc` against `reconfigure`.  Process-wide; no
    /// per-epoch lock exists.
    pub(crate) gc_lock: Mutex<()>,
    pub(crate) controller_exit: ControllerExit,
}

unsafe impl<VM: VMBinding> Sync for PMCS<VM> {}
unsafe impl<VM: VMBinding> Send for PMCS<VM> {}

impl<VM: VMBinding> PMCS<VM> {
    /// Create a PMCS instance.  This is not public; bindings should use
    /// [`PMCSBuilder::build`].
    pub(crate) fn new(options: Arc<Options>) -> Self {
        let state = Arc::new(GlobalState::default());
        let epoch_states = Arc::new(EpochStates::new());
        let requester = GCRequester::new(epoch_states.clone());
        let scheduler = MarkDispatcher::new(&options, state.clone());
        let hooks = VM::VMCollection::create_scheduler_hooks();

        PMCS {
            options,
            state,
            epoch_states,
            requester,
            scheduler,
            finalizer: FinalizerProcessor::new(),
            extra_objects: ExtraObjectRegistry::new(),
            hooks,
            gc_lock: Mutex::new(()),
            controller_exit: ControllerExit::new(),
        }
    }

    /// The options this instance was built with.
    pub fn get_options(&self) -> &Options {
        &self.options
    }

    /// The number of auxiliary mark workers in the current pool.
    pub fn num_workers(&self) -> usize {
        self.scheduler.num_workers()
    }
}
