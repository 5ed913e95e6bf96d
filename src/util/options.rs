//! PMCS tunables.
//!
//! Options are set once when the instance is built, either programmatically
//! through [`crate::PMCSBuilder`] or from `PMCS_*` environment variables.
//! The only post-initialization mutation is `memory_manager::reconfigure`,
//! which rebuilds the worker pool under the GC mutex.

use std::default::Default;
use std::fmt::Debug;

fn always_valid<T>(_: &T) -> bool {
    true
}

/// A PMCS option of a given type.
/// This type allows us to store some metadata for the option. To get the value of an option,
/// you can simply dereference it (for example, `*options.threads`).
#[derive(Clone)]
pub struct PMCSOption<T: Debug + Clone> {
    /// The actual value for the option
    value: T,
    /// The validator to ensure the value is valid.
    validator: fn(&T) -> bool,
}

impl<T: Debug + Clone> PMCSOption<T> {
    /// Create a new PMCSOption
    pub fn new(value: T, validator: fn(&T) -> bool) -> Self {
        debug_assert!(
            validator(&value),
            "Unable to create PMCSOption: initial value {:?} is invalid",
            value
        );
        PMCSOption { value, validator }
    }

    /// Set the option to the given value. Returns true if the value is valid,
    /// and we set the option to the value.
    pub fn set(&mut self, value: T) -> bool {
        if (self.validator)(&value) {
            self.value = value;
            return true;
        }
        false
    }
}

// Dereference an option to get its value.
impl<T: Debug + Clone> std::ops::Deref for PMCSOption<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

macro_rules! options {
    ($($(#[$outer:meta])* $name:ident: $type:ty [$validator:expr] = $default:expr),* $(,)?) => {
        /// The tunables of a PMCS instance.
        #[derive(Clone)]
        pub struct Options {
            $($(#[$outer])* pub $name: PMCSOption<$type>),*
        }

        impl Options {
            /// Set an option by name from its string representation.  Returns
            /// false if the name is unknown, the value fails to parse, or the
            /// value fails the option's validator.
            pub fn set_from_string(&mut self, s: &str, val: &str) -> bool {
                match s {
                    $(stringify!($name) => if let Ok(typed_val) = val.parse::<$type>() {
                        self.$name.set(typed_val)
                    } else {
                        false
                    },)*
                    _ => false,
                }
            }

            /// Set options from environment variables starting with `PMCS_`,
            /// e.g. `PMCS_THREADS=4`.  Invalid values are logged and ignored.
            pub fn read_env_var_settings(&mut self) {
                const PREFIX: &str = "PMCS_";
                for (key, val) in std::env::vars() {
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        if !self.set_from_string(lowercase, &val) {
                            warn!("Ignoring invalid option from env var: {}={}", key, val);
                        }
                    }
                }
            }
        }

        impl Default for Options {
            fn default() -> Self {
                Options {
                    $($name: PMCSOption::new($default, $validator)),*
                }
            }
        }
    };
}

/// The default number of auxiliary mark workers.
fn default_threads() -> usize {
    if cfg!(feature = "single_worker") {
        0
    } else {
        num_cpus::get()
    }
}

fn validate_threads(v: &usize) -> bool {
    // Under single_worker the controller must be the only marker.
    !cfg!(feature = "single_worker") || *v == 0
}

options! {
    /// Number of auxiliary GC threads dedicated to marking.  The controller
    /// always participates in marking, so 0 still makes progress.  Must be 0
    /// when the `single_worker` feature is enabled.
    threads: usize [validate_threads] = default_threads(),
    /// Upper bound on the number of concurrent markers: the controller, the
    /// auxiliary workers, and cooperating mutators together.
    max_parallelism: usize [|v: &usize| *v >= 1] = default_threads() + 1,
    /// Whether mutators that reach a safepoint while marking is active may
    /// assist with traversal before parking.  Only honored when the crate is
    /// built with the `cooperative_marking` feature.
    mutators_cooperate: bool [always_valid] = true,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let options = Options::default();
        if cfg!(feature = "single_worker") {
            assert_eq!(*options.threads, 0);
        } else {
            assert!(*options.threads >= 1);
        }
        assert!(*options.max_parallelism >= 1);
        assert!(*options.mutators_cooperate);
    }

    #[test]
    fn set_from_string() {
        let mut options = Options::default();
        assert!(options.set_from_string("mutators_cooperate", "false"));
        assert!(!*options.mutators_cooperate);
        assert!(options.set_from_string("max_parallelism", "3"));
        assert_eq!(*options.max_parallelism, 3);
        // Validator rejects a zero marker budget.
        assert!(!options.set_from_string("max_parallelism", "0"));
        assert_eq!(*options.max_parallelism, 3);
        // Unknown keys and garbage values are rejected.
        assert!(!options.set_from_string("no_such_option", "1"));
        assert!(!options.set_from_string("threads", "not-a-number"));
    }

    #[test]
    #[cfg(not(feature = "single_worker"))]
    fn set_threads() {
        let mut options = Options::default();
        assert!(options.set_from_string("threads", "2"));
        assert_eq!(*options.threads, 2);
    }
}
