//! Tiered variable store.
//!
//! Variables carry an origin tier that decides whether a later assignment
//! may overwrite an earlier one. The ordering is fixed by the dialect:
//! conditional makefile assignments (`?=`) lose to everything, `load_env`
//! entries lose to the process environment, and unconditional makefile
//! assignments (`=`) win over all of them. Stored values are always fully
//! expanded; expansion happens eagerly before [`VarStore::set`] is called.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use tracing::warn;

use crate::location::Location;

/// Precedence rank of a variable's origin, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// `NAME ?= value` in a makefile.
    MakefileConditional,
    /// A key loaded from a file via `load_env`.
    EnvFile,
    /// The process environment at startup.
    ShellEnv,
    /// `NAME = value` in a makefile.
    MakefileUnconditional,
}

#[derive(Debug, Clone)]
struct Variable {
    value: String,
    tier: Tier,
    origin: Location,
}

/// Mapping from variable name to value with layered write precedence.
///
/// The store also materialises the environment handed to sub-processes:
/// every non-`ShellEnv` entry overrides whatever the launcher inherits.
/// Materialisation is memoised and invalidated by any write.
#[derive(Debug, Default)]
pub struct VarStore {
    vars: HashMap<String, Variable>,
    cached_env: RefCell<Option<Arc<Vec<(String, String)>>>>,
    materialising: Cell<bool>,
}

impl VarStore {
    /// Create a store seeded with the process environment at tier
    /// [`Tier::ShellEnv`].
    #[must_use]
    pub fn from_process_env() -> Self {
        let mut store = Self::default();
        for (name, value) in env::vars() {
            if name.is_empty() {
                continue;
            }
            store.vars.insert(
                name,
                Variable {
                    value,
                    tier: Tier::ShellEnv,
                    origin: Location::shell_environment(),
                },
            );
        }
        store
    }

    /// Write `name` according to the tier precedence policy.
    ///
    /// Conditional assignments only take effect when the name is absent at
    /// any tier. Other writes succeed when the name is absent or the
    /// incoming tier ranks at least as high as the stored one. When one
    /// unconditional makefile assignment overwrites another, a warning
    /// naming both locations is emitted on the diagnostic stream.
    pub fn set(&mut self, name: &str, value: String, tier: Tier, origin: Location) {
        // Any accepted or rejected write may change what sub-processes
        // should observe, so drop the memoised environment up front.
        *self.cached_env.get_mut() = None;

        if tier == Tier::MakefileConditional {
            if !self.vars.contains_key(name) {
                self.vars
                    .insert(name.to_owned(), Variable { value, tier, origin });
            }
            return;
        }

        if let Some(prev) = self.vars.get(name) {
            if tier < prev.tier {
                return;
            }
            if tier == Tier::MakefileUnconditional && prev.tier == Tier::MakefileUnconditional {
                warn!(
                    "variable '{name}' redefined at {origin} (previous definition at {})",
                    prev.origin,
                );
            }
        }
        self.vars
            .insert(name.to_owned(), Variable { value, tier, origin });
    }

    /// Look up the stored value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|entry| entry.value.as_str())
    }

    /// Materialise the environment overrides for sub-processes.
    ///
    /// Returns every stored variable that did not originate from the shell
    /// environment; the launcher inherits the rest. The result is sorted by
    /// name so a run observes a stable environment, and memoised until the
    /// next write.
    #[must_use]
    pub fn environment(&self) -> Arc<Vec<(String, String)>> {
        if let Some(cached) = self.cached_env.borrow().as_ref() {
            return Arc::clone(cached);
        }

        // Sub-shell evaluation is disabled while this flag is set; see
        // `materialising`.
        self.materialising.set(true);
        let mut entries: Vec<(String, String)> = self
            .vars
            .iter()
            .filter(|(_, entry)| entry.tier != Tier::ShellEnv)
            .map(|(name, entry)| (name.clone(), entry.value.clone()))
            .collect();
        entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        self.materialising.set(false);

        let entries = Arc::new(entries);
        *self.cached_env.borrow_mut() = Some(Arc::clone(&entries));
        entries
    }

    /// Whether the store is currently materialising its environment.
    ///
    /// While true, `$(shell …)` evaluation must yield an empty string
    /// instead of launching a process, which would recurse back into
    /// materialisation.
    #[must_use]
    pub fn materialising(&self) -> bool {
        self.materialising.get()
    }
}
