//! The updater's operation state machine.
//!
//! ```text
//! idle -> checking    -> idle
//! idle -> downloading -> idle
//! idle -> installing  -> idle      (install and rollback)
//! ```
//!
//! Operations never queue: starting one while another runs fails with
//! [`UpdaterError::Busy`] and leaves the state unchanged. Transitions back to
//! `idle` happen in [`StateGuard`]'s `Drop`, so a failed or panicking
//! operation cannot wedge the machine. Install and rollback move their guard
//! into the blocking task running the engine: the state stays `installing`
//! until the engine returns, even if the caller stops waiting.

use crate::core::{Result, UpdaterError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// The operation currently holding the updater.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Idle,
    Checking,
    Downloading,
    /// Used by both install and rollback.
    Installing,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Installing => "installing",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the state machine for callers polling progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdaterState {
    pub current: Operation,
    /// `true` iff `current` is not idle.
    pub locked: bool,
    /// Same as `locked`.
    pub is_busy: bool,
}

impl From<Operation> for UpdaterState {
    fn from(current: Operation) -> Self {
        let locked = current != Operation::Idle;
        Self {
            current,
            locked,
            is_busy: locked,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StateMachine {
    current: Mutex<Operation>,
}

impl StateMachine {
    fn lock(&self) -> MutexGuard<'_, Operation> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> UpdaterState {
        UpdaterState::from(*self.lock())
    }

    /// Move from idle to `operation`; the guard moves back on drop.
    ///
    /// The guard owns a handle to the machine, so it can travel with work
    /// handed to another task and keep the state until that work ends.
    pub(crate) fn begin(self: &Arc<Self>, operation: Operation, requested: &'static str) -> Result<StateGuard> {
        let mut current = self.lock();
        if *current != Operation::Idle {
            debug!(requested, current = %*current, "Refusing operation, updater is busy");
            return Err(UpdaterError::Busy {
                requested,
                current: *current,
            });
        }
        *current = operation;
        debug!(state = %operation, "Updater state changed");
        Ok(StateGuard {
            machine: Arc::clone(self),
        })
    }

    /// Run `f` while idle, holding the state lock so no operation can start meanwhile.
    ///
    /// `refused_during` lists operations that must never overlap `f`; they are
    /// checked before the general idle check.
    pub(crate) fn while_idle<T>(
        &self,
        requested: &'static str,
        refused_during: &[Operation],
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let current = self.lock();
        if refused_during.contains(&*current) || *current != Operation::Idle {
            return Err(UpdaterError::Busy {
                requested,
                current: *current,
            });
        }
        let result = f();
        drop(current);
        result
    }
}

/// Holds a non-idle state; dropping it returns the machine to idle.
#[derive(Debug)]
pub(crate) struct StateGuard {
    machine: Arc<StateMachine>,
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        *self.machine.lock() = Operation::Idle;
        debug!(state = "idle", "Updater state changed");
    }
}
