//! Completion handle of a construction running on another execution unit.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::error::Result;
use crate::value::Value;

struct HandleState {
    label: String,
    slot: Mutex<Option<Result<Value>>>,
    done: Condvar,
}

/// Dereferencing a handle blocks until the spawned unit completes, then
/// yields its value or re-raises its captured failure.
#[derive(Clone)]
pub struct ConstructionHandle {
    state: Arc<HandleState>,
}

impl ConstructionHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            state: Arc::new(HandleState {
                label: label.into(),
                slot: Mutex::new(None),
                done: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Result<Value>>> {
        match self.state.slot.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    pub fn label(&self) -> &str {
        &self.state.label
    }

    /// Record the outcome. Only the first completion is kept.
    pub fn complete(&self, result: Result<Value>) {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(result);
        }
        self.state.done.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        self.lock().is_some()
    }

    pub fn wait(&self) -> Result<Value> {
        let mut slot = self.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = match self.state.done.wait(slot) {
                Ok(guard) => guard,
                Err(poison) => poison.into_inner(),
            };
        }
    }

    pub fn same_handle(&self, other: &ConstructionHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }
}

impl fmt::Debug for ConstructionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructionHandle")
            .field("label", &self.state.label)
            .field("complete", &self.is_complete())
            .finish()
    }
}
