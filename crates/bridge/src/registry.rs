//! Host operation registry.
//!
//! Operations are registered by name before the host thread starts and are
//! invoked only on that thread with exclusive access to the host state `H`.

use std::panic::{self, AssertUnwindSafe};

use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// A named unit of work executed on the host thread.
///
/// Any `Fn(&mut H, &Map<String, Value>) -> Result<Value>` closure is an operation.
pub trait HostOperation<H>: Send + Sync {
    fn execute(&self, host: &mut H, params: &Map<String, Value>) -> Result<Value>;
}

impl<H, F> HostOperation<H> for F
where
    F: Fn(&mut H, &Map<String, Value>) -> Result<Value> + Send + Sync,
{
    fn execute(&self, host: &mut H, params: &Map<String, Value>) -> Result<Value> {
        self(host, params)
    }
}

/// Maps operation names to their implementations in registration order.
pub struct OperationRegistry<H> {
    operations: IndexMap<String, Box<dyn HostOperation<H>>>,
}

impl<H> Default for OperationRegistry<H> {
    fn default() -> Self {
        Self {
            operations: IndexMap::new(),
        }
    }
}

impl<H> std::fmt::Debug for OperationRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry").field("operations", &self.names()).finish()
    }
}

impl<H> OperationRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, operation: impl HostOperation<H> + 'static) -> &mut Self {
        self.operations.insert(name.into(), Box::new(operation));
        self
    }

    /// Register a plain closure. Equivalent to [`register`](Self::register) but
    /// pins the closure signature so callers need no type annotations.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, operation: F) -> &mut Self
    where
        F: Fn(&mut H, &Map<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, operation)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Execute `name` against the host state.
    ///
    /// Unknown names and panics inside the operation both come back as errors so the
    /// caller can record a `failed` result and keep draining.
    pub fn execute(&self, host: &mut H, name: &str, params: &Map<String, Value>) -> Result<Value> {
        let operation = self
            .operations
            .get(name)
            .ok_or_else(|| anyhow!("operation '{name}' is not implemented"))?;

        match panic::catch_unwind(AssertUnwindSafe(|| operation.execute(host, params))) {
            Ok(outcome) => outcome,
            Err(payload) => Err(anyhow!("operation '{name}' panicked: {}", panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
