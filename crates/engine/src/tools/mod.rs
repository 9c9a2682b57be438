//! Tool dispatch table.
//!
//! A [`Tool`] is a provider-neutral named callable. Workflow steps and the
//! tool-call loop look tools up by name in a [`ToolRegistry`]; tools that touch
//! host state forward to the execution bridge ([`BridgeOperationTool`]).

mod bridge;
mod workflow;

pub use bridge::BridgeOperationTool;
pub use workflow::{WORKFLOW_TOOL_NAME, WorkflowTool};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use futures_util::FutureExt;
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// A named callable reachable from workflow steps and planners.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Result fields recorded for placeholder lookup in addition to
    /// `element_ids`, `count` and `elements`.
    fn surfaced_fields(&self) -> &[String] {
        &[]
    }

    async fn invoke(&self, params: Map<String, Value>) -> Result<Value>;
}

/// Uniform failure object shared by tool results and step results.
pub fn error_result(message: impl Into<String>) -> Value {
    json!({ "status": "error", "message": message.into() })
}

/// Returns the message if `value` is shaped `{status: "error", ...}`.
pub fn error_message(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    if object.get("status").and_then(Value::as_str) != Some("error") {
        return None;
    }
    let message = object
        .get("message")
        .or_else(|| object.get("error"))
        .map(|message| match message {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "tool reported an error".to_string());
    Some(message)
}

/// Invoke `tool`, turning a panic inside it into an error.
pub(crate) async fn invoke_guarded(tool: &dyn Tool, params: Map<String, Value>) -> Result<Value> {
    match AssertUnwindSafe(tool.invoke(params)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(anyhow!("tool '{}' panicked: {}", tool.name(), panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Ordered name to tool mapping.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous tool with that name.
    pub fn register(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "replaced previously registered tool");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke `name` and always return an object: the tool's result, or
    /// `{status: "error", message}` for an unknown tool or a failed invocation.
    pub async fn call(&self, name: &str, params: Map<String, Value>) -> Value {
        let Some(tool) = self.get(name) else {
            return error_result(format!("Unknown tool: {name}"));
        };
        debug!(tool = %name, "calling tool");
        match invoke_guarded(tool.as_ref(), params).await {
            Ok(value) => value,
            Err(error) => {
                warn!(tool = %name, error = %error, "tool call failed");
                error_result(format!("{error:#}"))
            }
        }
    }
}

type ToolFn = dyn Fn(Map<String, Value>) -> Result<Value> + Send + Sync;

/// Closure-backed tool.
pub struct FnTool {
    name: String,
    description: String,
    surfaced_fields: Vec<String>,
    handler: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            surfaced_fields: Vec::new(),
            handler: Box::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_surfaced_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.surfaced_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait::async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn surfaced_fields(&self) -> &[String] {
        &self.surfaced_fields
    }

    async fn invoke(&self, params: Map<String, Value>) -> Result<Value> {
        (self.handler)(params)
    }
}
