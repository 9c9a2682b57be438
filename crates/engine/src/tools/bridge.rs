use std::time::Duration;

use anyhow::Result;
use hostlink_api::BridgeClient;
use hostlink_types::ToolBinding;
use serde_json::{Map, Value};
use tracing::debug;

use super::Tool;

/// Tool that runs a host operation through the execution bridge and waits for it.
#[derive(Debug, Clone)]
pub struct BridgeOperationTool {
    name: String,
    operation: String,
    description: String,
    surfaced_fields: Vec<String>,
    client: BridgeClient,
    timeout: Duration,
}

impl BridgeOperationTool {
    pub fn new(name: impl Into<String>, operation: impl Into<String>, client: BridgeClient, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            operation: operation.into(),
            description: String::new(),
            surfaced_fields: Vec::new(),
            client,
            timeout,
        }
    }

    /// Build from a configured binding; the operation defaults to the tool name.
    pub fn from_binding(binding: &ToolBinding, client: BridgeClient, timeout: Duration) -> Self {
        Self {
            name: binding.name.clone(),
            operation: binding.operation_name().to_string(),
            description: binding.description.clone(),
            surfaced_fields: binding.surfaced_fields.clone(),
            client,
            timeout,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

#[async_trait::async_trait]
impl Tool for BridgeOperationTool {
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
        debug!(tool = %self.name, operation = %self.operation, "forwarding tool call to bridge");
        let value = self.client.submit_and_wait(&self.operation, params, self.timeout).await?;
        Ok(mark_success(value))
    }
}

fn mark_success(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.entry("status").or_insert_with(|| Value::String("success".to_string()));
            Value::Object(object)
        }
        other => other,
    }
}
