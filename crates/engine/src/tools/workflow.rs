use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use super::{Tool, ToolRegistry};
use crate::executor::WorkflowExecutor;

pub const WORKFLOW_TOOL_NAME: &str = "plan_and_execute_workflow";

/// Exposes the workflow executor as a tool so a planner can submit a whole plan in one call.
///
/// Params: `{user_request: string, execution_plan: [step, ...]}`. Steps dispatch to the base
/// registry the tool was built over, which does not contain the tool itself.
#[derive(Debug, Clone)]
pub struct WorkflowTool {
    executor: WorkflowExecutor,
}

impl WorkflowTool {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            executor: WorkflowExecutor::new(tools),
        }
    }
}

#[async_trait::async_trait]
impl Tool for WorkflowTool {
    fn name(&self) -> &str {
        WORKFLOW_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run a multi-step plan. Later steps can use ${step_N_key} to reference element_ids, count or elements from step N."
    }

    async fn invoke(&self, params: Map<String, Value>) -> Result<Value> {
        let user_request = params.get("user_request").and_then(Value::as_str).unwrap_or_default();
        let plan = params.get("execution_plan").unwrap_or(&Value::Null);
        let report = self.executor.execute_raw(user_request, plan).await;
        serde_json::to_value(&report).context("serialize workflow report")
    }
}
