//! Declarative workflow plan and the report produced while executing it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of an execution plan: a tool name plus its (possibly templated) params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Name of the tool to dispatch to. A missing name fails the step, not the plan.
    #[serde(default)]
    pub tool: String,
    /// Named parameters; string values may contain `${step_N_key}` placeholders.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Free text describing what the step accomplishes.
    #[serde(default)]
    pub description: String,
}

impl WorkflowStep {
    pub fn new(tool: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            params,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A plan document as loaded from disk or received from a planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    /// The original request the plan was derived from.
    #[serde(default)]
    pub user_request: String,
    /// Ordered steps.
    #[serde(default, alias = "steps")]
    pub execution_plan: Vec<WorkflowStep>,
}

/// Per-step outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcomeStatus {
    Completed,
    Error,
}

/// Record of what happened when a single step ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// 1-based position in the plan.
    pub step_number: usize,
    pub tool: String,
    #[serde(default)]
    pub description: String,
    pub status: StepOutcomeStatus,
    /// Tool result on success, uniform error object on failure.
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == StepOutcomeStatus::Completed
    }
}

/// Lifecycle of a workflow report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    #[default]
    Planned,
    Running,
    Finished,
}

/// Aggregate verdict over all executed steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    /// No step failed.
    #[default]
    Success,
    /// At least one step succeeded and at least one failed.
    Partial,
    /// Every step failed.
    Failed,
    /// The executor itself faulted and stopped early.
    Error,
}

/// Running account of a workflow execution, returned to the caller when the plan is exhausted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    #[serde(default)]
    pub user_request: String,
    #[serde(default)]
    pub phase: WorkflowPhase,
    pub steps_planned: usize,
    #[serde(default)]
    pub executed_steps: Vec<StepOutcome>,
    /// Raw tool results (or error objects), index-aligned with `executed_steps`.
    #[serde(default)]
    pub step_results: Vec<Value>,
    /// Values recorded for placeholder lookup, keyed `step_{n}_{key}`.
    #[serde(default)]
    pub chained_values: IndexMap<String, Value>,
    #[serde(default)]
    pub final_status: FinalStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowReport {
    /// Fresh report for a plan that has not started yet.
    pub fn planned(user_request: impl Into<String>, steps_planned: usize) -> Self {
        Self {
            user_request: user_request.into(),
            steps_planned,
            ..Default::default()
        }
    }

    pub fn completed_count(&self) -> usize {
        self.executed_steps.iter().filter(|outcome| outcome.is_completed()).count()
    }

    pub fn error_count(&self) -> usize {
        self.executed_steps.len() - self.completed_count()
    }
}
