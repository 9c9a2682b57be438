//! Sequential workflow executor.
//!
//! Steps run strictly in plan order. A failing step is recorded and the run
//! continues; only an executor-level fault (a plan or step that cannot be
//! decoded) stops the run early with `final_status = error`.

mod planning;
mod step_once;

pub use planning::{StepPreview, preview_plan};
pub use step_once::CONVENTIONAL_CHAIN_FIELDS;

use std::sync::Arc;

use hostlink_types::{FinalStatus, WorkflowPhase, WorkflowPlan, WorkflowReport, WorkflowStep};
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::error::ExecutorError;
use crate::tools::ToolRegistry;
use step_once::{StepRun, run_step};

/// Runs workflow plans against a tool registry.
#[derive(Debug, Clone)]
pub struct WorkflowExecutor {
    tools: Arc<ToolRegistry>,
}

impl WorkflowExecutor {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Execute a typed plan.
    #[instrument(skip_all, fields(steps = plan.execution_plan.len()))]
    pub async fn execute(&self, plan: &WorkflowPlan) -> WorkflowReport {
        let steps = plan.execution_plan.iter().cloned().map(Ok).collect();
        self.run(&plan.user_request, plan.execution_plan.len(), steps).await
    }

    /// Execute an untyped plan as produced by a planner.
    ///
    /// `plan` is a list of steps, or an object carrying the list under
    /// `execution_plan` (or `steps`). A step that fails to decode halts the run when
    /// it is reached, with the earlier steps already recorded.
    #[instrument(skip_all)]
    pub async fn execute_raw(&self, user_request: &str, plan: &Value) -> WorkflowReport {
        let entries = match plan_entries(plan) {
            Ok(entries) => entries,
            Err(fault) => {
                let mut report = WorkflowReport::planned(user_request, 0);
                abort(&mut report, &fault);
                return report;
            }
        };
        let steps = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| decode_step(index + 1, entry))
            .collect();
        self.run(user_request, entries.len(), steps).await
    }

    async fn run(&self, user_request: &str, steps_planned: usize, steps: Vec<Result<WorkflowStep, ExecutorError>>) -> WorkflowReport {
        let mut report = WorkflowReport::planned(user_request, steps_planned);
        report.phase = WorkflowPhase::Running;
        info!(steps_planned, "workflow execution started");

        for (index, step) in steps.into_iter().enumerate() {
            let step = match step {
                Ok(step) => step,
                Err(fault) => {
                    abort(&mut report, &fault);
                    return report;
                }
            };
            let StepRun { outcome, raw_result } = run_step(&self.tools, index + 1, &step, &mut report.chained_values).await;
            report.executed_steps.push(outcome);
            report.step_results.push(raw_result);
        }

        summarize(&mut report);
        report.phase = WorkflowPhase::Finished;
        info!(
            final_status = ?report.final_status,
            completed = report.completed_count(),
            failed = report.error_count(),
            "workflow completed: {}",
            report.summary
        );
        report
    }
}

fn plan_entries(plan: &Value) -> Result<&Vec<Value>, ExecutorError> {
    let list = match plan {
        Value::Object(object) => object.get("execution_plan").or_else(|| object.get("steps")).unwrap_or(plan),
        other => other,
    };
    list.as_array().ok_or_else(|| ExecutorError::InvalidPlan {
        found: value_kind(list).to_string(),
    })
}

fn decode_step(step_number: usize, entry: &Value) -> Result<WorkflowStep, ExecutorError> {
    if !entry.is_object() {
        return Err(ExecutorError::MalformedStep {
            step_number,
            reason: format!("expected an object, got {}", value_kind(entry)),
        });
    }
    serde_json::from_value(entry.clone()).map_err(|error| ExecutorError::MalformedStep {
        step_number,
        reason: error.to_string(),
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn summarize(report: &mut WorkflowReport) {
    let completed = report.completed_count();
    let failed = report.error_count();
    let (final_status, summary) = if failed == 0 {
        (FinalStatus::Success, format!("Successfully completed all {completed} planned steps"))
    } else if completed > 0 {
        (FinalStatus::Partial, format!("Completed {completed} steps, {failed} steps failed"))
    } else {
        (FinalStatus::Failed, format!("All {failed} steps failed"))
    };
    report.final_status = final_status;
    report.summary = summary;
}

fn abort(report: &mut WorkflowReport, fault: &ExecutorError) {
    let message = fault.to_string();
    error!(error = %message, executed = report.executed_steps.len(), "workflow execution error");
    report.final_status = FinalStatus::Error;
    report.summary = format!("Workflow execution failed: {message}");
    report.error = Some(message);
    report.phase = WorkflowPhase::Finished;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;
    use anyhow::bail;
    use hostlink_types::StepOutcomeStatus;
    use serde_json::{Map, json};

    fn tools() -> Arc<ToolRegistry> {
        let mut tools = ToolRegistry::new();
        tools
            .register(FnTool::new("get_elements_by_category", |params| {
                let category = params.get("category_name").and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(json!({
                    "status": "success",
                    "category": category,
                    "element_ids": ["1", "2", "3"],
                    "count": 3
                }))
            }))
            .register(FnTool::new("select_elements_by_id", |params| {
                Ok(json!({ "status": "success", "selected": params.get("element_ids").cloned().unwrap_or(Value::Null) }))
            }))
            .register(FnTool::new("annotate", |params| Ok(json!({ "status": "success", "note": params["note"] }))))
            .register(FnTool::new("place_view_on_sheet", |_| bail!("view 'Level 1' is already placed")))
            .register(FnTool::new("report_error", |_| Ok(json!({ "status": "error", "message": "no sheet selected" }))));
        Arc::new(tools)
    }

    fn step(tool: &str, params: Value) -> WorkflowStep {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        WorkflowStep::new(tool, params)
    }

    fn plan(steps: Vec<WorkflowStep>) -> WorkflowPlan {
        WorkflowPlan {
            user_request: "select all doors".into(),
            execution_plan: steps,
        }
    }

    #[tokio::test]
    async fn chains_values_between_steps() {
        let executor = WorkflowExecutor::new(tools());
        let report = executor
            .execute(&plan(vec![
                step("get_elements_by_category", json!({ "category_name": "Doors" })),
                step("select_elements_by_id", json!({ "element_ids": "${step_1_element_ids}" })),
                step("annotate", json!({ "note": "ids: ${step_1_element_ids} (${step_1_count})" })),
            ]))
            .await;

        assert_eq!(report.final_status, FinalStatus::Success);
        assert_eq!(report.summary, "Successfully completed all 3 planned steps");
        assert_eq!(report.phase, WorkflowPhase::Finished);
        assert_eq!(report.step_results[1]["selected"], json!(["1", "2", "3"]));
        assert_eq!(report.step_results[2]["note"], json!("ids: ['1', '2', '3'] (3)"));
        assert_eq!(report.chained_values["step_1_count"], json!(3));
    }

    #[tokio::test]
    async fn middle_failure_is_partial() {
        let executor = WorkflowExecutor::new(tools());
        let report = executor
            .execute(&plan(vec![
                step("get_elements_by_category", json!({ "category_name": "Walls" })),
                step("place_view_on_sheet", json!({ "view_name": "Level 1" })),
                step("select_elements_by_id", json!({ "element_ids": "${step_1_element_ids}" })),
            ]))
            .await;

        assert_eq!(report.final_status, FinalStatus::Partial);
        assert_eq!(report.summary, "Completed 2 steps, 1 steps failed");
        assert_eq!(report.executed_steps.len(), 3);
        assert_eq!(report.executed_steps[1].status, StepOutcomeStatus::Error);
        assert_eq!(report.executed_steps[1].error.as_deref(), Some("view 'Level 1' is already placed"));
        assert_eq!(
            report.step_results[1],
            json!({ "status": "error", "message": "view 'Level 1' is already placed" })
        );
    }

    #[tokio::test]
    async fn panicking_step_is_recorded_and_the_run_continues() {
        let executor = WorkflowExecutor::new(tools());
        let report = executor
            .execute(&plan(vec![
                step("get_elements_by_category", json!({ "category_name": "Doors" })),
                step("annotate", json!({})),
                step("select_elements_by_id", json!({ "element_ids": "${step_1_element_ids}" })),
            ]))
            .await;

        assert_eq!(report.final_status, FinalStatus::Partial);
        assert_eq!(report.summary, "Completed 2 steps, 1 steps failed");
        assert_eq!(report.executed_steps.len(), 3);
        assert_eq!(report.executed_steps[1].status, StepOutcomeStatus::Error);
        let message = report.executed_steps[1].error.as_deref().unwrap_or_default();
        assert!(message.starts_with("tool 'annotate' panicked"), "unexpected message: {message}");
        assert_eq!(report.step_results[1]["status"], "error");
        assert_eq!(report.step_results[0]["count"], 3);
        assert_eq!(report.step_results[2]["selected"], json!(["1", "2", "3"]));
    }

    #[tokio::test]
    async fn surfaced_fields_chain_into_later_steps() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                FnTool::new("create_sheet", |_| Ok(json!({ "status": "success", "sheet_id": "A101" })))
                    .with_description("Create a sheet")
                    .with_surfaced_fields(["sheet_id"]),
            )
            .register(FnTool::new("place_view_on_sheet", |params| {
                Ok(json!({ "status": "success", "placed_on": params.get("sheet_id").cloned().unwrap_or(Value::Null) }))
            }));
        let executor = WorkflowExecutor::new(Arc::new(registry));
        assert_eq!(executor.tools().names(), vec!["create_sheet", "place_view_on_sheet"]);

        let report = executor
            .execute(&plan(vec![
                step("create_sheet", json!({})).with_description("new sheet for the plan"),
                step("place_view_on_sheet", json!({ "sheet_id": "${step_1_sheet_id}" })),
            ]))
            .await;

        assert_eq!(report.final_status, FinalStatus::Success);
        assert_eq!(report.executed_steps[0].description, "new sheet for the plan");
        assert_eq!(report.step_results[1]["placed_on"], "A101");
        assert_eq!(report.chained_values["step_1_sheet_id"], "A101");
    }

    #[tokio::test]
    async fn every_step_failing_is_failed() {
        let executor = WorkflowExecutor::new(tools());
        let report = executor
            .execute(&plan(vec![
                step("place_view_on_sheet", json!({})),
                step("report_error", json!({})),
                step("teleport", json!({})),
            ]))
            .await;

        assert_eq!(report.final_status, FinalStatus::Failed);
        assert_eq!(report.summary, "All 3 steps failed");
        assert_eq!(report.executed_steps[1].error.as_deref(), Some("no sheet selected"));
        assert_eq!(report.executed_steps[2].error.as_deref(), Some("Unknown tool: teleport"));
        assert_eq!(
            report.step_results[2],
            json!({ "status": "error", "message": "Tool 'teleport' not available" })
        );
    }

    #[tokio::test]
    async fn failed_steps_record_nothing_for_later_steps() {
        let executor = WorkflowExecutor::new(tools());
        let report = executor
            .execute(&plan(vec![
                step("report_error", json!({})),
                step("select_elements_by_id", json!({ "element_ids": "${step_1_element_ids}" })),
            ]))
            .await;

        assert_eq!(report.final_status, FinalStatus::Partial);
        assert_eq!(report.step_results[1]["selected"], json!("${step_1_element_ids}"));
        assert!(report.chained_values.is_empty());
    }

    #[tokio::test]
    async fn empty_plan_succeeds() {
        let report = WorkflowExecutor::new(tools()).execute(&plan(Vec::new())).await;
        assert_eq!(report.final_status, FinalStatus::Success);
        assert_eq!(report.summary, "Successfully completed all 0 planned steps");
    }

    #[tokio::test]
    async fn malformed_raw_step_halts_with_error() {
        let executor = WorkflowExecutor::new(tools());
        let raw = json!([
            { "tool": "get_elements_by_category", "params": { "category_name": "Doors" } },
            "select everything",
            { "tool": "select_elements_by_id", "params": {} }
        ]);
        let report = executor.execute_raw("select doors", &raw).await;

        assert_eq!(report.final_status, FinalStatus::Error);
        assert_eq!(report.steps_planned, 3);
        assert_eq!(report.executed_steps.len(), 1);
        assert_eq!(report.error.as_deref(), Some("step 2 is malformed: expected an object, got a string"));
        assert_eq!(
            report.summary,
            "Workflow execution failed: step 2 is malformed: expected an object, got a string"
        );
    }

    #[tokio::test]
    async fn raw_plan_accepts_wrapped_list_and_missing_tool() {
        let executor = WorkflowExecutor::new(tools());
        let raw = json!({
            "execution_plan": [
                { "params": { "category_name": "Doors" } },
                { "tool": "get_elements_by_category" }
            ]
        });
        let report = executor.execute_raw("doors", &raw).await;

        assert_eq!(report.final_status, FinalStatus::Partial);
        assert_eq!(report.executed_steps[0].error.as_deref(), Some("Unknown tool: "));
    }

    #[tokio::test]
    async fn non_list_plan_is_an_executor_fault() {
        let report = WorkflowExecutor::new(tools()).execute_raw("doors", &json!("do it")).await;
        assert_eq!(report.final_status, FinalStatus::Error);
        assert_eq!(report.error.as_deref(), Some("execution plan must be a list of steps, got a string"));
        assert!(report.executed_steps.is_empty());
    }

    #[test]
    fn report_serializes_for_callers() {
        let mut report = WorkflowReport::planned("r", 0);
        summarize(&mut report);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["final_status"], json!("success"));
    }
}
