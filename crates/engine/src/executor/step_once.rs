//! Run a single workflow step against the tool registry.

use hostlink_types::{StepOutcome, StepOutcomeStatus, WorkflowStep};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::resolve::{ChainedValues, chain_key, resolve_params};
use crate::tools::{ToolRegistry, error_message, error_result, invoke_guarded};

/// Result fields every tool may hand to later steps.
pub const CONVENTIONAL_CHAIN_FIELDS: [&str; 3] = ["element_ids", "count", "elements"];

/// What a step produced: its outcome record plus the raw entry for `step_results`.
pub(crate) struct StepRun {
    pub outcome: StepOutcome,
    pub raw_result: Value,
}

/// Resolve placeholders, dispatch, and classify one step. Records chained values on success.
pub(crate) async fn run_step(tools: &ToolRegistry, step_number: usize, step: &WorkflowStep, chained: &mut ChainedValues) -> StepRun {
    let params = resolve_params(&step.params, chained, step_number);
    info!(step = step_number, tool = %step.tool, description = %step.description, "executing workflow step");
    debug!(step = step_number, params = ?params, "step parameters after substitution");

    let Some(tool) = tools.get(&step.tool) else {
        warn!(step = step_number, tool = %step.tool, "workflow step names an unknown tool");
        return failed(
            step_number,
            step,
            format!("Unknown tool: {}", step.tool),
            error_result(format!("Tool '{}' not available", step.tool)),
        );
    };

    let value = match invoke_guarded(tool.as_ref(), params).await {
        Ok(value) => value,
        Err(failure) => {
            let message = format!("{failure:#}");
            error!(step = step_number, tool = %step.tool, error = %message, "workflow step failed");
            return failed(step_number, step, message.clone(), error_result(message));
        }
    };

    if let Some(message) = error_message(&value) {
        error!(step = step_number, tool = %step.tool, error = %message, "workflow step reported an error");
        return failed(step_number, step, message, value);
    }

    record_chained_values(chained, step_number, &value, tool.surfaced_fields());
    StepRun {
        outcome: StepOutcome {
            step_number,
            tool: step.tool.clone(),
            description: step.description.clone(),
            status: StepOutcomeStatus::Completed,
            result: value.clone(),
            error: None,
        },
        raw_result: value,
    }
}

fn failed(step_number: usize, step: &WorkflowStep, message: String, raw_result: Value) -> StepRun {
    StepRun {
        outcome: StepOutcome {
            step_number,
            tool: step.tool.clone(),
            description: step.description.clone(),
            status: StepOutcomeStatus::Error,
            result: raw_result.clone(),
            error: Some(message),
        },
        raw_result,
    }
}

/// Copy the conventional fields and any tool-declared fields out of an object result.
pub(crate) fn record_chained_values(chained: &mut ChainedValues, step_number: usize, value: &Value, surfaced_fields: &[String]) {
    let Some(object) = value.as_object() else {
        return;
    };
    let mut record = |field: &str| {
        if let Some(field_value) = object.get(field) {
            chained.insert(chain_key(step_number, field), field_value.clone());
        }
    };
    CONVENTIONAL_CHAIN_FIELDS.iter().for_each(|field| record(field));
    surfaced_fields.iter().for_each(|field| record(field));
}
