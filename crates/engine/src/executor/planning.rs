//! Static inspection of a plan before it runs.

use hostlink_types::WorkflowPlan;
use serde::Serialize;
use serde_json::Value;

use crate::resolve::placeholder_references;
use crate::tools::ToolRegistry;

/// What a step will do, as far as can be told without running anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepPreview {
    pub step_number: usize,
    pub tool: String,
    pub description: String,
    /// Whether the tool is registered.
    pub tool_available: bool,
    /// Placeholders that point at an earlier step.
    pub references: Vec<String>,
    /// Placeholders that point at this step or a later one; these never resolve.
    pub forward_references: Vec<String>,
}

impl StepPreview {
    pub fn has_problems(&self) -> bool {
        !self.tool_available || !self.forward_references.is_empty()
    }
}

/// Describe every step of `plan` against the available tools.
pub fn preview_plan(plan: &WorkflowPlan, tools: &ToolRegistry) -> Vec<StepPreview> {
    plan.execution_plan
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let step_number = index + 1;
            let (references, forward_references) = placeholder_references(&Value::Object(step.params.clone()))
                .into_iter()
                .partition::<Vec<_>, _>(|reference| reference.step_number < step_number);
            StepPreview {
                step_number,
                tool: step.tool.clone(),
                description: step.description.clone(),
                tool_available: tools.contains(&step.tool),
                references: references.into_iter().map(|reference| reference.text).collect(),
                forward_references: forward_references.into_iter().map(|reference| reference.text).collect(),
            }
        })
        .collect()
}
