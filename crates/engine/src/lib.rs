//! # Hostlink Engine
//!
//! Runs declarative multi-step workflows against a table of tools, passing data
//! produced by one step into the parameters of later steps.
//!
//! ## Key Features
//!
//! - **Plan Parsing**: YAML or JSON plan documents via [`parse_plan_file`]
//! - **Placeholder Chaining**: `${step_N_key}` references to earlier step results
//! - **Fail-soft Execution**: failed steps are recorded and the run continues
//! - **Tool Dispatch**: closures, bridge-backed host operations, and the executor itself as a tool
//!
//! ## Usage
//!
//! ```rust
//! use hostlink_engine::parse_plan_file;
//!
//! let temp_dir = tempfile::tempdir()?;
//! let plan_path = temp_dir.path().join("plan.yaml");
//! std::fs::write(&plan_path, r#"
//! user_request: "select all doors"
//! execution_plan:
//!   - tool: get_elements_by_category
//!     params:
//!       category_name: Doors
//!   - tool: select_elements_by_id
//!     params:
//!       element_ids: "${step_1_element_ids}"
//! "#)?;
//!
//! let plan = parse_plan_file(&plan_path)?;
//! assert_eq!(plan.execution_plan.len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`resolve`**: placeholder substitution over JSON parameter trees
//! - **`tools`**: the [`Tool`] trait and [`ToolRegistry`]
//! - **`executor`**: [`WorkflowExecutor`] and plan previews
//! - **`agent`**: the capped tool-call loop used by planners

use std::{fs, path::Path};

use anyhow::{Context, Result};
use hostlink_types::WorkflowPlan;

pub mod agent;
pub mod error;
pub mod executor;
pub mod resolve;
pub mod tools;

pub use agent::{DEFAULT_MAX_TOOL_ITERATIONS, PlannerTurn, ToolCall, ToolCallPlanner, ToolLoopOutcome, TranscriptEntry, run_configured_tool_loop, run_tool_loop};
pub use error::ExecutorError;
pub use executor::{StepPreview, WorkflowExecutor, preview_plan};
pub use resolve::{ChainedValues, resolve_placeholders};
pub use tools::{BridgeOperationTool, FnTool, Tool, ToolRegistry, WORKFLOW_TOOL_NAME, WorkflowTool};

/// Loads a plan document with automatic format detection.
///
/// `.json` files are parsed as JSON; everything else as YAML (a superset of JSON).
/// The document is `{user_request, execution_plan: [...]}`; `steps` is accepted as an
/// alias for `execution_plan`, and a bare list of steps is accepted with an empty request.
pub fn parse_plan_file(file_path: impl AsRef<Path>) -> Result<WorkflowPlan> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read plan file: {}", file_path.display()))?;

    let is_json = file_path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    let document: serde_json::Value = if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON plan: {}", file_path.display()))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML plan: {}", file_path.display()))?
    };

    let plan = match document {
        serde_json::Value::Array(steps) => WorkflowPlan {
            user_request: String::new(),
            execution_plan: serde_json::from_value(serde_json::Value::Array(steps))?,
        },
        other => serde_json::from_value(other)?,
    };
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_plan() {
        let temp_dir = tempfile::tempdir().unwrap();
        let plan_path = temp_dir.path().join("plan.yml");
        fs::write(
            &plan_path,
            r#"
user_request: "put level 1 on a sheet"
steps:
  - tool: list_views
    description: "find the view"
  - tool: place_view_on_sheet
    params:
      view_name: "Level 1"
"#,
        )
        .unwrap();

        let plan = parse_plan_file(&plan_path).expect("parse yaml plan");
        assert_eq!(plan.user_request, "put level 1 on a sheet");
        assert_eq!(plan.execution_plan[0].description, "find the view");
        assert_eq!(plan.execution_plan[1].params["view_name"], "Level 1");
    }

    #[test]
    fn parses_json_plan_and_bare_list() {
        let temp_dir = tempfile::tempdir().unwrap();
        let json_path = temp_dir.path().join("plan.json");
        fs::write(&json_path, r#"{"user_request": "list", "execution_plan": [{"tool": "list_views"}]}"#).unwrap();
        assert_eq!(parse_plan_file(&json_path).unwrap().execution_plan[0].tool, "list_views");

        let list_path = temp_dir.path().join("steps.yaml");
        fs::write(&list_path, "- tool: list_views\n- tool: list_sheets\n").unwrap();
        let plan = parse_plan_file(&list_path).unwrap();
        assert!(plan.user_request.is_empty());
        assert_eq!(plan.execution_plan.len(), 2);
    }

    #[test]
    fn reports_missing_and_malformed_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = parse_plan_file(temp_dir.path().join("absent.yaml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read plan file"));

        let broken_path = temp_dir.path().join("broken.json");
        fs::write(&broken_path, "{").unwrap();
        let broken = parse_plan_file(&broken_path).unwrap_err();
        assert!(broken.to_string().contains("Invalid JSON plan"));
    }
}
