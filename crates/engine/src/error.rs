//! Executor-level faults.
//!
//! Step failures are not errors at this level; they are recorded in the report.
//! These variants stop a workflow early and set its final status to `error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("execution plan must be a list of steps, got {found}")]
    InvalidPlan { found: String },

    #[error("step {step_number} is malformed: {reason}")]
    MalformedStep { step_number: usize, reason: String },
}
