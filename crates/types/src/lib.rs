//! Shared data model for the host bridge, the poller client, and the workflow engine.
//!
//! Everything in this crate is plain serde data: the request/result pair that crosses the
//! bridge's HTTP front, the declarative workflow plan and its report, and the settings file.

pub mod event;
pub mod settings;
pub mod workflow;

pub use event::{EventResult, HostRequest, TriggerPayload, TriggerResponse};
pub use settings::{AgentSettings, BridgeSettings, PollerSettings, Settings, ToolBinding};
pub use workflow::{FinalStatus, StepOutcome, StepOutcomeStatus, WorkflowPhase, WorkflowPlan, WorkflowReport, WorkflowStep};
