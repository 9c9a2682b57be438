//! Provider-neutral tool-call loop.
//!
//! A [`ToolCallPlanner`] adapts one model provider's function-calling protocol. Each
//! turn it either asks for tool calls or gives a final reply. [`run_tool_loop`] runs
//! the requested tools, appends their results to the transcript, and asks again,
//! up to a fixed number of planner turns.

use anyhow::Result;
use hostlink_types::AgentSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::tools::{ToolRegistry, error_result};

/// Planner turns allowed before the loop gives up.
pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 5;

/// Reply used when the cap trips without a final answer.
pub const LIMIT_REACHED_REPLY: &str = "Reached tool execution limit without a final response.";

/// One tool invocation requested by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Expected to be an object; anything else is answered with an error result.
    #[serde(default)]
    pub arguments: Value,
}

/// Conversation as seen by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TranscriptEntry {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: Value,
    },
}

/// What the planner decided this turn.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerTurn {
    ToolCalls(Vec<ToolCall>),
    Reply(String),
}

#[async_trait::async_trait]
pub trait ToolCallPlanner: Send + Sync {
    async fn next_turn(&self, transcript: &[TranscriptEntry], tools: &ToolRegistry) -> Result<PlannerTurn>;
}

/// Final state of a tool loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolLoopOutcome {
    pub reply: String,
    /// Planner turns taken.
    pub iterations: u32,
    pub limit_reached: bool,
    pub transcript: Vec<TranscriptEntry>,
}

/// Alternate planner turns and tool execution until a reply or `max_iterations` turns.
///
/// Tool failures are fed back to the planner as `{status: "error", message}` results;
/// only a planner error ends the loop with `Err`.
pub async fn run_tool_loop(
    planner: &dyn ToolCallPlanner,
    tools: &ToolRegistry,
    mut transcript: Vec<TranscriptEntry>,
    max_iterations: u32,
) -> Result<ToolLoopOutcome> {
    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;
        debug!(iteration = iterations, entries = transcript.len(), "requesting planner turn");

        let calls = match planner.next_turn(&transcript, tools).await? {
            PlannerTurn::Reply(reply) => {
                transcript.push(TranscriptEntry::Assistant {
                    content: reply.clone(),
                    tool_calls: Vec::new(),
                });
                info!(iterations, "planner produced final reply");
                return Ok(ToolLoopOutcome {
                    reply,
                    iterations,
                    limit_reached: false,
                    transcript,
                });
            }
            PlannerTurn::ToolCalls(calls) => calls,
        };

        transcript.push(TranscriptEntry::Assistant {
            content: String::new(),
            tool_calls: calls.clone(),
        });
        for call in calls {
            let content = match call.arguments {
                Value::Object(arguments) => tools.call(&call.name, arguments).await,
                Value::Null => tools.call(&call.name, Default::default()).await,
                _ => {
                    warn!(tool = %call.name, "planner sent non-object tool arguments");
                    error_result(format!("Invalid arguments from planner for tool {}.", call.name))
                }
            };
            transcript.push(TranscriptEntry::Tool {
                tool_call_id: call.id,
                name: call.name,
                content,
            });
        }
    }

    warn!(iterations, "reached tool iteration limit without final response");
    Ok(ToolLoopOutcome {
        reply: LIMIT_REACHED_REPLY.to_string(),
        iterations,
        limit_reached: true,
        transcript,
    })
}

/// [`run_tool_loop`] capped by the configured iteration limit. A zero limit falls back to
/// [`DEFAULT_MAX_TOOL_ITERATIONS`].
pub async fn run_configured_tool_loop(
    planner: &dyn ToolCallPlanner,
    tools: &ToolRegistry,
    transcript: Vec<TranscriptEntry>,
    settings: &AgentSettings,
) -> Result<ToolLoopOutcome> {
    let max_iterations = match settings.max_tool_iterations {
        0 => DEFAULT_MAX_TOOL_ITERATIONS,
        limit => limit,
    };
    run_tool_loop(planner, tools, transcript, max_iterations).await
}
