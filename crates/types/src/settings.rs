//! Settings file model.
//!
//! Every field has a default so a partial (or absent) file is valid.

use serde::{Deserialize, Serialize};

/// Root of `settings.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub poller: PollerSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    /// Tools exposed to workflows, each forwarding to a bridge operation.
    #[serde(default)]
    pub tools: Vec<ToolBinding>,
}

/// Execution bridge host settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Loopback address the HTTP front binds to.
    pub bind_address: String,
    /// How long terminal results are retained, measured from enqueue time.
    pub retention_secs: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:48884".to_string(),
            retention_secs: 600,
        }
    }
}

/// Completion poller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollerSettings {
    /// Base URL of the bridge HTTP front.
    pub base_url: String,
    /// Tried in order when `base_url` refuses connections.
    pub fallback_urls: Vec<String>,
    pub poll_interval_ms: u64,
    /// Default wait for a single operation.
    pub timeout_secs: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:48884".to_string(),
            fallback_urls: vec!["http://127.0.0.1:48885".to_string(), "http://127.0.0.1:48886".to_string()],
            poll_interval_ms: 500,
            timeout_secs: 60,
        }
    }
}

/// Guard rails for LLM-driven tool-call loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    pub max_tool_iterations: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { max_tool_iterations: 5 }
    }
}

/// Exposes a bridge operation as a named workflow tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolBinding {
    pub name: String,
    /// Operation name on the bridge; defaults to the tool name.
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Extra result fields recorded for placeholder lookup.
    #[serde(default)]
    pub surfaced_fields: Vec<String>,
}

impl ToolBinding {
    pub fn operation_name(&self) -> &str {
        self.operation.as_deref().unwrap_or(&self.name)
    }
}
