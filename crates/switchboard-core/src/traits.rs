use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::Result;
use crate::security::ToolTrust;
use crate::state::SessionState;
use crate::types::*;

/// One request to the language model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    /// Schemas the model may call. The model must not call anything else.
    pub tools: Vec<ToolDefinition>,
}

/// LLM client. Maps a history plus tool schema to content and/or tool calls.
pub trait LlmClient: Send + Sync + 'static {
    fn invoke(&self, config: &ModelConfig, request: ModelRequest) -> BoxFuture<'_, Result<AgentResponse>>;
}

/// A named handler with a declared input schema.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }

    /// Declared trust class (default: safe).
    fn trust(&self) -> ToolTrust {
        ToolTrust::Safe
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Summary row for listing sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub message_count: usize,
    pub active_skill: String,
    pub updated_at: DateTime<Utc>,
}

/// Persistence backend. Both `load` and `save` are atomic per id.
pub trait SessionStore: Send + Sync + 'static {
    /// Load the state of a session, if it exists.
    fn load(&self, sid: &SessionId) -> BoxFuture<'_, Result<Option<SessionState>>>;

    /// Upsert the full state of a session.
    fn save(&self, sid: &SessionId, state: &SessionState) -> BoxFuture<'_, Result<()>>;

    /// Most recently updated sessions first.
    fn list(&self, limit: usize) -> BoxFuture<'_, Result<Vec<SessionSummary>>>;

    /// Remove a session. Returns whether it existed.
    fn delete(&self, sid: &SessionId) -> BoxFuture<'_, Result<bool>>;
}

/// Customer record backend used by the directory tools.
pub trait CustomerDirectory: Send + Sync + 'static {
    /// Fetch the profile of a customer.
    fn fetch_profile(&self, customer_id: &str) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Update the postal address of a customer. Returns a confirmation text.
    fn update_address(&self, customer_id: &str, address: &str) -> BoxFuture<'_, Result<String>>;
}
