//! Mocks and fixtures shared by the Switchboard test suites.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use switchboard_core::config::{AppConfig, ModelConfig};
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::security::ToolTrust;
use switchboard_core::traits::{CustomerDirectory, LlmClient, ModelRequest, Tool};
use switchboard_core::types::{AgentResponse, ToolCallRequest, ToolContext, ToolResult};

enum Scripted {
    Respond(AgentResponse),
    Fail(String),
}

/// Language model that replays a fixed script and records every request.
///
/// Running past the end of the script is an `LlmRequest` error.
#[derive(Default)]
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<AgentResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Scripted::Respond).collect()),
            ..Self::default()
        }
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push(&self, response: AgentResponse) {
        self.script.lock().await.push_back(Scripted::Respond(response));
    }

    pub async fn push_error(&self, message: impl Into<String>) {
        self.script.lock().await.push_back(Scripted::Fail(message.into()));
    }

    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

impl LlmClient for ScriptedLlm {
    fn invoke(&self, _config: &ModelConfig, request: ModelRequest) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.requests.lock().await.push(request);
            match self.script.lock().await.pop_front() {
                Some(Scripted::Respond(response)) => Ok(response),
                Some(Scripted::Fail(message)) => Err(SwitchboardError::LlmRequest(message)),
                None => Err(SwitchboardError::LlmRequest("script exhausted".into())),
            }
        })
    }
}

/// Build a tool call with a readable fixed id.
pub fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::with_id(id, name, args)
}

/// Tool that counts executions and returns a fixed output.
pub struct CountingTool {
    name: String,
    trust: ToolTrust,
    output: String,
    calls: Arc<AtomicUsize>,
}

impl CountingTool {
    pub fn new(name: impl Into<String>, trust: ToolTrust, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trust,
            output: output.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter, readable after the tool moved into a registry.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Counts its executions."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn trust(&self) -> ToolTrust {
        self.trust
    }

    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::success(self.output.clone()))
        })
    }
}

/// Tool whose backend is always down.
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            Err(SwitchboardError::ToolExecution {
                tool: self.name.clone(),
                message: self.message.clone(),
            })
        })
    }
}

/// Customer directory that is unreachable.
pub struct FailingDirectory;

impl CustomerDirectory for FailingDirectory {
    fn fetch_profile(&self, _customer_id: &str) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async { Err(SwitchboardError::Database("directory unreachable".into())) })
    }

    fn update_address(&self, _customer_id: &str, _address: &str) -> BoxFuture<'_, Result<String>> {
        Box::pin(async { Err(SwitchboardError::Database("directory unreachable".into())) })
    }
}

/// Minimal config with a temp workspace. Keep the `TempDir` alive.
pub fn test_config() -> (tempfile::TempDir, AppConfig) {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let toml = format!(
        r#"
[agent]
workspace = "{}"

[model]
provider = "openai"
model_id = "test-model"
"#,
        dir.path().display()
    );
    let config = AppConfig::parse(&toml).unwrap_or_else(|e| panic!("test config: {e}"));
    (dir, config)
}

/// Path for a throwaway SQLite file. Keep the `TempDir` alive.
pub fn temp_db_path() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let path = dir.path().join("sessions.db");
    (dir, path)
}
