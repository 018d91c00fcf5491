use thiserror::Error;

/// Text shown to end users when a step fails fatally. Diagnostic detail stays
/// in the run log.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong, please try again.";

#[derive(Debug, Error)]
pub enum SwitchboardError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Routing errors
    #[error("Invalid route: skill '{skill}' emitted call to '{tool}' outside its bound tool set")]
    InvalidRoute { skill: String, tool: String },

    #[error("Unknown skill: {0}")]
    UnknownSkill(String),

    #[error("Graph definition invalid: {0}")]
    GraphBuild(String),

    // Agent errors
    #[error("Agent '{skill}' produced no actionable output after {attempts} attempts")]
    NoActionableOutput { skill: String, attempts: usize },

    #[error("Step exceeded max graph iterations ({0})")]
    MaxIterationsExceeded(usize),

    #[error("Step cancelled")]
    Cancelled,

    // Approval errors
    #[error("No pending approval for session: {0}")]
    NoPendingApproval(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitchboardError {
    /// Whether this error aborts the current step.
    ///
    /// Tool errors are folded back into the conversation by the executor and
    /// never reach the caller; everything else that surfaces from a step is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ToolNotFound(_)
                | Self::ToolExecution { .. }
                | Self::ToolTimeout { .. }
                | Self::ToolValidation(_)
        )
    }

    /// The message an end user should see for this error.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoPendingApproval(_) => "There is nothing waiting for your approval.",
            _ => GENERIC_FAILURE_MESSAGE,
        }
    }
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;
