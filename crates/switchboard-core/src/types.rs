use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{PendingApproval, SkillId};

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Agent,
    Tool,
}

/// A tool invocation requested by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

impl ToolCallRequest {
    /// Create a call with a freshly generated id.
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// A unit of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    /// Skill that produced this message (agent messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<SkillId>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn base(role: Role) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
            skill: None,
            timestamp: Utc::now(),
        }
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::base(Role::Human)
        }
    }

    pub fn agent(skill: SkillId, response: AgentResponse) -> Self {
        Self {
            content: response.content,
            tool_calls: response.tool_calls,
            skill: Some(skill),
            ..Self::base(Role::Agent)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            content: Some(content.into()),
            tool_call_id: Some(call_id.into()),
            is_error,
            ..Self::base(Role::Tool)
        }
    }

    /// Synthetic human-role nudge sent to the model but never persisted.
    pub fn instruction(text: impl Into<String>) -> Self {
        Self::human(text)
    }

    /// Text content, or empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// What the language model returned for one invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Tagged view of an [`AgentResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum AgentDecision {
    Respond(String),
    CallTools(Vec<ToolCallRequest>),
    Empty,
}

impl AgentResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    /// Tool calls win over content; blank content counts as none.
    pub fn decision(&self) -> AgentDecision {
        if !self.tool_calls.is_empty() {
            return AgentDecision::CallTools(self.tool_calls.clone());
        }
        match self.content.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => AgentDecision::Respond(text.to_string()),
            _ => AgentDecision::Empty,
        }
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool definition for sending to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: SessionId,
    pub customer_id: Option<String>,
    /// Customer profile fetched at the start of the session, if any.
    pub profile: Option<serde_json::Value>,
}

impl ToolContext {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            customer_id: None,
            profile: None,
        }
    }
}

/// Event broadcast to all subscribers while a step runs.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A step began.
    StepStarted { session_id: SessionId, skill: SkillId },
    /// The one-time customer context was populated.
    ContextLoaded { session_id: SessionId },
    /// An agent node was invoked.
    AgentInvoked {
        session_id: SessionId,
        skill: SkillId,
        attempt: usize,
    },
    /// Empty model output; the agent is being re-prompted.
    EmptyResponseRetry {
        session_id: SessionId,
        skill: SkillId,
        attempt: usize,
    },
    /// Tool execution started.
    ToolStart {
        session_id: SessionId,
        name: String,
        call_id: String,
        input: serde_json::Value,
    },
    /// Tool execution completed.
    ToolEnd {
        session_id: SessionId,
        name: String,
        call_id: String,
        result: ToolResult,
    },
    /// Control moved to a delegate skill.
    SkillEntered { session_id: SessionId, skill: SkillId },
    /// A delegate skill returned control to its caller.
    SkillLeft {
        session_id: SessionId,
        skill: SkillId,
        resumed: SkillId,
        reason: String,
    },
    /// A sensitive call is waiting for approval.
    ApprovalRequested { pending: PendingApproval },
    /// Approval applied to a suspended batch.
    ApprovalResolved {
        session_id: SessionId,
        call_id: String,
        approved: bool,
    },
    /// Step finished with a response or a suspension.
    StepComplete {
        session_id: SessionId,
        skill: SkillId,
        suspended: bool,
        messages: usize,
    },
    /// Step aborted by a fatal error.
    StepFailed { session_id: SessionId, error: String },
}

impl AgentEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::StepStarted { session_id, .. }
            | Self::ContextLoaded { session_id }
            | Self::AgentInvoked { session_id, .. }
            | Self::EmptyResponseRetry { session_id, .. }
            | Self::ToolStart { session_id, .. }
            | Self::ToolEnd { session_id, .. }
            | Self::SkillEntered { session_id, .. }
            | Self::SkillLeft { session_id, .. }
            | Self::ApprovalResolved { session_id, .. }
            | Self::StepComplete { session_id, .. }
            | Self::StepFailed { session_id, .. } => session_id,
            Self::ApprovalRequested { pending } => &pending.session_id,
        }
    }
}
