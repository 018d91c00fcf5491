use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Message, Role, SessionId, ToolCallRequest};

/// Identifier of a skill (a delegate agent) or the primary agent.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillId(pub String);

impl SkillId {
    pub const PRIMARY: &'static str = "primary";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn primary() -> Self {
        Self(Self::PRIMARY.to_string())
    }

    pub fn is_primary(&self) -> bool {
        self.0 == Self::PRIMARY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SkillId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SkillId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stack of active delegate skills. Empty means the primary agent has control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillStack(Vec<SkillId>);

/// Reducer input for [`SkillStack::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackUpdate {
    Push(SkillId),
    Pop,
    Keep,
}

impl SkillStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, skill: SkillId) {
        self.0.push(skill);
    }

    /// Pop the active skill. Popping an empty stack yields `primary`.
    pub fn pop(&mut self) -> SkillId {
        self.0.pop().unwrap_or_else(SkillId::primary)
    }

    pub fn current(&self) -> SkillId {
        self.0.last().cloned().unwrap_or_else(SkillId::primary)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn skills(&self) -> &[SkillId] {
        &self.0
    }

    pub fn apply(&mut self, update: StackUpdate) -> SkillId {
        match update {
            StackUpdate::Push(skill) => {
                self.push(skill);
                self.current()
            }
            StackUpdate::Pop => {
                self.pop();
                self.current()
            }
            StackUpdate::Keep => self.current(),
        }
    }
}

/// A sensitive call held until a human approves or denies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub id: String,
    pub session_id: SessionId,
    pub skill: SkillId,
    pub call: ToolCallRequest,
    pub requested_at: DateTime<Utc>,
}

impl PendingApproval {
    pub fn new(session_id: SessionId, skill: SkillId, call: ToolCallRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            skill,
            call,
            requested_at: Utc::now(),
        }
    }
}

/// The unit of persistence for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub skill_stack: SkillStack,
    #[serde(default)]
    pub pending_approvals: Vec<PendingApproval>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            customer_id: None,
            messages: Vec::new(),
            context: None,
            skill_stack: SkillStack::new(),
            pending_approvals: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Append a message and apply a stack update as one mutation.
    pub fn append_with(&mut self, message: Message, update: StackUpdate) -> SkillId {
        self.messages.push(message);
        self.updated_at = Utc::now();
        self.skill_stack.apply(update)
    }

    /// Set the context once. Returns `false` if it was already set.
    pub fn set_context(&mut self, value: serde_json::Value) -> bool {
        if self.context.is_some() {
            return false;
        }
        self.context = Some(value);
        self.updated_at = Utc::now();
        true
    }

    pub fn active_skill(&self) -> SkillId {
        self.skill_stack.current()
    }

    pub fn is_suspended(&self) -> bool {
        !self.pending_approvals.is_empty()
    }

    /// Call ids issued by agent messages that have no matching tool message.
    pub fn unanswered_calls(&self) -> Vec<String> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        self.messages
            .iter()
            .filter(|m| m.role == Role::Agent)
            .flat_map(|m| m.tool_calls.iter())
            .filter(|c| !answered.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentResponse;
    use serde_json::json;

    #[test]
    fn pop_on_empty_yields_primary() {
        let mut stack = SkillStack::new();
        assert_eq!(stack.pop(), SkillId::primary());
        assert_eq!(stack.depth(), 0);
        assert!(stack.current().is_primary());
    }

    #[test]
    fn push_pop_returns_to_caller() {
        let mut stack = SkillStack::new();
        stack.push("renewal".into());
        stack.push("questionnaire".into());
        assert_eq!(stack.current().as_str(), "questionnaire");
        assert_eq!(stack.pop().as_str(), "questionnaire");
        assert_eq!(stack.current().as_str(), "renewal");
    }

    #[test]
    fn apply_reducer() {
        let mut stack = SkillStack::new();
        assert_eq!(stack.apply(StackUpdate::Push("servicing".into())).as_str(), "servicing");
        assert_eq!(stack.apply(StackUpdate::Keep).as_str(), "servicing");
        assert!(stack.apply(StackUpdate::Pop).is_primary());
        assert!(stack.apply(StackUpdate::Pop).is_primary());
    }

    #[test]
    fn context_is_set_once() {
        let mut state = SessionState::new(SessionId::from_str("s1"));
        assert!(state.set_context(json!({"name": "Ana"})));
        assert!(!state.set_context(json!({"name": "Bo"})));
        assert_eq!(state.context.unwrap()["name"], "Ana");
    }

    #[test]
    fn unanswered_calls_tracks_orphans() {
        let mut state = SessionState::new(SessionId::from_str("s1"));
        let c1 = ToolCallRequest::with_id("c1", "a", json!({}));
        let c2 = ToolCallRequest::with_id("c2", "b", json!({}));
        state.append(Message::agent(
            SkillId::primary(),
            AgentResponse::calls(vec![c1, c2]),
        ));
        state.append(Message::tool_result("c1", "ok", false));
        assert_eq!(state.unanswered_calls(), vec!["c2".to_string()]);
        state.append(Message::tool_result("c2", "ok", false));
        assert!(state.unanswered_calls().is_empty());
    }

    #[test]
    fn stack_serializes_as_list() {
        let mut state = SessionState::new(SessionId::from_str("s1"));
        state.skill_stack.push("renewal".into());
        let v = serde_json::to_value(&state).unwrap();
        assert_eq!(v["skill_stack"], json!(["renewal"]));
        let back: SessionState = serde_json::from_value(v).unwrap();
        assert_eq!(back, state);
    }
}
