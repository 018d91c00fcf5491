use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use switchboard_core::config::ModelConfig;
use switchboard_core::error::Result;
use switchboard_core::security::{ToolTrust, TrustPolicy};
use switchboard_core::state::{SessionState, SkillId};
use switchboard_core::traits::{LlmClient, ModelRequest};
use switchboard_core::types::{AgentResponse, Message, ToolDefinition};
use switchboard_tools::ToolRegistry;

/// Pseudo-tool a delegate calls to hand control back to its caller.
pub const ESCALATION_MARKER: &str = "CompleteOrEscalate";

const ESCALATION_DESCRIPTION: &str = "A tool to mark the current task as completed and/or to escalate \
control of the dialog to the main assistant, who can re-route the dialog based on the user's needs.";

const NO_CONTEXT: &str = "No customer information is available.";

/// A pseudo-tool that transfers control to another skill.
#[derive(Debug, Clone)]
pub struct Delegation {
    pub marker: String,
    pub target: SkillId,
    pub description: String,
}

impl Delegation {
    pub fn new(marker: impl Into<String>, target: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            target: SkillId::new(target),
            description: description.into(),
        }
    }

    /// Delegation with the conventional `AssignTo<Skill>Assistant` marker.
    pub fn for_skill(target: impl Into<String>, description: impl Into<String>) -> Self {
        let target = target.into();
        let marker = format!("AssignTo{}Assistant", pascal_case(&target));
        Self::new(marker, target, description)
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.marker.clone(),
            description: self.description.clone(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "request": {
                        "type": "string",
                        "description": "Any necessary followup questions the assistant should clarify before proceeding."
                    }
                },
                "required": ["request"]
            }),
        }
    }
}

/// Arguments of the escalation marker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EscalationArgs {
    #[serde(default = "default_cancel")]
    pub cancel: bool,
    #[serde(default)]
    pub reason: String,
}

fn default_cancel() -> bool {
    true
}

impl EscalationArgs {
    /// Lenient parse; malformed arguments still escalate.
    pub fn parse(args: &serde_json::Value) -> Self {
        serde_json::from_value(args.clone()).unwrap_or(Self {
            cancel: true,
            reason: String::new(),
        })
    }
}

pub fn escalation_definition() -> ToolDefinition {
    ToolDefinition {
        name: ESCALATION_MARKER.to_string(),
        description: ESCALATION_DESCRIPTION.to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "cancel": {"type": "boolean", "default": true},
                "reason": {"type": "string"}
            },
            "required": ["reason"]
        }),
    }
}

/// One skill of the dialog graph: a prompt, the tools it may call and the
/// skills it may hand off to.
#[derive(Debug, Clone)]
pub struct AgentNode {
    pub skill: SkillId,
    pub display_name: String,
    /// May contain `{context}` and `{time}` placeholders.
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub delegations: Vec<Delegation>,
    /// Trust overrides that apply only while this skill is active.
    pub trust_overrides: HashMap<String, ToolTrust>,
    pub can_escalate: bool,
}

impl AgentNode {
    /// The entry node. It has no caller to escalate to.
    pub fn primary(display_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            skill: SkillId::primary(),
            display_name: display_name.into(),
            system_prompt: prompt.into(),
            tools: vec![],
            delegations: vec![],
            trust_overrides: HashMap::new(),
            can_escalate: false,
        }
    }

    pub fn delegate(
        skill: impl Into<String>,
        display_name: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            skill: SkillId::new(skill),
            can_escalate: true,
            ..Self::primary(display_name, prompt)
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_delegation(mut self, delegation: Delegation) -> Self {
        self.delegations.push(delegation);
        self
    }

    pub fn with_trust(mut self, tool: impl Into<String>, trust: ToolTrust) -> Self {
        self.trust_overrides.insert(tool.into(), trust);
        self
    }

    pub fn delegation_for(&self, name: &str) -> Option<&Delegation> {
        self.delegations.iter().find(|d| d.marker == name)
    }

    pub fn is_escalation(&self, name: &str) -> bool {
        self.can_escalate && name == ESCALATION_MARKER
    }

    /// Whether the agent of this skill may call `name`.
    pub fn binds(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t == name)
            || self.delegation_for(name).is_some()
            || self.is_escalation(name)
    }

    /// Marker names this node recognizes.
    pub fn markers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.delegations.iter().map(|d| d.marker.as_str()).collect();
        if self.can_escalate {
            names.push(ESCALATION_MARKER);
        }
        names
    }

    /// Node override first, then the operator policy, then the tool's own declaration.
    pub fn effective_trust(&self, name: &str, declared: ToolTrust, policy: &TrustPolicy) -> ToolTrust {
        self.trust_overrides
            .get(name)
            .copied()
            .unwrap_or_else(|| policy.decide(declared, name))
    }

    pub fn render_prompt(&self, context: Option<&serde_json::Value>, now: DateTime<Utc>) -> String {
        let context = match context {
            None | Some(serde_json::Value::Null) => NO_CONTEXT.to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        self.system_prompt
            .replace("{context}", &context)
            .replace("{time}", &now.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    }

    /// Bound tool definitions followed by the marker pseudo-tools.
    pub fn tool_schema(&self, registry: &ToolRegistry) -> Result<Vec<ToolDefinition>> {
        let mut schema = registry.definitions_for(&self.tools)?;
        schema.extend(self.delegations.iter().map(Delegation::definition));
        if self.can_escalate {
            schema.push(escalation_definition());
        }
        Ok(schema)
    }

    /// Ask the model for this skill's next move. Reads the session, never
    /// writes to it; `extra` carries transient instructions for this call only.
    pub async fn invoke(
        &self,
        llm: &dyn LlmClient,
        model: &ModelConfig,
        registry: &ToolRegistry,
        state: &SessionState,
        extra: &[Message],
    ) -> Result<AgentResponse> {
        let mut messages = state.messages.clone();
        messages.extend_from_slice(extra);

        let request = ModelRequest {
            system_prompt: self.render_prompt(state.context.as_ref(), Utc::now()),
            messages,
            tools: self.tool_schema(registry)?,
        };
        llm.invoke(model, request).await
    }
}

fn pascal_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
