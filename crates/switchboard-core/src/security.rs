use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reason recorded when a denial carries no text.
pub const DEFAULT_DENIAL_REASON: &str = "no reason given";

/// Trust class of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolTrust {
    /// Executes without asking.
    #[default]
    Safe,
    /// Requires explicit human approval before it runs.
    Sensitive,
}

impl fmt::Display for ToolTrust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Sensitive => write!(f, "sensitive"),
        }
    }
}

impl std::str::FromStr for ToolTrust {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "sensitive" => Ok(Self::Sensitive),
            other => Err(format!("unknown tool trust: {}", other)),
        }
    }
}

/// Operator-level trust overrides, keyed by tool name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustPolicy {
    #[serde(default)]
    pub tool_overrides: HashMap<String, ToolTrust>,
}

impl TrustPolicy {
    /// Effective trust for a tool given the trust it declares.
    pub fn decide(&self, declared: ToolTrust, tool_name: &str) -> ToolTrust {
        self.tool_overrides
            .get(tool_name)
            .copied()
            .unwrap_or(declared)
    }
}

/// Human decision on a suspended batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: Option<String> },
}

impl ApprovalDecision {
    pub fn from_parts(approved: bool, reason: Option<String>) -> Self {
        if approved {
            Self::Approved
        } else {
            Self::Denied { reason }
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Tool-result text fed back to the agent for a denied call.
    pub fn denial_message(reason: Option<&str>) -> String {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_DENIAL_REASON);
        format!(
            "API call denied by user. Reasoning: '{}'. Continue assisting, accounting for the user's input.",
            reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_ordering_and_parse() {
        assert!(ToolTrust::Safe < ToolTrust::Sensitive);
        assert_eq!("Sensitive".parse::<ToolTrust>().unwrap(), ToolTrust::Sensitive);
        assert!("t2".parse::<ToolTrust>().is_err());
        assert_eq!(ToolTrust::Safe.to_string(), "safe");
    }

    #[test]
    fn policy_override_wins() {
        let mut policy = TrustPolicy::default();
        assert_eq!(policy.decide(ToolTrust::Sensitive, "create_ticket"), ToolTrust::Sensitive);
        policy
            .tool_overrides
            .insert("update_customer_info".into(), ToolTrust::Sensitive);
        assert_eq!(
            policy.decide(ToolTrust::Safe, "update_customer_info"),
            ToolTrust::Sensitive
        );
    }

    #[test]
    fn denial_message_carries_reason() {
        assert_eq!(
            ApprovalDecision::denial_message(Some("wrong ticket")),
            "API call denied by user. Reasoning: 'wrong ticket'. Continue assisting, accounting for the user's input."
        );
        assert!(ApprovalDecision::denial_message(Some("  ")).contains(DEFAULT_DENIAL_REASON));
        assert!(ApprovalDecision::denial_message(None).contains(DEFAULT_DENIAL_REASON));
    }

    #[test]
    fn trust_serde() {
        let json = serde_json::to_string(&ToolTrust::Sensitive).unwrap();
        assert_eq!(json, "\"sensitive\"");
    }
}
