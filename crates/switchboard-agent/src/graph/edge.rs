use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::security::{ToolTrust, TrustPolicy};
use switchboard_core::state::SkillId;
use switchboard_core::types::{AgentResponse, ToolCallRequest};
use switchboard_tools::ToolRegistry;

use super::node::AgentNode;

/// Where control goes after an agent node produced a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Plain answer; the step ends.
    End,
    /// Hand off to another skill via its marker call.
    Delegate { target: SkillId, call: ToolCallRequest },
    /// Return control to the caller via the escalation marker.
    LeaveSkill { call: ToolCallRequest },
    /// Run the batch now and re-invoke the same node.
    SafeTools,
    /// Suspend the whole batch until a human decides.
    SensitiveTools,
}

/// Classify a response produced by `node`.
///
/// Unbound names abort before anything runs. A delegation marker wins over
/// every other call in the batch, then escalation, then trust: one sensitive
/// call makes the whole batch sensitive.
pub fn route(
    node: &AgentNode,
    response: &AgentResponse,
    registry: &ToolRegistry,
    policy: &TrustPolicy,
) -> Result<Route> {
    let calls = &response.tool_calls;
    if calls.is_empty() {
        return Ok(Route::End);
    }

    if let Some(call) = calls.iter().find(|c| !node.binds(&c.name)) {
        return Err(SwitchboardError::InvalidRoute {
            skill: node.skill.to_string(),
            tool: call.name.clone(),
        });
    }

    for call in calls {
        if let Some(delegation) = node.delegation_for(&call.name) {
            return Ok(Route::Delegate {
                target: delegation.target.clone(),
                call: call.clone(),
            });
        }
    }

    if let Some(call) = calls.iter().find(|c| node.is_escalation(&c.name)) {
        return Ok(Route::LeaveSkill { call: call.clone() });
    }

    for call in calls {
        let declared = registry
            .trust_of(&call.name)
            .ok_or_else(|| SwitchboardError::ToolNotFound(call.name.clone()))?;
        if node.effective_trust(&call.name, declared, policy) == ToolTrust::Sensitive {
            return Ok(Route::SensitiveTools);
        }
    }
    Ok(Route::SafeTools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use switchboard_core::traits::Tool;
    use switchboard_core::types::{ToolContext, ToolResult};

    use crate::graph::node::{Delegation, ESCALATION_MARKER};

    struct Fixture {
        name: &'static str,
        trust: ToolTrust,
    }

    impl Tool for Fixture {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "fixture"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn trust(&self) -> ToolTrust {
            self.trust
        }
        fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async { Ok(ToolResult::success("ok")) })
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Fixture { name: "lookup", trust: ToolTrust::Safe });
        r.register(Fixture { name: "create_ticket", trust: ToolTrust::Sensitive });
        r
    }

    fn node() -> AgentNode {
        AgentNode::delegate("servicing", "Servicing Assistant", "")
            .with_tools(["lookup", "create_ticket"])
            .with_delegation(Delegation::for_skill("questionnaire", "Run the questionnaire."))
    }

    fn call(name: &str) -> ToolCallRequest {
        ToolCallRequest::new(name, serde_json::json!({}))
    }

    fn route_calls(node: &AgentNode, names: &[&str]) -> Result<Route> {
        let response = AgentResponse::calls(names.iter().map(|n| call(n)).collect());
        route(node, &response, &registry(), &TrustPolicy::default())
    }

    #[test]
    fn text_ends_the_step() {
        let r = route(&node(), &AgentResponse::text("hello"), &registry(), &TrustPolicy::default());
        assert_eq!(r.unwrap(), Route::End);
    }

    #[test]
    fn safe_batch() {
        assert_eq!(route_calls(&node(), &["lookup", "lookup"]).unwrap(), Route::SafeTools);
    }

    #[test]
    fn one_sensitive_call_taints_the_batch() {
        assert_eq!(route_calls(&node(), &["lookup", "create_ticket"]).unwrap(), Route::SensitiveTools);
    }

    #[test]
    fn delegation_has_priority() {
        let r = route_calls(&node(), &["create_ticket", "AssignToQuestionnaireAssistant"]).unwrap();
        match r {
            Route::Delegate { target, call } => {
                assert_eq!(target.as_str(), "questionnaire");
                assert_eq!(call.name, "AssignToQuestionnaireAssistant");
            }
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[test]
    fn escalation_beats_tools() {
        let r = route_calls(&node(), &["lookup", ESCALATION_MARKER]).unwrap();
        assert!(matches!(r, Route::LeaveSkill { .. }));
    }

    #[test]
    fn unbound_tool_is_invalid() {
        let err = route_calls(&node(), &["lookup", "transfer_funds"]).unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidRoute { tool, .. } if tool == "transfer_funds"));
    }

    #[test]
    fn primary_cannot_escalate() {
        let primary = AgentNode::primary("Host", "").with_tools(["lookup"]);
        let err = route_calls(&primary, &[ESCALATION_MARKER]).unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidRoute { .. }));
    }

    #[test]
    fn node_and_policy_overrides_apply() {
        let relaxed = node().with_trust("create_ticket", ToolTrust::Safe);
        assert_eq!(route_calls(&relaxed, &["create_ticket"]).unwrap(), Route::SafeTools);

        let mut policy = TrustPolicy::default();
        policy.tool_overrides.insert("lookup".into(), ToolTrust::Sensitive);
        let response = AgentResponse::calls(vec![call("lookup")]);
        assert_eq!(route(&node(), &response, &registry(), &policy).unwrap(), Route::SensitiveTools);
    }
}
