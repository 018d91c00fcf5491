use std::collections::{HashMap, HashSet};

use tracing::debug;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::state::SkillId;
use switchboard_tools::ToolRegistry;

use super::node::{AgentNode, ESCALATION_MARKER};

/// Collects nodes before validation.
pub struct GraphBuilder {
    primary: AgentNode,
    delegates: Vec<AgentNode>,
    context_tool: Option<String>,
}

impl GraphBuilder {
    pub fn new(primary: AgentNode) -> Self {
        Self {
            primary,
            delegates: vec![],
            context_tool: None,
        }
    }

    pub fn delegate(mut self, node: AgentNode) -> Self {
        self.delegates.push(node);
        self
    }

    /// Tool run once per session to populate the customer context.
    pub fn context_tool(mut self, name: Option<String>) -> Self {
        self.context_tool = name;
        self
    }

    /// Validate against the registry and freeze.
    pub fn build(self, registry: &ToolRegistry) -> Result<GraphDefinition> {
        let invalid = |msg: String| Err(SwitchboardError::GraphBuild(msg));

        if !self.primary.skill.is_primary() {
            return invalid(format!(
                "entry node must use the '{}' skill, got '{}'",
                SkillId::PRIMARY,
                self.primary.skill
            ));
        }

        let mut nodes: HashMap<SkillId, AgentNode> = HashMap::new();
        for node in std::iter::once(self.primary).chain(self.delegates) {
            if !node.skill.is_primary() && !node.can_escalate {
                return invalid(format!("delegate '{}' has no way back to its caller", node.skill));
            }
            if nodes.contains_key(&node.skill) {
                return invalid(format!("duplicate skill '{}'", node.skill));
            }
            nodes.insert(node.skill.clone(), node);
        }

        let mut markers: HashSet<&str> = HashSet::new();
        for node in nodes.values() {
            for tool in &node.tools {
                if !registry.contains(tool) {
                    return invalid(format!("skill '{}' binds unregistered tool '{}'", node.skill, tool));
                }
            }
            for delegation in &node.delegations {
                let target = nodes.get(&delegation.target);
                match target {
                    None => {
                        return invalid(format!(
                            "skill '{}' delegates to unknown skill '{}'",
                            node.skill, delegation.target
                        ))
                    }
                    Some(t) if t.skill.is_primary() => {
                        return invalid(format!("skill '{}' delegates to the entry node", node.skill))
                    }
                    Some(_) => {}
                }
                if registry.contains(&delegation.marker) || delegation.marker == ESCALATION_MARKER {
                    return invalid(format!("marker '{}' clashes with a tool name", delegation.marker));
                }
                markers.insert(delegation.marker.as_str());
            }
        }

        if registry.contains(ESCALATION_MARKER) {
            return invalid(format!("marker '{}' clashes with a tool name", ESCALATION_MARKER));
        }

        if let Some(ref tool) = self.context_tool {
            if !registry.contains(tool) {
                return invalid(format!("context tool '{}' is not registered", tool));
            }
        }

        debug!(skills = nodes.len(), markers = markers.len(), "Dialog graph built");
        Ok(GraphDefinition {
            nodes,
            context_tool: self.context_tool,
        })
    }
}

/// Immutable, validated set of skills. Shared read-only by every step.
#[derive(Debug)]
pub struct GraphDefinition {
    nodes: HashMap<SkillId, AgentNode>,
    context_tool: Option<String>,
}

impl GraphDefinition {
    pub fn node(&self, skill: &SkillId) -> Result<&AgentNode> {
        self.nodes
            .get(skill)
            .ok_or_else(|| SwitchboardError::UnknownSkill(skill.to_string()))
    }

    pub fn primary(&self) -> Result<&AgentNode> {
        self.node(&SkillId::primary())
    }

    /// Skill ids, sorted.
    pub fn skills(&self) -> Vec<&SkillId> {
        let mut skills: Vec<&SkillId> = self.nodes.keys().collect();
        skills.sort();
        skills
    }

    pub fn context_tool(&self) -> Option<&str> {
        self.context_tool.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::Delegation;
    use futures::future::BoxFuture;
    use switchboard_core::traits::Tool;
    use switchboard_core::types::{ToolContext, ToolResult};

    struct Noop(&'static str);

    impl Tool for Noop {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "noop"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async { Ok(ToolResult::success("")) })
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Noop("lookup"));
        r
    }

    fn primary() -> AgentNode {
        AgentNode::primary("Host", "")
            .with_tools(["lookup"])
            .with_delegation(Delegation::for_skill("servicing", "Transfer to servicing."))
    }

    fn servicing() -> AgentNode {
        AgentNode::delegate("servicing", "Servicing Assistant", "").with_tools(["lookup"])
    }

    fn build_err(builder: GraphBuilder) -> String {
        match builder.build(&registry()) {
            Err(SwitchboardError::GraphBuild(msg)) => msg,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected build failure"),
        }
    }

    #[test]
    fn valid_graph_builds() {
        let graph = GraphBuilder::new(primary())
            .delegate(servicing())
            .context_tool(Some("lookup".into()))
            .build(&registry())
            .unwrap();

        assert_eq!(graph.skills().len(), 2);
        assert_eq!(graph.context_tool(), Some("lookup"));
        assert!(graph.primary().is_ok());
        assert!(matches!(
            graph.node(&SkillId::new("missing")),
            Err(SwitchboardError::UnknownSkill(_))
        ));
    }

    #[test]
    fn rejects_unknown_target() {
        let msg = build_err(GraphBuilder::new(primary()));
        assert!(msg.contains("unknown skill 'servicing'"));
    }

    #[test]
    fn rejects_unregistered_tool() {
        let node = servicing().with_tools(["teleport"]);
        let msg = build_err(GraphBuilder::new(primary()).delegate(node));
        assert!(msg.contains("teleport"));
    }

    #[test]
    fn rejects_duplicates_and_clashes() {
        let msg = build_err(GraphBuilder::new(primary()).delegate(servicing()).delegate(servicing()));
        assert!(msg.contains("duplicate"));

        let clash = AgentNode::primary("Host", "")
            .with_delegation(Delegation::new("lookup", "servicing", "clash"));
        let msg = build_err(GraphBuilder::new(clash).delegate(servicing()));
        assert!(msg.contains("clashes"));
    }

    #[test]
    fn rejects_non_primary_entry_and_missing_context_tool() {
        let msg = build_err(GraphBuilder::new(servicing()));
        assert!(msg.contains("entry node"));

        let msg = build_err(
            GraphBuilder::new(primary())
                .delegate(servicing())
                .context_tool(Some("search_user_info".into())),
        );
        assert!(msg.contains("context tool"));
    }
}
