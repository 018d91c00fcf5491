use std::collections::HashMap;
use std::sync::Arc;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::security::ToolTrust;
use switchboard_core::traits::{CustomerDirectory, Tool};
use switchboard_core::types::{ToolContext, ToolDefinition, ToolResult};

/// Registry of available tools. Read-only once the graph is built.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for the named tools, in the given order.
    pub fn definitions_for(&self, names: &[String]) -> Result<Vec<ToolDefinition>> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .map(|t| t.definition())
                    .ok_or_else(|| SwitchboardError::ToolNotFound(name.clone()))
            })
            .collect()
    }

    /// Declared trust of a tool.
    pub fn trust_of(&self, name: &str) -> Option<ToolTrust> {
        self.tools.get(name).map(|t| t.trust())
    }

    /// Execute a tool by name, bounded by its timeout.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| SwitchboardError::ToolNotFound(name.to_string()))?;

        let timeout = std::time::Duration::from_secs(tool.timeout_secs());

        match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(SwitchboardError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }

    /// Create a registry with all built-in tools registered.
    pub fn with_builtins(directory: Arc<dyn CustomerDirectory>) -> Self {
        use crate::builtin::{customer, questionnaire, renewal, servicing};

        let mut registry = Self::new();

        // ── Customer directory (5) ──────────────────────────────
        registry.register(customer::SearchUserInfoTool::new(directory.clone()));
        registry.register(customer::UpdateCustomerInfoTool::new(directory.clone()));
        registry.register(customer::SendMfaCodeTool::new(directory));
        registry.register(customer::ValidateAddressTool);
        registry.register(customer::SendConfirmationEmailTool);

        // ── Servicing (3) ───────────────────────────────────────
        registry.register(servicing::LumpSumEligibilityTool);
        registry.register(servicing::LumpSumPaymentMethodsTool);
        registry.register(servicing::CreateTicketTool);

        // ── Renewal (5) ─────────────────────────────────────────
        registry.register(renewal::FetchPostedRatesTool);
        registry.register(renewal::DiscountedRateTool);
        registry.register(renewal::RetentionRateTool);
        registry.register(renewal::SendDocumentsToSignTool);
        registry.register(renewal::TransferHumanAgentTool);

        // ── Questionnaire (1) ───────────────────────────────────
        registry.register(questionnaire::GetQuestionnaireTool);

        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
