//! The stock customer-service graph: a host assistant that answers general
//! questions and hands account servicing, mortgage renewals and the
//! insurance questionnaire to specialized skills.
//!
//! Prompts can be replaced per skill with `[skills.<id>] prompt = ...`.

use switchboard_core::config::AppConfig;
use switchboard_core::error::Result;
use switchboard_core::security::ToolTrust;
use switchboard_core::state::SkillId;

use crate::graph::{AgentNode, Delegation, GraphBuilder};

pub const SERVICING: &str = "servicing";
pub const RENEWAL: &str = "renewal";
pub const QUESTIONNAIRE: &str = "questionnaire";

const CUSTOMER_BLOCK: &str = "\n\nCurrent customer:\n<Customer>\n{context}\n</Customer>\nCurrent time: {time}.";

const PRIMARY_PROMPT: &str = "You are a helpful customer support assistant for a mortgage lender. \
Answer general questions yourself. When the customer wants to update account details or make a \
lump-sum payment, wants to renew their mortgage, or needs to complete the business insurance \
questionnaire, delegate the task to the matching specialized assistant by calling its tool. The \
customer does not know the specialized assistants exist, so never mention them; just delegate \
quietly through the function call.";

const SERVICING_PROMPT: &str = "You are a specialized assistant for account servicing: address \
changes and lump-sum payments. The host assistant delegates work to you whenever the customer \
needs one of these. Verify the customer's identity before changing anything. Confirm updated \
details with the customer and send a confirmation email once a change succeeds. If the customer \
needs help with something outside your tools, call CompleteOrEscalate so the host assistant can \
take over. Never make up tool results.";

const RENEWAL_PROMPT: &str = "You are a specialized assistant for mortgage renewals. Start by \
fetching the posted rates. Offer the discounted rate first; only offer the retention rate when the \
customer brings a competing offer. When the customer accepts, send the documents to sign. Transfer \
to a human agent if the customer asks for one. If the customer needs help with something else, call \
CompleteOrEscalate so the host assistant can take over.";

const QUESTIONNAIRE_PROMPT: &str = "You are a specialized assistant that walks business customers \
through the insurance questionnaire. Retrieve the questions first and ask them one at a time, \
grouped by category. Create a ticket summarizing the answers once every question is covered, and \
send the documents to sign. If the customer wants to stop or needs something else, call \
CompleteOrEscalate.";

fn prompt_for(config: &AppConfig, skill: &str, default: &str) -> Result<String> {
    let body = config
        .skill_prompt(skill)?
        .unwrap_or_else(|| default.to_string());
    if body.contains("{context}") {
        Ok(body)
    } else {
        Ok(format!("{}{}", body, CUSTOMER_BLOCK))
    }
}

/// Assemble the stock graph. Call `build(&registry)` on the result.
pub fn customer_service(config: &AppConfig) -> Result<GraphBuilder> {
    let primary = AgentNode::primary(
        "Host Assistant",
        prompt_for(config, SkillId::PRIMARY, PRIMARY_PROMPT)?,
    )
    .with_tools(["search_user_info"])
    .with_delegation(Delegation::for_skill(
        SERVICING,
        "Transfers work to a specialized assistant to handle address updates and lump-sum payments.",
    ))
    .with_delegation(Delegation::for_skill(
        RENEWAL,
        "Transfers work to a specialized assistant to handle mortgage renewals and rate offers.",
    ))
    .with_delegation(Delegation::for_skill(
        QUESTIONNAIRE,
        "Transfers work to a specialized assistant to run the business insurance questionnaire.",
    ));

    let servicing = AgentNode::delegate(
        SERVICING,
        "Servicing Assistant",
        prompt_for(config, SERVICING, SERVICING_PROMPT)?,
    )
    .with_tools([
        "search_user_info",
        "send_mfa_code",
        "validate_address",
        "update_customer_info",
        "send_confirmation_email",
        "lump_sum_is_client_eligible",
        "lump_sum_payment_methods",
        "create_ticket",
    ]);

    // Renewal tickets only hand the file to a human; no approval needed.
    let renewal = AgentNode::delegate(
        RENEWAL,
        "Renewals Assistant",
        prompt_for(config, RENEWAL, RENEWAL_PROMPT)?,
    )
    .with_tools([
        "search_user_info",
        "fetch_posted_rates",
        "discounted_rate",
        "retention_rate",
        "send_documents_to_sign",
        "transfer_human_agent",
        "create_ticket",
    ])
    .with_trust("create_ticket", ToolTrust::Safe);

    let questionnaire = AgentNode::delegate(
        QUESTIONNAIRE,
        "Questionnaire Assistant",
        prompt_for(config, QUESTIONNAIRE, QUESTIONNAIRE_PROMPT)?,
    )
    .with_tools([
        "get_questionnaire",
        "send_documents_to_sign",
        "transfer_human_agent",
        "create_ticket",
    ]);

    Ok(GraphBuilder::new(primary)
        .delegate(servicing)
        .delegate(renewal)
        .delegate(questionnaire)
        .context_tool(config.agent.context_tool.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use switchboard_core::security::TrustPolicy;
    use switchboard_tools::{InMemoryCustomerDirectory, ToolRegistry};

    fn config() -> AppConfig {
        AppConfig::parse(
            r#"
[model]
model_id = "gpt-4o"

[skills.renewal]
prompt = "Renew things. Customer: {context}"
"#,
        )
        .unwrap()
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::with_builtins(Arc::new(InMemoryCustomerDirectory::with_sample()))
    }

    #[test]
    fn stock_graph_builds_against_builtins() {
        let graph = customer_service(&config()).unwrap().build(&registry()).unwrap();
        let skills: Vec<String> = graph.skills().iter().map(|s| s.to_string()).collect();
        assert_eq!(skills, ["primary", "questionnaire", "renewal", "servicing"]);
        assert_eq!(graph.context_tool(), Some("search_user_info"));
    }

    #[test]
    fn prompt_override_is_used_verbatim() {
        let graph = customer_service(&config()).unwrap().build(&registry()).unwrap();
        let renewal = graph.node(&SkillId::new(RENEWAL)).unwrap();
        assert_eq!(renewal.system_prompt, "Renew things. Customer: {context}");

        let servicing = graph.node(&SkillId::new(SERVICING)).unwrap();
        assert!(servicing.system_prompt.ends_with(CUSTOMER_BLOCK));
    }

    #[test]
    fn create_ticket_needs_approval_only_outside_renewal() {
        let graph = customer_service(&config()).unwrap().build(&registry()).unwrap();
        let policy = TrustPolicy::default();
        let declared = ToolTrust::Sensitive;

        let servicing = graph.node(&SkillId::new(SERVICING)).unwrap();
        let renewal = graph.node(&SkillId::new(RENEWAL)).unwrap();
        assert_eq!(servicing.effective_trust("create_ticket", declared, &policy), ToolTrust::Sensitive);
        assert_eq!(renewal.effective_trust("create_ticket", declared, &policy), ToolTrust::Safe);
    }
}
