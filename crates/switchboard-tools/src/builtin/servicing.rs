use futures::future::BoxFuture;
use serde::Deserialize;

use switchboard_core::error::Result;
use switchboard_core::security::ToolTrust;
use switchboard_core::traits::Tool;
use switchboard_core::types::{ToolContext, ToolResult};

use super::parse_input;

const PAYMENT_METHODS: &str = "Methods of Payment
Online Bill Payment:
- Pay the mortgage as a bill from your own online banking portal.
- Must come from a borrower's bank account, not a third-party account.
- Add the bank's mortgage division as a payee; the account number is the 6-digit mortgage loan number.
- Amount limits vary by financial institution; multiple transactions are allowed.
Bank Draft / Personal Cheque:
- Accepted when drawn on one of the borrowers' bank accounts.
- Drop off or courier to the Toronto office, payable to the lending bank.";

pub struct LumpSumEligibilityTool;

#[derive(Deserialize)]
struct EligibilityInput {
    customer_id: serde_json::Value,
}

impl Tool for LumpSumEligibilityTool {
    fn name(&self) -> &str {
        "lump_sum_is_client_eligible"
    }
    fn description(&self) -> &str {
        "Check whether the client is eligible to make a lump sum payment."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "customer_id": { "type": "integer", "description": "Customer id" }
            },
            "required": ["customer_id"]
        })
    }
    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: EligibilityInput = parse_input(input)?;
            // Models sometimes send the id as a string.
            let eligible = match &p.customer_id {
                serde_json::Value::Number(n) => n.as_i64() == Some(0),
                serde_json::Value::String(s) => s.trim() == "0",
                _ => false,
            };
            Ok(ToolResult::success(if eligible { "True" } else { "False" }))
        })
    }
}

pub struct LumpSumPaymentMethodsTool;

impl Tool for LumpSumPaymentMethodsTool {
    fn name(&self) -> &str {
        "lump_sum_payment_methods"
    }
    fn description(&self) -> &str {
        "Retrieve the payment methods available for a lump sum payment."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move { Ok(ToolResult::success(PAYMENT_METHODS)) })
    }
}

/// Opens a CRM ticket. Sensitive by default; skills may relax it.
pub struct CreateTicketTool;

#[derive(Deserialize)]
struct TicketInput {
    title: String,
    #[serde(default, alias = "subject")]
    description: String,
}

impl Tool for CreateTicketTool {
    fn name(&self) -> &str {
        "create_ticket"
    }
    fn trust(&self) -> ToolTrust {
        ToolTrust::Sensitive
    }
    fn description(&self) -> &str {
        "Create a ticket in the CRM for the current issue."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Name of the issue, e.g. LumpSum or TitleChange" },
                "description": { "type": "string", "description": "Short description of the issue" }
            },
            "required": ["title", "description"]
        })
    }
    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TicketInput = parse_input(input)?;
            tracing::info!(session_id = %ctx.session_id, title = %p.title, "CRM ticket created");
            Ok(ToolResult::success(format!(
                "Ticket {} successfully created in the CRM with description {}",
                p.title, p.description
            )))
        })
    }
}
