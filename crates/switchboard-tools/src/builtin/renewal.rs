use futures::future::BoxFuture;
use serde::Deserialize;

use switchboard_core::error::Result;
use switchboard_core::traits::Tool;
use switchboard_core::types::{ToolContext, ToolResult};

use super::parse_input;

const POSTED_RATE: f64 = 6.0;
/// Percentage adjustment of the posted rate per term, in years.
const TERM_FACTORS: [(u32, f64); 5] = [(1, 1.35), (2, 0.7), (3, 0.05), (4, -0.5), (5, -1.05)];
const MINIMUM_RETENTION_RATE: f64 = 4.8;
const DISCOUNT: f64 = 0.05;

pub(crate) fn posted_rates() -> String {
    TERM_FACTORS
        .iter()
        .map(|(term, factor)| {
            let rate = POSTED_RATE + POSTED_RATE * factor / 100.0;
            format!("{}yr at {:.2}%", term, rate)
        })
        .collect::<Vec<_>>()
        .join(" \n")
}

pub struct FetchPostedRatesTool;

impl Tool for FetchPostedRatesTool {
    fn name(&self) -> &str {
        "fetch_posted_rates"
    }
    fn description(&self) -> &str {
        "Get the current posted rates per term. Use them as the base for negotiation, \
         start from the higher bound and never offer below it."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move { Ok(ToolResult::success(posted_rates())) })
    }
}

pub struct DiscountedRateTool;

#[derive(Deserialize)]
struct DiscountInput {
    current_rate: f64,
}

impl Tool for DiscountedRateTool {
    fn name(&self) -> &str {
        "discounted_rate"
    }
    fn description(&self) -> &str {
        "Get a discounted rate to offer when the customer does not agree with the current rate."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "current_rate": { "type": "number", "description": "Rate currently offered, in percent" }
            },
            "required": ["current_rate"]
        })
    }
    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: DiscountInput = parse_input(input)?;
            let rate = p.current_rate - p.current_rate * DISCOUNT;
            Ok(ToolResult::success(format!("{:.2}", rate)))
        })
    }
}

pub struct RetentionRateTool;

#[derive(Deserialize)]
struct RetentionInput {
    counter_rate: f64,
}

impl Tool for RetentionRateTool {
    fn name(&self) -> &str {
        "retention_rate"
    }
    fn description(&self) -> &str {
        "Get the minimum rate that can be matched when the customer has a better offer from another bank."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "counter_rate": { "type": "number", "description": "Rate offered by the other institution" }
            },
            "required": ["counter_rate"]
        })
    }
    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: RetentionInput = parse_input(input)?;
            Ok(ToolResult::success(format!(
                "{:.2}",
                p.counter_rate.max(MINIMUM_RETENTION_RATE)
            )))
        })
    }
}

pub struct SendDocumentsToSignTool;

#[derive(Deserialize)]
struct DocumentsInput {
    email: String,
}

impl Tool for SendDocumentsToSignTool {
    fn name(&self) -> &str {
        "send_documents_to_sign"
    }
    fn description(&self) -> &str {
        "Send the renewal documents for signature once the customer agrees to a term."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email": { "type": "string", "description": "Customer email" }
            },
            "required": ["email"]
        })
    }
    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: DocumentsInput = parse_input(input)?;
            Ok(ToolResult::success(format!("Documents sent to {}", p.email)))
        })
    }
}

pub struct TransferHumanAgentTool;

impl Tool for TransferHumanAgentTool {
    fn name(&self) -> &str {
        "transfer_human_agent"
    }
    fn description(&self) -> &str {
        "Transfer the conversation to a human agent."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            tracing::info!(session_id = %ctx.session_id, "Transfer to human agent requested");
            Ok(ToolResult::success("Transferred to human agent"))
        })
    }
}
