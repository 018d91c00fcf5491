use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::{CustomerDirectory, Tool};
use switchboard_core::types::{ToolContext, ToolResult};

use super::{parse_input, require_customer};

pub struct SearchUserInfoTool {
    directory: Arc<dyn CustomerDirectory>,
}

impl SearchUserInfoTool {
    pub fn new(directory: Arc<dyn CustomerDirectory>) -> Self {
        Self { directory }
    }
}

impl Tool for SearchUserInfoTool {
    fn name(&self) -> &str {
        "search_user_info"
    }
    fn description(&self) -> &str {
        "Retrieve the profile of the current customer: contact details and current products."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let customer_id = require_customer(&ctx)?;
            let profile = self.directory.fetch_profile(customer_id).await?;
            Ok(ToolResult::success(serde_json::to_string_pretty(&profile)?))
        })
    }
}

pub struct UpdateCustomerInfoTool {
    directory: Arc<dyn CustomerDirectory>,
}

impl UpdateCustomerInfoTool {
    pub fn new(directory: Arc<dyn CustomerDirectory>) -> Self {
        Self { directory }
    }
}

#[derive(Deserialize)]
struct UpdateInput {
    new_address: String,
}

impl Tool for UpdateCustomerInfoTool {
    fn name(&self) -> &str {
        "update_customer_info"
    }
    fn description(&self) -> &str {
        "Update the customer address on record. Validate the address first."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "new_address": { "type": "string", "description": "Full new address including postal code" }
            },
            "required": ["new_address"]
        })
    }
    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: UpdateInput = parse_input(input)?;
            let customer_id = require_customer(&ctx)?;
            let outcome = self
                .directory
                .update_address(customer_id, &p.new_address)
                .await?;
            tracing::info!(customer_id, "Customer address updated");
            Ok(ToolResult::success(outcome))
        })
    }
}

pub struct SendMfaCodeTool {
    directory: Arc<dyn CustomerDirectory>,
}

impl SendMfaCodeTool {
    pub fn new(directory: Arc<dyn CustomerDirectory>) -> Self {
        Self { directory }
    }
}

impl Tool for SendMfaCodeTool {
    fn name(&self) -> &str {
        "send_mfa_code"
    }
    fn description(&self) -> &str {
        "Send a multi-factor authentication code to the customer's phone on record."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let customer_id = require_customer(&ctx)?;
            let profile = self.directory.fetch_profile(customer_id).await?;
            let number = profile
                .get("customer_phone")
                .and_then(|v| v.as_str())
                .ok_or_else(|| SwitchboardError::ToolExecution {
                    tool: "send_mfa_code".into(),
                    message: "customer has no phone number on record".into(),
                })?;
            Ok(ToolResult::success(format!("Code sent to number {}", number)))
        })
    }
}

static POSTAL_CODE: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?i)\b[ABCEGHJ-NPRSTVXY]\d[A-Z][ -]?\d[A-Z]\d\b"));

/// Checks that an address is non-empty and carries a Canadian postal code.
pub struct ValidateAddressTool;

#[derive(Deserialize)]
struct AddressInput {
    address: String,
}

impl Tool for ValidateAddressTool {
    fn name(&self) -> &str {
        "validate_address"
    }
    fn description(&self) -> &str {
        "Validate a customer-provided address before saving it."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "address": { "type": "string", "description": "The customer provided address" }
            },
            "required": ["address"]
        })
    }
    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: AddressInput = parse_input(input)?;
            let address = p.address.trim();
            if address.is_empty() {
                return Err(SwitchboardError::ToolValidation("address is empty".into()));
            }
            let postal_code = POSTAL_CODE.as_ref().map_err(|e| SwitchboardError::ToolExecution {
                tool: "validate_address".into(),
                message: e.to_string(),
            })?;
            if !postal_code.is_match(address) {
                return Err(SwitchboardError::ToolValidation(format!(
                    "'{}' has no valid postal code (expected A1A 1A1)",
                    address
                )));
            }
            Ok(ToolResult::success("Validated"))
        })
    }
}

pub struct SendConfirmationEmailTool;

#[derive(Deserialize)]
struct EmailInput {
    email: String,
}

impl Tool for SendConfirmationEmailTool {
    fn name(&self) -> &str {
        "send_confirmation_email"
    }
    fn description(&self) -> &str {
        "Send a confirmation notification to the given email address."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email": { "type": "string", "description": "Address to notify" }
            },
            "required": ["email"]
        })
    }
    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: EmailInput = parse_input(input)?;
            Ok(ToolResult::success(format!("Confirmation email sent to {}", p.email)))
        })
    }
}
