pub mod customer;
pub mod questionnaire;
pub mod renewal;
pub mod servicing;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::types::ToolContext;

/// Customer id of the session, required by directory-backed tools.
pub(crate) fn require_customer(ctx: &ToolContext) -> Result<&str> {
    ctx.customer_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SwitchboardError::ToolValidation("No customer ID configured.".into()))
}

pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(input: serde_json::Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| SwitchboardError::ToolValidation(e.to_string()))
}
