//! Synthetic tool messages that answer marker calls and announce a change
//! of active skill.

use switchboard_core::types::{Message, ToolCallRequest};

/// Transient nudge after an empty model output.
pub const EMPTY_RESPONSE_INSTRUCTION: &str = "Respond with a real output.";

pub const RESUME_TEXT: &str = "Resuming dialog with the host assistant. Please reflect on the past \
conversation and assist the user as needed.";

/// Answer to a delegation marker. Tells the delegate who it now is.
pub fn entry_message(call_id: &str, display_name: &str) -> Message {
    let text = format!(
        "The assistant is now the {name}. Reflect on the above conversation between the host \
assistant and the user. The user's intent is unsatisfied. Use the provided tools to assist the \
user. Remember, you are {name}, and the booking, update, or other action is not complete until \
after you have successfully invoked the appropriate tool. If the user changes their mind or needs \
help for other tasks, call the CompleteOrEscalate function to let the primary host assistant take \
control. Do not mention who you are - just act as the proxy for the assistant.",
        name = display_name
    );
    Message::tool_result(call_id, text, false)
}

/// Answer to the escalation marker.
pub fn resume_message(call_id: &str) -> Message {
    Message::tool_result(call_id, RESUME_TEXT, false)
}

/// Answer to a call that shared its batch with a marker and was skipped.
pub fn not_executed_message(call: &ToolCallRequest, destination: &str) -> Message {
    Message::tool_result(
        &call.id,
        format!(
            "Not executed: '{}' was skipped because control moved to the {}. \
Call it again if it is still needed.",
            call.name, destination
        ),
        true,
    )
}
