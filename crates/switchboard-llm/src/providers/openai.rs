use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use switchboard_core::config::ModelConfig;
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::{LlmClient, ModelRequest};
use switchboard_core::types::*;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
pub(crate) struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Serialize, Debug)]
pub(crate) struct OaiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OaiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct OaiToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    r#type: Option<String>,
    function: OaiFunction,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct OaiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize, Debug)]
pub(crate) struct OaiTool {
    r#type: String,
    function: OaiToolDef,
}

#[derive(Serialize, Debug)]
pub(crate) struct OaiToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Response types
#[derive(Deserialize, Debug)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OaiToolCall>,
}

pub(crate) fn convert_tools(tools: &[ToolDefinition]) -> Vec<OaiTool> {
    tools
        .iter()
        .map(|t| OaiTool {
            r#type: "function".to_string(),
            function: OaiToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

/// Convert a history to chat-completions messages, system prompt first.
pub(crate) fn convert_messages(system_prompt: &str, messages: &[Message]) -> Vec<OaiMessage> {
    let mut oai_msgs = Vec::with_capacity(messages.len() + 1);
    if !system_prompt.is_empty() {
        oai_msgs.push(OaiMessage {
            role: "system".to_string(),
            content: Some(system_prompt.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for msg in messages {
        match msg.role {
            Role::Human => oai_msgs.push(OaiMessage {
                role: "user".to_string(),
                content: Some(msg.text().to_string()),
                tool_calls: None,
                tool_call_id: None,
            }),
            Role::Agent => {
                let calls: Vec<OaiToolCall> = msg
                    .tool_calls
                    .iter()
                    .map(|c| OaiToolCall {
                        id: Some(c.id.clone()),
                        r#type: Some("function".to_string()),
                        function: OaiFunction {
                            name: c.name.clone(),
                            arguments: c.args.to_string(),
                        },
                    })
                    .collect();
                let content = msg.content.clone().filter(|t| !t.is_empty());
                oai_msgs.push(OaiMessage {
                    role: "assistant".to_string(),
                    // Plain assistant turns need a content field even when empty.
                    content: if calls.is_empty() {
                        Some(content.unwrap_or_default())
                    } else {
                        content
                    },
                    tool_calls: if calls.is_empty() { None } else { Some(calls) },
                    tool_call_id: None,
                });
            }
            Role::Tool => oai_msgs.push(OaiMessage {
                role: "tool".to_string(),
                content: Some(msg.text().to_string()),
                tool_calls: None,
                tool_call_id: msg.tool_call_id.clone(),
            }),
        }
    }

    oai_msgs
}

pub(crate) fn build_request(config: &ModelConfig, request: &ModelRequest, include_model: bool) -> ChatRequest {
    let tools = convert_tools(&request.tools);
    ChatRequest {
        model: include_model.then(|| config.model_id.clone()),
        messages: convert_messages(&request.system_prompt, &request.messages),
        max_tokens: config.max_tokens,
        temperature: if config.temperature > 0.0 {
            Some(config.temperature)
        } else {
            None
        },
        tool_choice: if tools.is_empty() { None } else { Some("auto".to_string()) },
        tools,
    }
}

/// Map the first choice of a completion to an [`AgentResponse`].
pub(crate) fn parse_response(response: ChatResponse) -> Result<AgentResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| SwitchboardError::LlmParse("response has no choices".into()))?;

    debug!(finish_reason = ?choice.finish_reason, "Chat completion received");

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|tc| {
            let args = if tc.function.arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                    warn!(tool = %tc.function.name, error = %e, "Unparseable tool arguments, using {{}}");
                    serde_json::json!({})
                })
            };
            match tc.id {
                Some(id) if !id.is_empty() => ToolCallRequest::with_id(id, tc.function.name, args),
                _ => ToolCallRequest::new(tc.function.name, args),
            }
        })
        .collect();

    Ok(AgentResponse {
        content: choice.message.content,
        tool_calls,
    })
}

pub(crate) async fn read_response(response: reqwest::Response) -> Result<AgentResponse> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        return Err(SwitchboardError::LlmRequest(format!("HTTP {}: {}", status, body)));
    }

    let parsed: ChatResponse = response
        .json()
        .await
        .map_err(|e| SwitchboardError::LlmParse(e.to_string()))?;
    parse_response(parsed)
}

impl LlmClient for OpenAiClient {
    fn invoke(&self, config: &ModelConfig, request: ModelRequest) -> BoxFuture<'_, Result<AgentResponse>> {
        let config = config.clone();

        Box::pin(async move {
            let url = match config.base_url.as_deref() {
                Some(base) if base.ends_with("/chat/completions") => base.to_string(),
                Some(base) => format!("{}/chat/completions", base.trim_end_matches('/')),
                None => OPENAI_API_URL.to_string(),
            };

            let body = build_request(&config, &request, true);
            let mut req = self.http.post(&url).json(&body);

            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req
                .send()
                .await
                .map_err(|e| SwitchboardError::LlmRequest(e.to_string()))?;

            read_response(response).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_core::state::SkillId;

    fn history() -> Vec<Message> {
        let call = ToolCallRequest::with_id("call_1", "fetch_posted_rates", json!({}));
        vec![
            Message::human("what are the rates?"),
            Message::agent(SkillId::new("renewal"), AgentResponse::calls(vec![call])),
            Message::tool_result("call_1", "1yr at 6.08%", false),
        ]
    }

    #[test]
    fn converts_roles_and_tool_calls() {
        let msgs = convert_messages("be helpful", &history());
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].role, "user");
        assert_eq!(msgs[2].role, "assistant");
        assert!(msgs[2].content.is_none());
        let calls = msgs[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "fetch_posted_rates");
        assert_eq!(calls[0].function.arguments, "{}");
        assert_eq!(msgs[3].role, "tool");
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_binds_tools() {
        let config = ModelConfig::new("openai", "gpt-4o");
        let request = ModelRequest {
            system_prompt: "sys".into(),
            messages: history(),
            tools: vec![ToolDefinition {
                name: "fetch_posted_rates".into(),
                description: "rates".into(),
                input_schema: json!({"type": "object", "properties": {}}),
            }],
        };
        let body = serde_json::to_value(build_request(&config, &request, true)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "fetch_posted_rates");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn parses_tool_calls() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "retention_rate", "arguments": "{\"counter_rate\": 5.1}"}},
                        {"id": "call_b", "type": "function",
                         "function": {"name": "discounted_rate", "arguments": "not json"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let parsed: ChatResponse = serde_json::from_value(raw).unwrap();
        let response = parse_response(parsed).unwrap();
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].id, "call_a");
        assert_eq!(response.tool_calls[0].args["counter_rate"], 5.1);
        assert_eq!(response.tool_calls[1].args, json!({}));
    }

    #[test]
    fn parses_plain_text() {
        let raw = json!({"choices": [{"message": {"content": "Hello!"}, "finish_reason": "stop"}]});
        let parsed: ChatResponse = serde_json::from_value(raw).unwrap();
        let response = parse_response(parsed).unwrap();
        assert_eq!(response.decision(), AgentDecision::Respond("Hello!".into()));
    }

    #[test]
    fn no_choices_is_parse_error() {
        let parsed: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(parse_response(parsed), Err(SwitchboardError::LlmParse(_))));
    }
}
