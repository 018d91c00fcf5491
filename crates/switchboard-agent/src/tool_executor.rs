use std::sync::Arc;

use tracing::{debug, warn};

use switchboard_core::event::EventBus;
use switchboard_core::types::{AgentEvent, Message, ToolCallRequest, ToolContext, ToolResult};
use switchboard_tools::ToolRegistry;

/// Runs real tool calls and turns every outcome into a tool message.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
}

/// Content of the tool message recorded for a failed call.
pub fn error_content(error: impl std::fmt::Display) -> String {
    format!("Error: {}\n please fix your mistakes.", error)
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, event_bus: Arc<EventBus>) -> Self {
        Self {
            registry,
            event_bus,
        }
    }

    /// Execute one call exactly once. Failures come back as an error-flagged
    /// tool message so the agent can read them and try something else.
    pub async fn execute(&self, call: &ToolCallRequest, ctx: ToolContext) -> Message {
        let session_id = ctx.session_id.clone();
        self.event_bus.publish(AgentEvent::ToolStart {
            session_id: session_id.clone(),
            name: call.name.clone(),
            call_id: call.id.clone(),
            input: call.args.clone(),
        });

        let result = match self.registry.execute(&call.name, call.args.clone(), ctx).await {
            Ok(result) => {
                debug!(tool = %call.name, call_id = %call.id, is_error = result.is_error, "Tool finished");
                if result.is_error {
                    ToolResult::error(error_content(&result.content))
                } else {
                    result
                }
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool failed");
                ToolResult::error(error_content(&e))
            }
        };

        self.event_bus.publish(AgentEvent::ToolEnd {
            session_id,
            name: call.name.clone(),
            call_id: call.id.clone(),
            result: result.clone(),
        });

        Message::tool_result(&call.id, result.content, result.is_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use switchboard_core::error::{Result, SwitchboardError};
    use switchboard_core::traits::Tool;
    use switchboard_core::types::{Role, SessionId};

    struct Echo;

    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input."
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async move { Ok(ToolResult::success(input.to_string())) })
        }
    }

    struct Broken;

    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails."
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async move {
                Err(SwitchboardError::ToolExecution {
                    tool: "broken".into(),
                    message: "backend unavailable".into(),
                })
            })
        }
    }

    fn executor() -> (ToolExecutor, Arc<EventBus>) {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        registry.register(Broken);
        let bus = Arc::new(EventBus::default());
        (ToolExecutor::new(Arc::new(registry), bus.clone()), bus)
    }

    fn ctx() -> ToolContext {
        ToolContext::new(SessionId::from_str("s1"))
    }

    #[tokio::test]
    async fn success_answers_the_call() {
        let (executor, _) = executor();
        let call = ToolCallRequest::with_id("c1", "echo", serde_json::json!({"x": 1}));

        let msg = executor.execute(&call, ctx()).await;
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
        assert!(!msg.is_error);
        assert!(msg.text().contains("\"x\":1"));
    }

    #[tokio::test]
    async fn failure_becomes_error_message() {
        let (executor, _) = executor();
        let call = ToolCallRequest::with_id("c2", "broken", serde_json::json!({}));

        let msg = executor.execute(&call, ctx()).await;
        assert!(msg.is_error);
        assert!(msg.text().starts_with("Error: "));
        assert!(msg.text().contains("backend unavailable"));
        assert!(msg.text().ends_with("\n please fix your mistakes."));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_fatal() {
        let (executor, _) = executor();
        let call = ToolCallRequest::with_id("c3", "nope", serde_json::json!({}));

        let msg = executor.execute(&call, ctx()).await;
        assert!(msg.is_error);
        assert_eq!(msg.tool_call_id.as_deref(), Some("c3"));
    }

    #[tokio::test]
    async fn publishes_start_and_end() {
        let (executor, bus) = executor();
        let mut rx = bus.subscribe();
        let call = ToolCallRequest::with_id("c4", "echo", serde_json::json!({}));

        executor.execute(&call, ctx()).await;
        assert!(matches!(rx.recv().await.unwrap(), AgentEvent::ToolStart { .. }));
        match rx.recv().await.unwrap() {
            AgentEvent::ToolEnd { call_id, .. } => assert_eq!(call_id, "c4"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
