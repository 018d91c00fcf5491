use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use switchboard_core::config::{AgentConfig, ModelConfig};
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::event::EventBus;
use switchboard_core::security::{ApprovalDecision, TrustPolicy};
use switchboard_core::state::{PendingApproval, SessionState, SkillId, StackUpdate};
use switchboard_core::traits::{LlmClient, SessionStore};
use switchboard_core::types::{
    AgentDecision, AgentEvent, AgentResponse, Message, Role, SessionId, ToolContext,
};
use switchboard_tools::ToolRegistry;

use super::definition::GraphDefinition;
use super::edge::{self, Route};
use super::handoff::{entry_message, not_executed_message, resume_message, EMPTY_RESPONSE_INSTRUCTION};
use super::node::{AgentNode, EscalationArgs};
use crate::approval::ApprovalBroker;
use crate::session::SessionLocks;
use crate::tool_executor::ToolExecutor;

/// What drives a step.
#[derive(Debug, Clone)]
pub enum StepInput {
    Message(String),
    Approval(ApprovalDecision),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    Responded,
    AwaitingApproval(Vec<PendingApproval>),
}

/// Result of one step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub status: StepStatus,
    /// Messages appended during the step, without the human input.
    pub messages: Vec<Message>,
    pub active_skill: SkillId,
}

impl StepOutcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self.status, StepStatus::AwaitingApproval(_))
    }

    /// Final agent text, when the step ended with one.
    pub fn reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Agent && !m.has_tool_calls())
            .map(Message::text)
    }

    pub fn pending(&self) -> &[PendingApproval] {
        match &self.status {
            StepStatus::AwaitingApproval(batch) => batch,
            StepStatus::Responded => &[],
        }
    }
}

/// Side effects a step has already caused. Once a tool ran, the step must be
/// saved even when it ends in cancellation or failure.
#[derive(Default)]
struct StepProgress {
    human_id: Option<String>,
    resolved: Option<(Vec<PendingApproval>, bool)>,
    tools_ran: bool,
}

impl StepProgress {
    fn has_side_effects(&self) -> bool {
        self.tools_ran || self.resolved.is_some()
    }
}

/// Runs steps of the dialog graph over persisted sessions.
///
/// A step loads the session, applies the input, then alternates between
/// invoking the active skill's node and following the route its response
/// selects until an agent answers in text or a sensitive batch suspends the
/// session. The session is saved once at the end of the step.
pub struct DialogGraph {
    definition: Arc<GraphDefinition>,
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    store: Arc<dyn SessionStore>,
    event_bus: Arc<EventBus>,
    broker: ApprovalBroker,
    locks: SessionLocks,
    executor: ToolExecutor,
    config: AgentConfig,
    policy: TrustPolicy,
    cancel: CancellationToken,
}

impl DialogGraph {
    pub fn new(
        definition: Arc<GraphDefinition>,
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
        store: Arc<dyn SessionStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            executor: ToolExecutor::new(registry.clone(), event_bus.clone()),
            broker: ApprovalBroker::new(event_bus.clone()),
            definition,
            registry,
            llm,
            model,
            store,
            event_bus,
            locks: SessionLocks::new(),
            config: AgentConfig::default(),
            policy: TrustPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_policy(mut self, policy: TrustPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn definition(&self) -> &GraphDefinition {
        &self.definition
    }

    pub fn broker(&self) -> &ApprovalBroker {
        &self.broker
    }

    /// Create the session if needed and attach a customer to it.
    pub async fn start_session(
        &self,
        session_id: &SessionId,
        customer_id: Option<&str>,
    ) -> Result<SessionState> {
        let _guard = self.locks.acquire(session_id).await;
        let mut state = self
            .store
            .load(session_id)
            .await?
            .unwrap_or_else(|| SessionState::new(session_id.clone()));

        if let Some(customer) = customer_id {
            match state.customer_id.as_deref() {
                None => state.customer_id = Some(customer.to_string()),
                Some(existing) if existing != customer => {
                    warn!(session_id = %session_id, existing, requested = customer, "Session already belongs to another customer");
                }
                Some(_) => {}
            }
        }

        self.store.save(session_id, &state).await?;
        Ok(state)
    }

    pub async fn send_message(&self, session_id: &SessionId, text: &str) -> Result<StepOutcome> {
        self.step(session_id, StepInput::Message(text.to_string())).await
    }

    /// Approve or deny every call of the suspended batch.
    pub async fn resolve_approval(
        &self,
        session_id: &SessionId,
        approved: bool,
        reason: Option<String>,
    ) -> Result<StepOutcome> {
        let decision = ApprovalDecision::from_parts(approved, reason);
        self.step(session_id, StepInput::Approval(decision)).await
    }

    pub async fn pending_approvals(&self, session_id: &SessionId) -> Result<Vec<PendingApproval>> {
        Ok(self
            .store
            .load(session_id)
            .await?
            .map(|s| s.pending_approvals)
            .unwrap_or_default())
    }

    pub async fn history(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        Ok(self
            .store
            .load(session_id)
            .await?
            .map(|s| s.messages)
            .unwrap_or_default())
    }

    /// Run one step. Steps on the same session are serialized.
    pub async fn step(&self, session_id: &SessionId, input: StepInput) -> Result<StepOutcome> {
        let guard = self.locks.acquire(session_id).await;
        let result = self.step_locked(session_id, input).await;
        drop(guard);
        self.locks.prune().await;
        result
    }

    async fn step_locked(&self, session_id: &SessionId, input: StepInput) -> Result<StepOutcome> {
        let mut state = self
            .store
            .load(session_id)
            .await?
            .unwrap_or_else(|| SessionState::new(session_id.clone()));

        if matches!(input, StepInput::Approval(_)) && !state.is_suspended() {
            return Err(SwitchboardError::NoPendingApproval(session_id.to_string()));
        }

        info!(session_id = %session_id, skill = %state.active_skill(), "Step started");
        self.event_bus.publish(AgentEvent::StepStarted {
            session_id: session_id.clone(),
            skill: state.active_skill(),
        });

        let start = state.messages.len();
        let mut progress = StepProgress::default();
        let result = self.run_step(&mut state, input, &mut progress).await;

        match result {
            Ok(status) => {
                self.store.save(session_id, &state).await?;
                self.release_resolved(session_id, &mut progress).await;

                let messages: Vec<Message> = state.messages[start..]
                    .iter()
                    .filter(|m| Some(&m.id) != progress.human_id.as_ref())
                    .cloned()
                    .collect();
                let suspended = matches!(status, StepStatus::AwaitingApproval(_));

                if let StepStatus::AwaitingApproval(ref batch) = status {
                    self.broker.request(session_id, batch).await;
                }

                info!(
                    session_id = %session_id,
                    skill = %state.active_skill(),
                    suspended,
                    messages = messages.len(),
                    "Step complete"
                );
                self.event_bus.publish(AgentEvent::StepComplete {
                    session_id: session_id.clone(),
                    skill: state.active_skill(),
                    suspended,
                    messages: messages.len(),
                });

                Ok(StepOutcome {
                    status,
                    messages,
                    active_skill: state.active_skill(),
                })
            }
            Err(SwitchboardError::Cancelled) => {
                if progress.has_side_effects() {
                    warn!(session_id = %session_id, "Step cancelled after tools ran; saving what ran");
                    self.store.save(session_id, &state).await?;
                    self.release_resolved(session_id, &mut progress).await;
                } else {
                    warn!(session_id = %session_id, "Step cancelled; nothing saved");
                }
                Err(SwitchboardError::Cancelled)
            }
            Err(e) => {
                error!(session_id = %session_id, skill = %state.active_skill(), error = %e, "Step failed");
                self.event_bus.publish(AgentEvent::StepFailed {
                    session_id: session_id.clone(),
                    error: e.to_string(),
                });
                match self.store.save(session_id, &state).await {
                    Ok(()) => self.release_resolved(session_id, &mut progress).await,
                    Err(save_err) => {
                        error!(session_id = %session_id, error = %save_err, "Failed to save session after step failure");
                    }
                }
                Err(e)
            }
        }
    }

    /// Drop the in-process copy of a batch once its answers are stored.
    async fn release_resolved(&self, session_id: &SessionId, progress: &mut StepProgress) {
        if let Some((batch, approved)) = progress.resolved.take() {
            self.broker.resolve(session_id, &batch, approved).await;
        }
    }

    async fn run_step(
        &self,
        state: &mut SessionState,
        input: StepInput,
        progress: &mut StepProgress,
    ) -> Result<StepStatus> {
        match input {
            StepInput::Message(text) => {
                if state.is_suspended() {
                    info!(session_id = %state.session_id, "New message while approval pending; treating it as a denial");
                    let decision = ApprovalDecision::Denied {
                        reason: Some(text.clone()),
                    };
                    self.apply_decision(state, &decision, progress).await;
                }
                let message = Message::human(text);
                progress.human_id = Some(message.id.clone());
                state.append(message);
            }
            StepInput::Approval(decision) => self.apply_decision(state, &decision, progress).await,
        }

        self.ensure_context(state).await;
        self.run_graph(state, progress).await
    }

    /// Answer every call of the suspended batch, by running it or by
    /// recording the denial. The broker is told once the answers are saved.
    async fn apply_decision(
        &self,
        state: &mut SessionState,
        decision: &ApprovalDecision,
        progress: &mut StepProgress,
    ) {
        let batch = std::mem::take(&mut state.pending_approvals);
        let ctx = self.tool_context(state);

        for item in &batch {
            let message = match decision {
                ApprovalDecision::Approved => self.executor.execute(&item.call, ctx.clone()).await,
                ApprovalDecision::Denied { reason } => Message::tool_result(
                    &item.call.id,
                    ApprovalDecision::denial_message(reason.as_deref()),
                    false,
                ),
            };
            state.append(message);
        }

        info!(
            session_id = %state.session_id,
            calls = batch.len(),
            approved = decision.is_approved(),
            "Approval applied"
        );
        progress.tools_ran |= decision.is_approved() && !batch.is_empty();
        progress.resolved = Some((batch, decision.is_approved()));
    }

    /// Populate the session context once. A failure leaves it unset so the
    /// next step tries again.
    async fn ensure_context(&self, state: &mut SessionState) {
        if state.context.is_some() {
            return;
        }
        let Some(tool) = self.definition.context_tool() else {
            return;
        };

        let ctx = self.tool_context(state);
        match self.registry.execute(tool, serde_json::json!({}), ctx).await {
            Ok(result) if !result.is_error => {
                let value = serde_json::from_str(&result.content)
                    .unwrap_or(serde_json::Value::String(result.content));
                state.set_context(value);
                debug!(session_id = %state.session_id, tool, "Context loaded");
                self.event_bus.publish(AgentEvent::ContextLoaded {
                    session_id: state.session_id.clone(),
                });
            }
            Ok(result) => {
                warn!(session_id = %state.session_id, tool, error = %result.content, "Context fetch failed");
            }
            Err(e) => {
                warn!(session_id = %state.session_id, tool, error = %e, "Context fetch failed");
            }
        }
    }

    async fn run_graph(&self, state: &mut SessionState, progress: &mut StepProgress) -> Result<StepStatus> {
        let mut iterations = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(SwitchboardError::Cancelled);
            }
            if iterations >= self.config.max_iterations {
                return Err(SwitchboardError::MaxIterationsExceeded(self.config.max_iterations));
            }
            iterations += 1;

            let skill = state.active_skill();
            let node = self.definition.node(&skill)?;
            let response = self.invoke_node(node, state).await?;
            let route = edge::route(node, &response, &self.registry, &self.policy)?;
            debug!(session_id = %state.session_id, skill = %skill, iteration = iterations, route = ?route, "Routed");

            match route {
                Route::End => {
                    state.append(Message::agent(skill, response));
                    return Ok(StepStatus::Responded);
                }
                Route::SafeTools => {
                    let calls = response.tool_calls.clone();
                    state.append(Message::agent(skill, response));
                    let ctx = self.tool_context(state);
                    for call in &calls {
                        let message = self.executor.execute(call, ctx.clone()).await;
                        state.append(message);
                    }
                    progress.tools_ran = true;
                }
                Route::SensitiveTools => {
                    let batch: Vec<PendingApproval> = response
                        .tool_calls
                        .iter()
                        .map(|call| PendingApproval::new(state.session_id.clone(), skill.clone(), call.clone()))
                        .collect();
                    state.append(Message::agent(skill, response));
                    state.pending_approvals = batch.clone();
                    return Ok(StepStatus::AwaitingApproval(batch));
                }
                Route::Delegate { target, call } => {
                    let display_name = self.definition.node(&target)?.display_name.clone();
                    let calls = response.tool_calls.clone();
                    state.append(Message::agent(skill.clone(), response));
                    for c in &calls {
                        if c.id == call.id {
                            state.append_with(
                                entry_message(&c.id, &display_name),
                                StackUpdate::Push(target.clone()),
                            );
                        } else {
                            state.append(not_executed_message(c, &display_name));
                        }
                    }
                    info!(session_id = %state.session_id, from = %skill, to = %target, "Entered skill");
                    self.event_bus.publish(AgentEvent::SkillEntered {
                        session_id: state.session_id.clone(),
                        skill: target,
                    });
                }
                Route::LeaveSkill { call } => {
                    let args = EscalationArgs::parse(&call.args);
                    let mut next = state.skill_stack.clone();
                    let resumed = next.apply(StackUpdate::Pop);
                    let display_name = self.definition.node(&resumed)?.display_name.clone();

                    let calls = response.tool_calls.clone();
                    state.append(Message::agent(skill.clone(), response));
                    for c in &calls {
                        if c.id == call.id {
                            state.append_with(resume_message(&c.id), StackUpdate::Pop);
                        } else {
                            state.append(not_executed_message(c, &display_name));
                        }
                    }
                    info!(
                        session_id = %state.session_id,
                        from = %skill,
                        to = %resumed,
                        cancel = args.cancel,
                        reason = %args.reason,
                        "Left skill"
                    );
                    self.event_bus.publish(AgentEvent::SkillLeft {
                        session_id: state.session_id.clone(),
                        skill,
                        resumed,
                        reason: args.reason,
                    });
                }
            }
        }
    }

    /// Invoke a node until it produces text or tool calls. Each empty
    /// output adds a transient nudge that is never persisted.
    async fn invoke_node(&self, node: &AgentNode, state: &SessionState) -> Result<AgentResponse> {
        let attempts = self.config.max_empty_retries + 1;
        let mut extra: Vec<Message> = Vec::new();

        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                return Err(SwitchboardError::Cancelled);
            }
            self.event_bus.publish(AgentEvent::AgentInvoked {
                session_id: state.session_id.clone(),
                skill: node.skill.clone(),
                attempt,
            });

            let response = node
                .invoke(self.llm.as_ref(), &self.model, &self.registry, state, &extra)
                .await?;
            if !matches!(response.decision(), AgentDecision::Empty) {
                return Ok(response);
            }

            warn!(session_id = %state.session_id, skill = %node.skill, attempt, "Empty agent response");
            if attempt < attempts {
                self.event_bus.publish(AgentEvent::EmptyResponseRetry {
                    session_id: state.session_id.clone(),
                    skill: node.skill.clone(),
                    attempt,
                });
                extra.push(Message::instruction(EMPTY_RESPONSE_INSTRUCTION));
            }
        }

        Err(SwitchboardError::NoActionableOutput {
            skill: node.skill.to_string(),
            attempts,
        })
    }

    fn tool_context(&self, state: &SessionState) -> ToolContext {
        ToolContext {
            session_id: state.session_id.clone(),
            customer_id: state.customer_id.clone(),
            profile: state.context.clone(),
        }
    }
}
