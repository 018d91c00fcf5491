use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use switchboard_core::event::EventBus;
use switchboard_core::state::PendingApproval;
use switchboard_core::types::{AgentEvent, SessionId};

/// Announces suspended calls to external observers and tracks the ones
/// raised by this process.
///
/// The durable record of a suspension is `SessionState::pending_approvals`;
/// the broker only mirrors it so a REPL or notifier can list what is waiting
/// without touching the store.
pub struct ApprovalBroker {
    pending: Mutex<HashMap<String, PendingApproval>>,
    event_bus: Arc<EventBus>,
}

impl ApprovalBroker {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            event_bus,
        }
    }

    /// Record a suspended batch and publish one request per call.
    pub async fn request(&self, session_id: &SessionId, batch: &[PendingApproval]) {
        info!(session_id = %session_id, calls = batch.len(), "Awaiting approval");
        let mut pending = self.pending.lock().await;
        for item in batch {
            self.event_bus.publish(AgentEvent::ApprovalRequested {
                pending: item.clone(),
            });
            pending.insert(item.id.clone(), item.clone());
        }
    }

    /// Resolve a batch. Publishes a resolution for every call, including
    /// ones raised by another process before a restart.
    pub async fn resolve(&self, session_id: &SessionId, batch: &[PendingApproval], approved: bool) {
        let mut pending = self.pending.lock().await;
        for item in batch {
            pending.remove(&item.id);
            self.event_bus.publish(AgentEvent::ApprovalResolved {
                session_id: session_id.clone(),
                call_id: item.call.id.clone(),
                approved,
            });
        }
    }

    /// Every pending approval known to this process, oldest first.
    pub async fn pending_requests(&self) -> Vec<PendingApproval> {
        let mut items: Vec<PendingApproval> = self.pending.lock().await.values().cloned().collect();
        items.sort_by_key(|p| p.requested_at);
        items
    }
}
