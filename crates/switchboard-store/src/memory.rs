use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use switchboard_core::error::Result;
use switchboard_core::state::SessionState;
use switchboard_core::traits::{SessionStore, SessionSummary};
use switchboard_core::types::SessionId;

/// Process-local store. Keeps serialized snapshots so a loaded state never
/// aliases state another step is still mutating.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, sid: &SessionId) -> BoxFuture<'_, Result<Option<SessionState>>> {
        let sid = sid.0.clone();
        Box::pin(async move {
            let sessions = self.sessions.read().await;
            match sessions.get(&sid) {
                Some(json) => Ok(Some(serde_json::from_str(json)?)),
                None => Ok(None),
            }
        })
    }

    fn save(&self, sid: &SessionId, state: &SessionState) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let encoded = serde_json::to_string(state);
        Box::pin(async move {
            let json = encoded?;
            self.sessions.write().await.insert(sid, json);
            Ok(())
        })
    }

    fn list(&self, limit: usize) -> BoxFuture<'_, Result<Vec<SessionSummary>>> {
        Box::pin(async move {
            let sessions = self.sessions.read().await;
            let mut summaries = sessions
                .values()
                .map(|json| -> Result<SessionSummary> {
                    let state: SessionState = serde_json::from_str(json)?;
                    Ok(SessionSummary {
                        message_count: state.messages.len(),
                        active_skill: state.active_skill().0,
                        updated_at: state.updated_at,
                        session_id: state.session_id,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            summaries.truncate(limit);
            Ok(summaries)
        })
    }

    fn delete(&self, sid: &SessionId) -> BoxFuture<'_, Result<bool>> {
        let sid = sid.0.clone();
        Box::pin(async move { Ok(self.sessions.write().await.remove(&sid).is_some()) })
    }
}
