use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::state::SessionState;
use switchboard_core::traits::{SessionStore, SessionSummary};
use switchboard_core::types::SessionId;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        state_json TEXT NOT NULL,
        message_count INTEGER NOT NULL DEFAULT 0,
        active_skill TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_updated
        ON sessions(updated_at DESC);";

fn db_err(e: impl std::fmt::Display) -> SwitchboardError {
    SwitchboardError::Database(e.to_string())
}

/// SQLite-backed session store. One row per session holding the full state as JSON.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SwitchboardError::Database(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // WAL lets readers proceed while a step is being saved.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Session store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SessionStore for SqliteSessionStore {
    fn load(&self, sid: &SessionId) -> BoxFuture<'_, Result<Option<SessionState>>> {
        let sid = sid.0.clone();

        Box::pin(async move {
            let json: Option<String> = {
                let conn = self.conn.lock().map_err(db_err)?;
                conn.query_row(
                    "SELECT state_json FROM sessions WHERE session_id = ?1",
                    params![sid],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?
            };

            match json {
                Some(json) => {
                    let state: SessionState = serde_json::from_str(&json)
                        .map_err(|e| SwitchboardError::Database(format!("corrupt state for {}: {}", sid, e)))?;
                    Ok(Some(state))
                }
                None => Ok(None),
            }
        })
    }

    fn save(&self, sid: &SessionId, state: &SessionState) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let encoded = serde_json::to_string(state);
        let message_count = state.messages.len() as i64;
        let active_skill = state.active_skill().0;
        let updated_at = state.updated_at.to_rfc3339();

        Box::pin(async move {
            let json = encoded?;
            let mut conn = self.conn.lock().map_err(db_err)?;
            let tx = conn.transaction().map_err(db_err)?;
            tx.execute(
                "INSERT INTO sessions (session_id, state_json, message_count, active_skill, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(session_id) DO UPDATE SET
                     state_json = excluded.state_json,
                     message_count = excluded.message_count,
                     active_skill = excluded.active_skill,
                     updated_at = excluded.updated_at",
                params![sid, json, message_count, active_skill, updated_at],
            )
            .map_err(db_err)?;
            tx.commit().map_err(db_err)?;
            debug!(session_id = %sid, message_count, "Session saved");
            Ok(())
        })
    }

    fn list(&self, limit: usize) -> BoxFuture<'_, Result<Vec<SessionSummary>>> {
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, message_count, active_skill, updated_at FROM sessions
                     ORDER BY updated_at DESC
                     LIMIT ?1",
                )
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    let ts: String = row.get(3)?;
                    Ok(SessionSummary {
                        session_id: SessionId(row.get(0)?),
                        message_count: row.get::<_, i64>(1)? as usize,
                        active_skill: row.get(2)?,
                        updated_at: DateTime::parse_from_rfc3339(&ts)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now()),
                    })
                })
                .map_err(db_err)?;

            rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
        })
    }

    fn delete(&self, sid: &SessionId) -> BoxFuture<'_, Result<bool>> {
        let sid = sid.0.clone();
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let deleted = conn
                .execute("DELETE FROM sessions WHERE session_id = ?1", params![sid])
                .map_err(db_err)?;
            Ok(deleted > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::state::SkillId;
    use switchboard_core::types::Message;

    fn sample(id: &str) -> SessionState {
        let mut state = SessionState::new(SessionId::from_str(id)).with_customer("0");
        state.append(Message::human("I'd like to renew"));
        state.skill_stack.push(SkillId::new("renewal"));
        state
    }

    #[tokio::test]
    async fn save_and_load() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let state = sample("s1");
        store.save(&state.session_id, &state).await.unwrap();
        let loaded = store.load(&state.session_id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(store
            .load(&SessionId::from_str("missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn load_then_save_is_idempotent() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let state = sample("s1");
        store.save(&state.session_id, &state).await.unwrap();
        for _ in 0..3 {
            let loaded = store.load(&state.session_id).await.unwrap().unwrap();
            store.save(&loaded.session_id, &loaded).await.unwrap();
        }
        let loaded = store.load(&state.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        let summaries = store.list(10).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].message_count, 1);
        assert_eq!(summaries[0].active_skill, "renewal");
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.db");
        let state = sample("s1");
        {
            let store = SqliteSessionStore::open(&path).unwrap();
            store.save(&state.session_id, &state).await.unwrap();
        }
        let store = SqliteSessionStore::open(&path).unwrap();
        let loaded = store.load(&state.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.skill_stack.current().as_str(), "renewal");
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let state = sample("s1");
        store.save(&state.session_id, &state).await.unwrap();
        assert!(store.delete(&state.session_id).await.unwrap());
        assert!(!store.delete(&state.session_id).await.unwrap());
    }
}
