use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use switchboard_core::event::EventBus;
use switchboard_core::types::AgentEvent;

/// JSONL audit log of dialog steps.
///
/// Subscribes to the EventBus and appends one JSON object per line to
/// `{log_dir}/{session_id}/{timestamp}.jsonl`, one file per session per
/// logger lifetime. Lines are flushed as they are written.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    session_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    skill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level`: 1 = step outcomes, 2 = routing and approvals, 3 = tool calls.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Subscribe now and log in a background task until `cancel` fires or
    /// the bus closes.
    pub fn start(self, event_bus: &Arc<EventBus>, cancel: CancellationToken) -> JoinHandle<()> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, cancel))
    }

    async fn run(self, mut rx: Receiver<AgentEvent>, cancel: CancellationToken) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, path = %self.log_dir.display(), "Failed to create log directory");
            return;
        }
        info!(path = %self.log_dir.display(), level = self.level, "RunLogger started");

        let mut files = SessionFiles::new(self.log_dir.clone());

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => match result {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "RunLogger lagged, skipped events");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        debug!("EventBus closed, RunLogger stopping");
                        break;
                    }
                },
            };

            let Some(entry) = self.event_to_entry(&event) else {
                continue;
            };
            let Ok(json) = serde_json::to_string(&entry) else {
                continue;
            };

            files.write(&entry.session_id, &json).await;
            if entry.ends_step() {
                files.close(&entry.session_id).await;
            }
        }

        files.close_all().await;
        debug!("RunLogger finished");
    }

    /// Returns `None` when the event is below the configured level.
    fn event_to_entry(&self, event: &AgentEvent) -> Option<LogEntry> {
        let entry = |event_type: &'static str, skill: Option<String>, detail: Option<serde_json::Value>| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            session_id: event.session_id().to_string(),
            event_type,
            skill,
            detail,
        };

        match event {
            // L1
            AgentEvent::StepComplete {
                skill,
                suspended,
                messages,
                ..
            } => Some(entry(
                "step_complete",
                Some(skill.to_string()),
                Some(serde_json::json!({ "suspended": suspended, "messages": messages })),
            )),
            AgentEvent::StepFailed { error, .. } => Some(entry(
                "step_failed",
                None,
                Some(serde_json::json!({ "error": error })),
            )),

            // L2
            AgentEvent::StepStarted { skill, .. } if self.level >= 2 => {
                Some(entry("step_started", Some(skill.to_string()), None))
            }
            AgentEvent::ContextLoaded { .. } if self.level >= 2 => Some(entry("context_loaded", None, None)),
            AgentEvent::EmptyResponseRetry { skill, attempt, .. } if self.level >= 2 => Some(entry(
                "empty_response_retry",
                Some(skill.to_string()),
                Some(serde_json::json!({ "attempt": attempt })),
            )),
            AgentEvent::SkillEntered { skill, .. } if self.level >= 2 => {
                Some(entry("skill_entered", Some(skill.to_string()), None))
            }
            AgentEvent::SkillLeft {
                skill,
                resumed,
                reason,
                ..
            } if self.level >= 2 => Some(entry(
                "skill_left",
                Some(skill.to_string()),
                Some(serde_json::json!({ "resumed": resumed, "reason": reason })),
            )),
            AgentEvent::ApprovalRequested { pending } if self.level >= 2 => Some(entry(
                "approval_requested",
                Some(pending.skill.to_string()),
                Some(serde_json::json!({
                    "tool": pending.call.name,
                    "call_id": pending.call.id,
                    "input": truncate(&pending.call.args.to_string(), 500),
                })),
            )),
            AgentEvent::ApprovalResolved { call_id, approved, .. } if self.level >= 2 => Some(entry(
                "approval_resolved",
                None,
                Some(serde_json::json!({ "call_id": call_id, "approved": approved })),
            )),

            // L3
            AgentEvent::AgentInvoked { skill, attempt, .. } if self.level >= 3 => Some(entry(
                "agent_invoked",
                Some(skill.to_string()),
                Some(serde_json::json!({ "attempt": attempt })),
            )),
            AgentEvent::ToolStart {
                name, call_id, input, ..
            } if self.level >= 3 => Some(entry(
                "tool_start",
                None,
                Some(serde_json::json!({
                    "tool": name,
                    "call_id": call_id,
                    "input": truncate(&input.to_string(), 500),
                })),
            )),
            AgentEvent::ToolEnd {
                name, call_id, result, ..
            } if self.level >= 3 => Some(entry(
                "tool_end",
                None,
                Some(serde_json::json!({
                    "tool": name,
                    "call_id": call_id,
                    "is_error": result.is_error,
                    "content_preview": truncate(&result.content, 200),
                })),
            )),

            _ => None,
        }
    }
}

impl LogEntry {
    fn ends_step(&self) -> bool {
        matches!(self.event_type, "step_complete" | "step_failed")
    }
}

/// Log files of the sessions with a step in flight. A file is closed when
/// its step ends and reopened in append mode by the next one, so each session
/// keeps one file per logger lifetime.
struct SessionFiles {
    log_dir: PathBuf,
    started: String,
    open: HashMap<String, BufWriter<File>>,
}

impl SessionFiles {
    fn new(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            started: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            open: HashMap::new(),
        }
    }

    async fn write(&mut self, session_id: &str, json: &str) {
        if !self.open.contains_key(session_id) {
            match open_log(&self.log_dir, session_id, &self.started).await {
                Some(w) => {
                    self.open.insert(session_id.to_string(), w);
                }
                None => return,
            }
        }
        let Some(writer) = self.open.get_mut(session_id) else {
            return;
        };

        let line = format!("{}\n", json);
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            error!(error = %e, session_id, "Failed to write log entry");
            return;
        }
        if let Err(e) = writer.flush().await {
            error!(error = %e, "Failed to flush log");
        }
    }

    async fn close(&mut self, session_id: &str) {
        if let Some(mut writer) = self.open.remove(session_id) {
            writer.flush().await.ok();
        }
    }

    async fn close_all(&mut self) {
        for (_, mut writer) in self.open.drain() {
            writer.flush().await.ok();
        }
    }

    #[cfg(test)]
    fn open_count(&self) -> usize {
        self.open.len()
    }
}

async fn open_log(log_dir: &Path, session_id: &str, started: &str) -> Option<BufWriter<File>> {
    let session_dir = log_dir.join(session_id);
    if let Err(e) = tokio::fs::create_dir_all(&session_dir).await {
        error!(error = %e, path = %session_dir.display(), "Failed to create session log directory");
        return None;
    }
    let path = session_dir.join(format!("{}.jsonl", started));
    match tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
        Ok(file) => Some(BufWriter::new(file)),
        Err(e) => {
            error!(error = %e, path = %path.display(), "Failed to open log file");
            None
        }
    }
}

/// Truncate on a char boundary.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchboard_core::state::SkillId;
    use switchboard_core::types::SessionId;

    fn step_complete(sid: &str) -> AgentEvent {
        AgentEvent::StepComplete {
            session_id: SessionId::from_str(sid),
            skill: SkillId::primary(),
            suspended: false,
            messages: 2,
        }
    }

    fn tool_start() -> AgentEvent {
        AgentEvent::ToolStart {
            session_id: SessionId::from_str("s1"),
            name: "search_user_info".into(),
            call_id: "call_1".into(),
            input: serde_json::Value::Null,
        }
    }

    #[test]
    fn entry_skips_empty_fields() {
        let logger = RunLogger::new(PathBuf::from("/tmp"), 1);
        let entry = logger
            .event_to_entry(&AgentEvent::StepFailed {
                session_id: SessionId::from_str("s1"),
                error: "boom".into(),
            })
            .unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("step_failed"));
        assert!(json.contains("boom"));
        assert!(!json.contains("skill"));
    }

    #[test]
    fn level_filtering() {
        let skill_entered = AgentEvent::SkillEntered {
            session_id: SessionId::from_str("s1"),
            skill: SkillId::new("renewal"),
        };

        let l1 = RunLogger::new(PathBuf::from("/tmp"), 1);
        assert!(l1.event_to_entry(&step_complete("s1")).is_some());
        assert!(l1.event_to_entry(&skill_entered).is_none());
        assert!(l1.event_to_entry(&tool_start()).is_none());

        let l2 = RunLogger::new(PathBuf::from("/tmp"), 2);
        assert!(l2.event_to_entry(&skill_entered).is_some());
        assert!(l2.event_to_entry(&tool_start()).is_none());

        let l3 = RunLogger::new(PathBuf::from("/tmp"), 3);
        assert!(l3.event_to_entry(&tool_start()).is_some());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        let cut = truncate("ééééé", 3);
        assert_eq!(cut, "é...");
    }

    #[tokio::test]
    async fn files_close_when_the_step_ends() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = SessionFiles::new(dir.path().to_path_buf());

        files.write("alpha", r#"{"event_type":"step_started"}"#).await;
        files.write("beta", r#"{"event_type":"step_started"}"#).await;
        assert_eq!(files.open_count(), 2);

        files.write("alpha", r#"{"event_type":"step_complete"}"#).await;
        files.close("alpha").await;
        assert_eq!(files.open_count(), 1);

        files.write("alpha", r#"{"event_type":"step_started"}"#).await;
        files.close_all().await;
        assert_eq!(files.open_count(), 0);

        let logs: Vec<_> = std::fs::read_dir(dir.path().join("alpha")).unwrap().collect();
        assert_eq!(logs.len(), 1);
        let path = logs.into_iter().next().unwrap().unwrap().path();
        assert_eq!(std::fs::read_to_string(path).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn writes_one_file_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::default());
        let cancel = CancellationToken::new();
        let handle = RunLogger::new(dir.path().to_path_buf(), 1).start(&bus, cancel.clone());

        bus.publish(step_complete("alpha"));
        bus.publish(step_complete("beta"));
        bus.publish(step_complete("alpha"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let mut files = std::fs::read_dir(dir.path().join("alpha")).unwrap();
        let path = files.next().unwrap().unwrap().path();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(dir.path().join("beta").is_dir());
    }
}
