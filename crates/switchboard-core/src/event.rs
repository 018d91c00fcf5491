use crate::types::AgentEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: AgentEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;

    #[tokio::test]
    async fn subscribers_see_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(AgentEvent::ContextLoaded {
            session_id: SessionId::from_str("s1"),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id().as_str(), "s1");
    }

    #[test]
    fn publish_without_receivers_is_ok() {
        let bus = EventBus::new(4);
        bus.publish(AgentEvent::StepFailed {
            session_id: SessionId::from_str("s1"),
            error: "boom".into(),
        });
        assert_eq!(bus.receiver_count(), 0);
    }
}
