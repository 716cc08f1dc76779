use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Fan-out of leaderboard events to every connected SSE client.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Number of clients currently listening.
    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send a batch of events in order. Returns how many were queued; zero
    /// when nobody is listening.
    pub fn publish(&self, events: impl IntoIterator<Item = ServerEvent>) -> usize {
        events
            .into_iter()
            .take_while(|event| self.sender.send(event.clone()).is_ok())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> ServerEvent {
        ServerEvent::new(Some(name.to_owned()), "{}".to_owned())
    }

    #[test]
    fn batches_reach_subscribers_in_order() {
        let hub = SseHub::new(8);
        assert_eq!(hub.publish([event("standings")]), 0);

        let mut receiver = hub.subscribe();
        assert_eq!(hub.listeners(), 1);
        assert_eq!(hub.publish([event("standings"), event("groups")]), 2);
        assert_eq!(receiver.try_recv().unwrap().event.as_deref(), Some("standings"));
        assert_eq!(receiver.try_recv().unwrap().event.as_deref(), Some("groups"));
    }
}
