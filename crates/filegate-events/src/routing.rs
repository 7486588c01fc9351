//! Event bus routing helpers.

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::Sender;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    replay: Arc<Mutex<VecDeque<EventEnvelope>>>,
    replay_capacity: usize,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Construct a bus with a custom replay capacity (clamped to at least one).
    #[must_use]
    pub fn with_capacity(replay_capacity: usize) -> Self {
        let replay_capacity = replay_capacity.max(1);
        let (sender, _) = broadcast::channel(replay_capacity);
        Self {
            sender,
            replay: Arc::new(Mutex::new(VecDeque::with_capacity(replay_capacity))),
            replay_capacity,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Construct a bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Subscribe to the bus, replaying buffered events newer than `since`.
    #[must_use]
    pub fn subscribe(&self, since: Option<EventId>) -> EventStream {
        let receiver = self.sender.subscribe();
        let backlog = since.map_or_else(Vec::new, |id| self.backlog_since(id));
        let replayed_through = backlog.last().map_or(0, |envelope| envelope.id);
        EventStream {
            backlog: backlog.into(),
            replayed_through,
            live: BroadcastStream::new(receiver),
        }
    }

    /// Publish a new event to all subscribers, returning the assigned id.
    ///
    /// Delivery without subscribers is not an error; the event is still
    /// recorded in the replay ring.
    pub fn publish(&self, event: Event) -> EventId {
        let envelope = self.record(event);
        let id = envelope.id;
        let _ = self.sender.send(envelope);
        id
    }

    /// Collect a backlog of events emitted after the specified id.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        self.lock_replay()
            .iter()
            .filter(|env| env.id > id)
            .cloned()
            .collect()
    }

    fn record(&self, event: Event) -> EventEnvelope {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        let mut replay = self.lock_replay();
        if replay.len() == self.replay_capacity {
            let _ = replay.pop_front();
        }
        replay.push_back(envelope.clone());
        envelope
    }

    fn lock_replay(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        self.replay
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream that yields the replay backlog first and then live events.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    replayed_through: EventId,
    live: BroadcastStream<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, skipping over lag notifications.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(envelope) = self.backlog.pop_front() {
            return Some(envelope);
        }
        loop {
            match self.live.next().await? {
                Ok(envelope) if envelope.id > self.replayed_through => return Some(envelope),
                Ok(_) | Err(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(prefix: &str) -> Event {
        Event::BatchCompleted {
            batch_prefix: prefix.to_string(),
        }
    }

    #[tokio::test]
    async fn publish_and_replay_from_id() {
        let bus = EventBus::with_capacity(4);
        let first = bus.publish(completed("a_20230601_0930"));
        let second = bus.publish(Event::ClaimDenied {
            batch_prefix: "a_20230601_0930".into(),
        });

        let backlog = bus.backlog_since(first);
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, second);

        let mut stream = bus.subscribe(Some(0));
        assert_eq!(stream.next().await.map(|env| env.id), Some(first));
        assert_eq!(stream.next().await.map(|env| env.id), Some(second));
    }

    #[tokio::test]
    async fn replay_ring_drops_oldest_entries() {
        let bus = EventBus::with_capacity(2);
        for idx in 0..5 {
            let _ = bus.publish(completed(&format!("c_20230601_09{idx:02}")));
        }
        let backlog = bus.backlog_since(0);
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog[0].id, 4);
        assert_eq!(backlog[1].id, 5);
    }

    #[tokio::test]
    async fn subscribe_streams_live_events() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe(None);
        let id = bus.publish(Event::ValidationSkipped {
            batch_prefix: "b_20230601_0930".into(),
        });
        let envelope = stream.next().await.expect("stream item");
        assert_eq!(envelope.id, id);
        assert!(matches!(envelope.event, Event::ValidationSkipped { .. }));
    }
}
