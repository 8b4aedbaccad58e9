//! The server channel: an in-process event bus between the dev server,
//! its builders and anything relaying events to the browser.
//!
//! Events with the same name reach every subscriber in emission order.

mod debounce;
mod notifier;

pub use debounce::{DebounceAction, DebounceEvent, DebounceState, transition};
pub use notifier::InvalidationNotifier;

use serde::Serialize;
use tokio::sync::broadcast;

/// Name of the event emitted when the story index changed.
pub const STORY_INDEX_INVALIDATED: &str = "storyIndexInvalidated";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "args", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Clients should refetch `/index.json`
    StoryIndexInvalidated,
    /// Builder-defined event
    Custom {
        name: String,
        payload: serde_json::Value,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &str {
        match self {
            ServerEvent::StoryIndexInvalidated => STORY_INDEX_INVALIDATED,
            ServerEvent::Custom { name, .. } => name,
        }
    }
}

/// Broadcast handle shared by everything that emits or listens.
#[derive(Debug, Clone)]
pub struct ServerChannel {
    sender: broadcast::Sender<ServerEvent>,
}

impl ServerChannel {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event to all current subscribers.
    ///
    /// Returns how many subscribers received it.
    pub fn emit(&self, event: ServerEvent) -> usize {
        let name = event.name().to_string();
        match self.sender.send(event) {
            Ok(count) => {
                crate::debug_event!("channel", "emit", "{name} to {count} subscribers");
                count
            }
            Err(_) => {
                // No subscribers, this is fine
                crate::debug_event!("channel", "dropped", "no subscribers for {name}");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ServerChannel {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let channel = ServerChannel::new(16);
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        channel.emit(ServerEvent::StoryIndexInvalidated);
        channel.emit(ServerEvent::Custom {
            name: "builderProgress".to_string(),
            payload: serde_json::json!({ "value": 0.5 }),
        });

        for receiver in [&mut first, &mut second] {
            assert_eq!(receiver.recv().await.unwrap().name(), STORY_INDEX_INVALIDATED);
            assert_eq!(receiver.recv().await.unwrap().name(), "builderProgress");
        }
    }

    #[tokio::test]
    async fn test_zero_capacity_still_delivers() {
        let channel = ServerChannel::new(0);
        let mut receiver = channel.subscribe();

        assert_eq!(channel.emit(ServerEvent::StoryIndexInvalidated), 1);
        assert_eq!(receiver.recv().await.unwrap(), ServerEvent::StoryIndexInvalidated);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let channel = ServerChannel::default();
        assert_eq!(channel.emit(ServerEvent::StoryIndexInvalidated), 0);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(ServerEvent::StoryIndexInvalidated).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "storyIndexInvalidated" }));
    }
}
