use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::models::Post;

/// Buffered events per subscriber before it starts lagging.
const DEFAULT_CAPACITY: usize = 64;

/// A post mutation, serialized as `{"action": ..., "post": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "post", rename_all = "lowercase")]
pub enum PostEvent {
    Create(Post),
    Update(Post),
    /// Carries only the id of the removed post
    Delete(String),
}

/// Fan-out of post events to connected clients. Publishing never fails
/// from the caller's point of view.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, event: PostEvent);
}

/// In-process broadcaster; each live connection holds a receiver.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<PostEvent>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PostEvent> {
        self.tx.subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, event: PostEvent) {
        match self.tx.send(event) {
            Ok(receivers) => tracing::debug!(receivers, "Published post event"),
            Err(_) => tracing::debug!("No subscribers for post event"),
        }
    }
}
