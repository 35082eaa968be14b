//! In-memory broadcast channel for testing

use super::{async_trait, Gossip, Subscription};
use crate::{Result, SessionId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct Topic {
    history: Vec<Vec<u8>>,
    subscribers: Vec<mpsc::UnboundedSender<Vec<u8>>>,
}

/// In-memory broadcast channel shared by all members of a local test group
#[derive(Clone, Default)]
pub struct MemoryGossip {
    /// Published payloads and live subscribers per session
    topics: Arc<DashMap<SessionId, Topic>>,
}

impl MemoryGossip {
    /// Create a new in-memory channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads published on a session so far
    pub fn published(&self, session_id: &SessionId) -> usize {
        self.topics
            .get(session_id)
            .map_or(0, |topic| topic.history.len())
    }
}

#[async_trait]
impl Gossip for MemoryGossip {
    async fn publish(&self, session_id: &SessionId, payload: Vec<u8>) -> Result<()> {
        let mut topic = self.topics.entry(*session_id).or_default();

        topic
            .subscribers
            .retain(|subscriber| subscriber.send(payload.clone()).is_ok());
        topic.history.push(payload);

        Ok(())
    }

    async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Replay and registration happen under the same entry lock so no
        // payload is missed or delivered twice by this channel.
        let mut topic = self.topics.entry(*session_id).or_default();
        for payload in &topic.history {
            let _ = tx.send(payload.clone());
        }
        topic.subscribers.push(tx);

        Ok(rx)
    }
}
