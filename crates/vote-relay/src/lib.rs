//! Vote Relay Library
//!
//! Stores the votes broadcast on each agreement session and fans them out to
//! live subscribers. Votes are kept for a configurable TTL so members that
//! join late, or reconnect, still receive everything published so far.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the live fan-out channel of one session
const LIVE_CAPACITY: usize = 1024;

/// Relay error types
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Message not found: {0}")]
    NotFound(String),
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Message identifier
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageId {
    /// Session identifier (hex)
    pub session_id: String,
    /// Sender member index
    pub from: u32,
    /// Digest of the payload
    pub digest: String,
}

impl MessageId {
    /// Create a new message ID
    pub fn new(session_id: &str, from: u32, payload: &[u8]) -> Self {
        Self {
            session_id: session_id.to_string(),
            from,
            digest: hex::encode(blake3::hash(payload).as_bytes()),
        }
    }

    /// Compute hash for lookup
    pub fn hash(&self) -> String {
        let data = format!("{}:{}:{}", self.session_id, self.from, self.digest);
        hex::encode(blake3::hash(data.as_bytes()).as_bytes())
    }
}

/// Stored message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message ID
    pub id: MessageId,
    /// Message payload
    pub payload: Vec<u8>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
}

/// Peer seen publishing or subscribing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Remote address
    pub address: String,
    /// Member index announced by the peer, if any
    pub member_index: Option<u32>,
    /// Last seen timestamp
    pub last_seen: DateTime<Utc>,
}

struct Session {
    messages: Vec<StoredMessage>,
    live: broadcast::Sender<StoredMessage>,
}

impl Default for Session {
    fn default() -> Self {
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            messages: Vec::new(),
            live,
        }
    }
}

/// Vote relay store
#[derive(Clone)]
pub struct MessageStore {
    /// Messages and live subscribers per session
    sessions: Arc<DashMap<String, Session>>,
    /// Hashes of stored messages, for de-duplication
    seen: Arc<DashMap<String, DateTime<Utc>>>,
    /// Peers by remote address
    peers: Arc<DashMap<String, PeerInfo>>,
    /// Default TTL in seconds
    ttl_seconds: i64,
}

impl MessageStore {
    /// Create a new message store
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            seen: Arc::new(DashMap::new()),
            peers: Arc::new(DashMap::new()),
            ttl_seconds,
        }
    }

    /// Store a message and deliver it to live subscribers.
    ///
    /// Returns the message ID and whether the message was new. A payload
    /// already stored for the same session and sender is not stored again.
    pub fn put(&self, session_id: &str, from: u32, payload: Vec<u8>) -> Result<(MessageId, bool)> {
        if payload.is_empty() {
            return Err(RelayError::InvalidFormat("empty payload".into()));
        }

        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(self.ttl_seconds);
        let id = MessageId::new(session_id, from, &payload);

        if self.seen.insert(id.hash(), expires_at).is_some() {
            debug!(session_id, from, "Duplicate message ignored");
            return Ok((id, false));
        }

        let message = StoredMessage {
            id: id.clone(),
            payload,
            created_at: now,
            expires_at,
        };

        let mut session = self.sessions.entry(session_id.to_string()).or_default();
        // No live subscribers is not an error.
        let _ = session.live.send(message.clone());
        session.messages.push(message);

        Ok((id, true))
    }

    /// Messages stored for a session, oldest first
    pub fn get_session_messages(&self, session_id: &str) -> Vec<StoredMessage> {
        let now = Utc::now();
        self.sessions
            .get(session_id)
            .map(|session| {
                session
                    .messages
                    .iter()
                    .filter(|message| message.expires_at > now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get a message by its hash
    pub fn get(&self, hash: &str) -> Result<StoredMessage> {
        self.sessions
            .iter()
            .find_map(|session| {
                session
                    .messages
                    .iter()
                    .find(|message| message.id.hash() == hash)
                    .cloned()
            })
            .ok_or_else(|| RelayError::NotFound(hash.to_string()))
    }

    /// Stored messages of a session plus a receiver for the ones that follow.
    ///
    /// Both are taken under the session lock, so every message is in exactly
    /// one of them.
    pub fn subscribe(
        &self,
        session_id: &str,
    ) -> (Vec<StoredMessage>, broadcast::Receiver<StoredMessage>) {
        let session = self.sessions.entry(session_id.to_string()).or_default();
        (session.messages.clone(), session.live.subscribe())
    }

    /// Record activity from a peer
    pub fn touch_peer(&self, address: &str, member_index: Option<u32>) {
        let now = Utc::now();
        let mut peer = self
            .peers
            .entry(address.to_string())
            .or_insert_with(|| PeerInfo {
                address: address.to_string(),
                member_index,
                last_seen: now,
            });
        peer.last_seen = now;
        if member_index.is_some() {
            peer.member_index = member_index;
        }
    }

    /// Peers seen within the TTL, ordered by member index
    pub fn connected_peers(&self) -> Vec<PeerInfo> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.ttl_seconds);
        let mut peers: Vec<PeerInfo> = self
            .peers
            .iter()
            .filter(|peer| peer.last_seen > cutoff)
            .map(|peer| peer.value().clone())
            .collect();
        peers.sort_by(|a, b| {
            (a.member_index, &a.address).cmp(&(b.member_index, &b.address))
        });
        peers
    }

    /// Remove expired messages and idle peers
    pub fn cleanup(&self) {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::seconds(self.ttl_seconds);

        self.sessions.retain(|_, session| {
            session.messages.retain(|message| message.expires_at > now);
            !session.messages.is_empty() || session.live.receiver_count() > 0
        });
        self.seen.retain(|_, expires_at| *expires_at > now);
        self.peers.retain(|_, peer| peer.last_seen > cutoff);
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(3600) // 1 hour default TTL
    }
}
