//! Broadcast channel used to exchange votes between group members

use crate::{Result, SessionId};
use tokio::sync::mpsc;

pub use ::async_trait::async_trait;

/// Stream of raw payloads delivered on a session's broadcast channel
pub type Subscription = mpsc::UnboundedReceiver<Vec<u8>>;

/// Group broadcast channel.
///
/// Delivery order and reliability are up to the implementation; receivers
/// must tolerate duplicated and reordered payloads.
#[async_trait]
pub trait Gossip: Send + Sync {
    /// Broadcast a payload to every member subscribed to the session
    async fn publish(&self, session_id: &SessionId, payload: Vec<u8>) -> Result<()>;

    /// Receive payloads broadcast on the session, including ones published
    /// before subscribing when the implementation retains them
    async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription>;
}

/// In-memory broadcast channel for testing
pub mod memory;

pub use memory::MemoryGossip;
