//! Vote Relay Client
//!
//! [`Gossip`] implementation backed by the vote relay service: votes are
//! published over HTTP and received over a websocket that first replays the
//! session's stored votes.

use dkg_result_core::gossip::{async_trait, Gossip, Subscription};
use dkg_result_core::{Error, MemberIndex, Result, SessionId};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, warn};

/// Delay before resubscribing after the relay closed a stream
const RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// HTTP/WebSocket relay client
pub struct RelayClient {
    /// HTTP client
    client: Client,
    /// Relay service URL
    url: String,
    /// This member's index
    member_index: MemberIndex,
    /// Request timeout
    timeout: Duration,
}

impl RelayClient {
    /// Create a new relay client
    pub fn new(url: &str, member_index: MemberIndex) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            member_index,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Post a vote payload to the relay
    #[instrument(skip(self, payload), fields(member_index = self.member_index))]
    async fn post_vote(&self, session_id: &SessionId, payload: &[u8]) -> Result<bool> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let req = PostVoteRequest {
            session_id: hex::encode(session_id),
            from: self.member_index,
            payload: STANDARD.encode(payload),
        };

        let response = self
            .client
            .post(format!("{}/v1/votes", self.url))
            .json(&req)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Relay(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Relay(format!(
                "POST failed with status: {}",
                response.status()
            )));
        }

        let posted: PostVoteResponse = response
            .json()
            .await
            .map_err(|e| Error::Relay(e.to_string()))?;

        debug!(hash = %posted.hash, stored = posted.stored, "Vote posted");
        Ok(posted.stored)
    }

    /// Websocket URL streaming the votes of a session
    fn websocket_url(&self, session_id: &SessionId) -> Result<String> {
        let base = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(Error::Relay(format!(
                "Unsupported relay URL: {}",
                self.url
            )));
        };

        Ok(format!(
            "{}/v1/ws/{}?member={}",
            base,
            hex::encode(session_id),
            self.member_index
        ))
    }
}

#[async_trait]
impl Gossip for RelayClient {
    async fn publish(&self, session_id: &SessionId, payload: Vec<u8>) -> Result<()> {
        self.post_vote(session_id, &payload).await?;
        Ok(())
    }

    async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription> {
        let url = self.websocket_url(session_id)?;
        let stream = connect(&url).await?;

        debug!(url = %url, "Subscribed to relay");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward(url, stream, tx));

        Ok(rx)
    }
}

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(url: &str) -> Result<RelayStream> {
    let (stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| Error::Relay(e.to_string()))?;
    Ok(stream)
}

/// Forward binary frames to the subscriber until it goes away.
///
/// When the relay closes the stream, the subscription reconnects and the
/// relay replays the session backlog.
async fn forward(url: String, mut stream: RelayStream, tx: mpsc::UnboundedSender<Vec<u8>>) {
    loop {
        loop {
            let message = tokio::select! {
                message = stream.next() => message,
                _ = tx.closed() => {
                    debug!("Relay subscription closed");
                    return;
                }
            };

            match message {
                Some(Ok(Message::Binary(payload))) => {
                    if tx.send(payload).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Relay subscription failed");
                    break;
                }
            }
        }

        stream = loop {
            tokio::time::sleep(RECONNECT_DELAY).await;
            if tx.is_closed() {
                debug!("Relay subscription closed");
                return;
            }
            match connect(&url).await {
                Ok(stream) => {
                    debug!(url = %url, "Resubscribed to relay");
                    break stream;
                }
                Err(e) => warn!(error = %e, "Relay reconnect failed"),
            }
        };
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PostVoteRequest {
    session_id: String,
    from: u32,
    payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PostVoteResponse {
    hash: String,
    stored: bool,
}
