//! Broadcast channel to connected client sessions.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffer size for the client broadcast channel.
/// Reload is the only message and is idempotent, so a small buffer is enough.
const CLIENT_CHANNEL_BUFFER_SIZE: usize = 16;

/// Message posted to client sessions. Serializes as `{"action":"reload"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    Reload,
}

#[derive(Debug, Clone)]
pub struct ClientHub {
    sender: broadcast::Sender<ClientMessage>,
    next_id: Arc<AtomicU64>,
    claimed: Arc<AtomicBool>,
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CLIENT_CHANNEL_BUFFER_SIZE);
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
            claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn connect(&self) -> ClientSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(client = id, "Client session connected");
        ClientSession {
            id,
            receiver: self.sender.subscribe(),
            claimed: Arc::clone(&self.claimed),
        }
    }

    pub fn connected(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Tell every connected session to reload. Fire-and-forget: returns how
    /// many sessions the message was queued for, zero if none are listening.
    pub fn broadcast_reload(&self) -> usize {
        match self.sender.send(ClientMessage::Reload) {
            Ok(count) => count,
            Err(_) => 0,
        }
    }

    /// Take control of all sessions, current and future. Returns the number
    /// currently connected. Sessions that connect later start controlled.
    pub fn claim(&self) -> usize {
        self.claimed.store(true, Ordering::Release);
        self.connected()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct ClientSession {
    id: u64,
    receiver: broadcast::Receiver<ClientMessage>,
    claimed: Arc<AtomicBool>,
}

impl ClientSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the hub has claimed this session. The interceptor serves every
    /// request regardless; this only reports the claim to the client.
    pub fn is_controlled(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Next message, or `None` once the hub is gone. Lagged messages are
    /// skipped; a reload that is missed is superseded by the next one.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(client = self.id, skipped, "Client session lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for a pending message.
    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
