//! Connection slots: one engine connection and one session per upstream role.
//!
//! A newly accepted connection always replaces the current occupant of its
//! role, and the old connection is closed before the new one is installed.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{HubError, HubResult};

/// Header carrying the client's self-declared role
pub const CLIENT_TYPE_HEADER: &str = "x-client-type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The execution engine that runs forwarded commands
    Engine,
    /// Upstream caller speaking the tool protocol
    ToolInvocation,
    /// Upstream chat/desktop client on the relay path
    SideChannel,
}

impl Role {
    /// Classify a connection from its metadata. Anything unrecognized is
    /// treated as the engine.
    pub fn classify(metadata: &ConnectionMetadata) -> Role {
        let client_type = metadata
            .client_type
            .as_deref()
            .map(|t| t.trim().to_ascii_lowercase());
        match client_type.as_deref() {
            Some("unity") | Some("engine") => return Role::Engine,
            Some("mcp") | Some("desktop") => return Role::SideChannel,
            Some("tools") => return Role::ToolInvocation,
            _ => {}
        }
        match metadata.path.trim_end_matches('/') {
            "/mcp" => Role::SideChannel,
            "/tools" => Role::ToolInvocation,
            _ => Role::Engine,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Engine => "engine",
            Role::ToolInvocation => "tool-invocation",
            Role::SideChannel => "side-channel",
        };
        f.write_str(name)
    }
}

/// What the hub knows about a connection at accept time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMetadata {
    pub client_type: Option<String>,
    pub path: String,
}

impl ConnectionMetadata {
    pub fn new(client_type: Option<&str>, path: &str) -> Self {
        Self {
            client_type: client_type.map(|s| s.to_string()),
            path: path.to_string(),
        }
    }
}

/// Frame queued for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// Sending half of a live connection.
///
/// Frames go through a single unbounded queue, so per-connection send order
/// is arrival order.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    connected_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            connected_at: Utc::now(),
            tx,
        }
    }

    /// Handle plus the receiver a writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn send_text(&self, text: String) -> HubResult<()> {
        self.tx
            .send(OutboundFrame::Text(text))
            .map_err(|_| HubError::NotConnected)
    }

    pub fn close(&self) {
        let _ = self.tx.send(OutboundFrame::Close);
    }
}

/// Owner of every connection slot of one hub instance
#[derive(Debug, Default)]
pub struct ConnectionManager {
    slots: RwLock<HashMap<Role, ConnectionHandle>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify and install a connection, replacing the role's current occupant.
    pub fn accept(&self, metadata: &ConnectionMetadata, handle: ConnectionHandle) -> Role {
        let role = Role::classify(metadata);
        self.install(role, handle);
        role
    }

    /// Install a connection under an explicitly assigned role.
    /// Returns the connection that was replaced, already closed.
    pub fn install(&self, role: Role, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let previous = slots.remove(&role);
        if let Some(previous) = &previous {
            info!(
                "[Hub] Replacing {} connection {} (connected {})",
                role,
                previous.id(),
                previous.connected_at().to_rfc3339()
            );
            previous.close();
        }
        info!("[Hub] {} connected ({})", role, handle.id());
        slots.insert(role, handle);
        previous
    }

    /// Clear the slot if it still holds connection `id`.
    ///
    /// A replaced connection that disconnects late must not evict its successor.
    pub fn release(&self, role: Role, id: Uuid) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        match slots.get(&role) {
            Some(current) if current.id() == id => {
                slots.remove(&role);
                info!("[Hub] {} disconnected ({})", role, id);
                true
            }
            _ => {
                debug!("[Hub] Ignoring disconnect of stale {} connection {}", role, id);
                false
            }
        }
    }

    pub fn current(&self, role: Role) -> Option<ConnectionHandle> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&role)
            .cloned()
    }

    pub fn is_connected(&self, role: Role) -> bool {
        self.current(role).map(|h| h.is_open()).unwrap_or(false)
    }

    /// Send over whatever connection holds the slot right now.
    pub fn send(&self, role: Role, text: String) -> HubResult<()> {
        let handle = self.current(role).ok_or(HubError::NotConnected)?;
        handle.send_text(text)
    }
}
