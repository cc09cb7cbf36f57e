//! Progress events pushed to clients over the WebSocket channel.
//!
//! The event set is a closed tagged enum: one variant per wire `type`, each
//! with its own payload. Events for a session are produced by a single
//! orchestrator task, so per-session ordering falls out of the channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Company, Contact};
use crate::session::SessionRegistry;

/// Progress event payloads, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A generation run started.
    Start {
        contacts_total: usize,
        companies_total: usize,
    },

    /// Contacts created so far.
    ContactProgress { created: usize, total: usize },

    /// Contact creation phase finished.
    ContactsComplete { created: usize },

    /// Companies created so far.
    CompanyProgress { created: usize, total: usize },

    /// Company creation phase finished.
    CompaniesComplete { created: usize },

    /// Link updates confirmed so far.
    LinkProgress { linked: usize, total: usize },

    /// Linking phase finished.
    LinksComplete { linked: usize },

    /// Terminal success: the assembled result graph. Companies carry their
    /// linked contact; contacts left unmatched by the pairing are reported
    /// standalone.
    Complete {
        message: String,
        companies: Vec<Company>,
        unlinked_contacts: Vec<Contact>,
    },

    /// Terminal failure with a human-readable description.
    Error { message: String },
}

/// Wire envelope: the tagged event plus a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(flatten)]
    pub event: ProgressEvent,
    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(event: ProgressEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}

/// Delivers progress events to one session's channel.
///
/// Delivery is best-effort: a send failure is treated as a disconnect by the
/// registry and never propagates into the orchestrator.
#[derive(Clone)]
pub struct ProgressEmitter {
    registry: SessionRegistry,
    session_id: String,
}

impl ProgressEmitter {
    pub fn new(registry: SessionRegistry, session_id: impl Into<String>) -> Self {
        Self {
            registry,
            session_id: session_id.into(),
        }
    }

    /// Serialize and push one event to the bound session.
    pub async fn emit(&self, event: ProgressEvent) {
        match serde_json::to_string(&OutboundMessage::new(event)) {
            Ok(text) => self.registry.send_to_session(&self.session_id, text).await,
            Err(e) => warn!(session = %self.session_id, error = %e, "Failed to serialize progress event"),
        }
    }

    /// Legacy broadcast mode: deliver one event to every connected channel.
    pub async fn broadcast(&self, event: ProgressEvent) {
        match serde_json::to_string(&OutboundMessage::new(event)) {
            Ok(text) => self.registry.broadcast(text).await,
            Err(e) => warn!(error = %e, "Failed to serialize broadcast event"),
        }
    }
}
