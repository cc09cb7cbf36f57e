//! Shared request/response and result-graph types.

use serde::{Deserialize, Serialize};

/// A contact record in the assembled result graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<String>,
    /// Set when the contact was linked to a company during the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,
}

/// A company with its linked contacts (at most one per run, by design of the
/// 1:1 pairing, but the remote API does not enforce that).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

/// Body of `POST /api/create-test-data`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTestDataRequest {
    pub session_id: String,
}

/// Counters reported to the HTTP caller after a successful run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationSummary {
    pub message: String,
    pub contacts_created: usize,
    pub companies_created: usize,
    pub successful_links: usize,
}

/// Global generation status, `GET /api/generation-status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationStatus {
    pub has_connections: bool,
    pub active_sessions: usize,
    pub active_generations: usize,
    pub paused_generations: usize,
}

/// Per-session generation status, `GET /api/generation-status/:session_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionGenerationStatus {
    pub generation_active: bool,
    pub generation_paused: bool,
    pub generation_initiator: bool,
}

/// Session overview, `GET /api/session-info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub active_sessions: usize,
    pub has_connections: bool,
    pub any_active_generation: bool,
}
