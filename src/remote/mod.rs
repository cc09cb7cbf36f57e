//! Remote CRM batch client.
//!
//! The orchestrator is agnostic to how batch calls are transported; it talks
//! to the [`BatchClient`] trait. The production implementation
//! ([`http::HttpBatchClient`]) speaks the remote CRM's webhook REST protocol.

pub mod http;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteError;

pub use http::HttpBatchClient;

/// Hard per-call item ceiling dictated by the remote API. Not configurable.
pub const MAX_BATCH_SIZE: usize = 20;

/// Entity kinds the seeder creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Contact,
    Company,
}

impl EntityKind {
    /// Remote CRM numeric entity type identifier.
    pub fn type_id(self) -> u32 {
        match self {
            EntityKind::Contact => 3,
            EntityKind::Company => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Contact => "contact",
            EntityKind::Company => "company",
        }
    }
}

/// A (contact id, company id) link pair.
pub type LinkPair = (i64, i64);

/// A fetched entity record, flattened across both kinds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRecord {
    pub id: i64,
    /// Company title.
    pub title: Option<String>,
    /// Contact first name.
    pub name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Contact job title.
    pub post: Option<String>,
    /// Company the contact is attached to, as reported by the remote.
    pub company_id: Option<i64>,
}

/// Bounded-size batch operations against the remote CRM.
///
/// All methods take at most [`MAX_BATCH_SIZE`] items; callers slice.
/// Per-item failures are reported in-band (a `None` id, a missing pair key,
/// an absent record), not as errors. `Err` means the whole call failed.
#[async_trait]
pub trait BatchClient: Send + Sync {
    /// Create a batch of entities. Returns one entry per requested item:
    /// `Some(id)` on success, `None` if the remote rejected that item.
    async fn create_batch(
        &self,
        kind: EntityKind,
        items: Vec<Value>,
    ) -> Result<Vec<Option<i64>>, RemoteError>;

    /// Set the parent company for each pair. Returns the pairs the remote
    /// confirmed as linked.
    async fn link_batch(&self, pairs: &[LinkPair]) -> Result<HashSet<LinkPair>, RemoteError>;

    /// Fetch full records for the given ids. Ids missing from the result were
    /// not found on the remote.
    async fn fetch_batch(
        &self,
        kind: EntityKind,
        ids: &[i64],
    ) -> Result<HashMap<i64, EntityRecord>, RemoteError>;
}
