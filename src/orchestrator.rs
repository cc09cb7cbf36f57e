//! Generation orchestrator: drives one end-to-end run per session.
//!
//! A run creates contacts, creates companies, links them 1:1 at random,
//! fetches the resulting records, and emits a terminal `complete` event to
//! the originating session. The registry is consulted before and between
//! every batch to decide whether to continue, pause, or abort.
//!
//! Cancellation is advisory between batches, not preemptive within one: a
//! disconnect aborts the run task at its next await point, so a remote call
//! already in flight completes before the cancellation takes effect.

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

use crate::error::ApiError;
use crate::events::{ProgressEmitter, ProgressEvent};
use crate::generator;
use crate::models::{Company, Contact, GenerationSummary};
use crate::remote::{BatchClient, EntityKind, EntityRecord, LinkPair, MAX_BATCH_SIZE};
use crate::session::{SessionRegistry, StartDecision};

/// Fixed pause between create/link batches, to respect remote rate limits.
pub const INTER_BATCH_DELAY: Duration = Duration::from_millis(200);

/// Shorter pause between read-only fetch batches.
pub const FETCH_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Synchronous outcome of a generation request.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run executed to completion.
    Completed(GenerationSummary),
    /// A run was already active for this session; no second run started.
    AlreadyRunning { session_id: String },
}

/// Drives generation runs against the registry and the remote batch client.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    registry: SessionRegistry,
    client: Arc<dyn BatchClient>,
    contact_count: usize,
    company_count: usize,
}

impl GenerationOrchestrator {
    pub fn new(
        registry: SessionRegistry,
        client: Arc<dyn BatchClient>,
        contact_count: usize,
        company_count: usize,
    ) -> Self {
        Self {
            registry,
            client,
            contact_count,
            company_count,
        }
    }

    /// Run one generation for the session, per the request contract:
    ///
    /// 1. `InvalidRequest` if the session id is empty or unknown.
    /// 2. `Conflict` if the session's run is currently paused.
    /// 3. `AlreadyRunning` (not an error) if a run is active and not paused.
    /// 4. Otherwise execute the run as a spawned task whose abort handle is
    ///    stored in the session, and await its outcome.
    pub async fn run(&self, session_id: &str) -> Result<RunOutcome, ApiError> {
        if session_id.is_empty() {
            return Err(ApiError::InvalidRequest("session ID required".into()));
        }
        match self.registry.try_start_generation(session_id).await? {
            StartDecision::Paused => return Err(ApiError::Conflict),
            StartDecision::AlreadyRunning => {
                info!(session = %session_id, "Generation already running for this session");
                return Ok(RunOutcome::AlreadyRunning {
                    session_id: session_id.to_string(),
                });
            }
            StartDecision::Started => {}
        }

        let task = tokio::spawn(run_job(
            self.registry.clone(),
            Arc::clone(&self.client),
            session_id.to_string(),
            self.contact_count,
            self.company_count,
        ));
        self.registry
            .set_generation_task(session_id, task.abort_handle())
            .await;

        match task.await {
            Ok(result) => result.map(RunOutcome::Completed),
            // Aborted via the session's task handle (disconnect or stop).
            Err(join_err) if join_err.is_cancelled() => Err(ApiError::SessionInactive),
            Err(join_err) => {
                self.registry.finish_generation(session_id).await;
                Err(ApiError::Internal(format!(
                    "generation task panicked: {}",
                    join_err
                )))
            }
        }
    }
}

/// The spawned run task: executes the phases, then cleans up session flags
/// on every exit path. Terminal cleanup uses `finish_generation` (no abort)
/// because this task is the one finishing.
async fn run_job(
    registry: SessionRegistry,
    client: Arc<dyn BatchClient>,
    session_id: String,
    contact_count: usize,
    company_count: usize,
) -> Result<GenerationSummary, ApiError> {
    let emitter = ProgressEmitter::new(registry.clone(), session_id.clone());
    let result = execute(
        &registry,
        client.as_ref(),
        &emitter,
        &session_id,
        contact_count,
        company_count,
    )
    .await;

    registry.finish_generation(&session_id).await;

    if let Err(err) = &result {
        match err {
            // Abort path: the session is gone or its pause expired; there is
            // nobody to deliver an error event to.
            ApiError::SessionInactive => {
                info!(session = %session_id, "Generation aborted - session inactive");
            }
            _ => {
                error!(session = %session_id, error = %err, "Generation failed");
                emitter
                    .emit(ProgressEvent::Error {
                        message: format!("Failed to create test data: {}", err),
                    })
                    .await;
            }
        }
    }

    result
}

/// The generation phases. Returns early with `SessionInactive` at any
/// checkpoint where the liveness policy says to abort.
async fn execute(
    registry: &SessionRegistry,
    client: &dyn BatchClient,
    emitter: &ProgressEmitter,
    session_id: &str,
    contact_count: usize,
    company_count: usize,
) -> Result<GenerationSummary, ApiError> {
    info!(
        session = %session_id,
        contacts = contact_count,
        companies = company_count,
        "Starting test data generation"
    );
    emitter
        .emit(ProgressEvent::Start {
            contacts_total: contact_count,
            companies_total: company_count,
        })
        .await;

    // Phase a: contacts.
    let contact_ids = create_entities(
        registry,
        client,
        emitter,
        session_id,
        EntityKind::Contact,
        contact_count,
    )
    .await?;
    emitter
        .emit(ProgressEvent::ContactsComplete {
            created: contact_ids.len(),
        })
        .await;

    // Phase b: companies.
    let company_ids = create_entities(
        registry,
        client,
        emitter,
        session_id,
        EntityKind::Company,
        company_count,
    )
    .await?;
    emitter
        .emit(ProgressEvent::CompaniesComplete {
            created: company_ids.len(),
        })
        .await;

    // Phase c: random 1:1 pairing.
    let pairs = one_to_one_pairs(&contact_ids, &company_ids);

    // Phase d: linking.
    let total_pairs = pairs.len();
    let mut successful_links = 0;
    for chunk in pairs.chunks(MAX_BATCH_SIZE) {
        checkpoint(registry, session_id).await?;
        let confirmed = client.link_batch(chunk).await?;
        successful_links += confirmed.len();
        emitter
            .emit(ProgressEvent::LinkProgress {
                linked: successful_links,
                total: total_pairs,
            })
            .await;
        sleep(INTER_BATCH_DELAY).await;
    }
    emitter
        .emit(ProgressEvent::LinksComplete {
            linked: successful_links,
        })
        .await;

    // Phase e: fetch both entity types and assemble the result graph.
    let company_records = fetch_records(client, EntityKind::Company, &company_ids).await?;
    let contact_records = fetch_records(client, EntityKind::Contact, &contact_ids).await?;
    let (companies, unlinked_contacts) = assemble_graph(company_records, contact_records);

    info!(
        session = %session_id,
        contacts_created = contact_ids.len(),
        companies_created = company_ids.len(),
        successful_links,
        "Generation finished"
    );

    // Phase f: terminal event to the originating session only.
    emitter
        .emit(ProgressEvent::Complete {
            message: "Done! Random linking complete".to_string(),
            companies,
            unlinked_contacts,
        })
        .await;

    Ok(GenerationSummary {
        message: "Test data created successfully".to_string(),
        contacts_created: contact_ids.len(),
        companies_created: company_ids.len(),
        successful_links,
    })
}

/// Per-batch liveness checkpoint: abort if the policy says stop, block while
/// paused, and re-check after the wait (the pause may have expired).
async fn checkpoint(registry: &SessionRegistry, session_id: &str) -> Result<(), ApiError> {
    if registry.should_stop(session_id).await {
        return Err(ApiError::SessionInactive);
    }
    if registry.is_paused(session_id).await {
        info!(session = %session_id, "Generation paused - waiting for resume");
        registry.wait_for_resume(session_id).await;
        if registry.should_stop(session_id).await {
            return Err(ApiError::SessionInactive);
        }
    }
    Ok(())
}

/// Create `total` entities of one kind in batches of at most
/// [`MAX_BATCH_SIZE`], skipping per-item failures silently.
async fn create_entities(
    registry: &SessionRegistry,
    client: &dyn BatchClient,
    emitter: &ProgressEmitter,
    session_id: &str,
    kind: EntityKind,
    total: usize,
) -> Result<Vec<i64>, ApiError> {
    let mut ids = Vec::with_capacity(total);
    let mut attempted = 0;
    while attempted < total {
        checkpoint(registry, session_id).await?;

        let count = MAX_BATCH_SIZE.min(total - attempted);
        let items = build_payloads(kind, count);
        let results = client.create_batch(kind, items).await?;
        ids.extend(results.into_iter().flatten());
        attempted += count;

        info!(
            session = %session_id,
            kind = kind.as_str(),
            attempted,
            created = ids.len(),
            total,
            "Created entity batch"
        );
        emitter
            .emit(match kind {
                EntityKind::Contact => ProgressEvent::ContactProgress {
                    created: ids.len(),
                    total,
                },
                EntityKind::Company => ProgressEvent::CompanyProgress {
                    created: ids.len(),
                    total,
                },
            })
            .await;

        sleep(INTER_BATCH_DELAY).await;
    }
    Ok(ids)
}

/// Synthesize `count` create payloads. The rng is scoped so it never lives
/// across an await.
fn build_payloads(kind: EntityKind, count: usize) -> Vec<Value> {
    let mut rng = rand::thread_rng();
    match kind {
        EntityKind::Contact => generator::batch_payloads(&mut rng, count, generator::contact_payload),
        EntityKind::Company => generator::batch_payloads(&mut rng, count, generator::company_payload),
    }
}

/// Random 1:1 matching between the two id sets: both lists are shuffled
/// independently, then zipped. Size is `min(|contacts|, |companies|)`; each
/// id appears in at most one pair.
pub fn one_to_one_pairs(contact_ids: &[i64], company_ids: &[i64]) -> Vec<LinkPair> {
    let mut contacts = contact_ids.to_vec();
    let mut companies = company_ids.to_vec();
    let mut rng = rand::thread_rng();
    contacts.shuffle(&mut rng);
    companies.shuffle(&mut rng);
    contacts.into_iter().zip(companies).collect()
}

/// Fetch full records for `ids` in batches of at most [`MAX_BATCH_SIZE`].
async fn fetch_records(
    client: &dyn BatchClient,
    kind: EntityKind,
    ids: &[i64],
) -> Result<HashMap<i64, EntityRecord>, ApiError> {
    let mut records = HashMap::new();
    for chunk in ids.chunks(MAX_BATCH_SIZE) {
        records.extend(client.fetch_batch(kind, chunk).await?);
        sleep(FETCH_BATCH_DELAY).await;
    }
    Ok(records)
}

fn record_to_contact(record: &EntityRecord) -> Contact {
    Contact {
        id: record.id,
        name: record.name.clone().unwrap_or_default(),
        last_name: record.last_name.clone().unwrap_or_default(),
        phone: record.phone.clone(),
        email: record.email.clone(),
        post: record.post.clone(),
        // The remote reports 0 for "no company".
        company_id: record.company_id.filter(|&id| id != 0),
    }
}

/// Group fetched contacts under their linked company. Companies with no
/// contact and contacts with no company both appear standalone.
pub fn assemble_graph(
    company_records: HashMap<i64, EntityRecord>,
    contact_records: HashMap<i64, EntityRecord>,
) -> (Vec<Company>, Vec<Contact>) {
    let mut companies: Vec<Company> = company_records
        .values()
        .map(|record| Company {
            id: record.id,
            title: record.title.clone().unwrap_or_default(),
            phone: record.phone.clone(),
            email: record.email.clone(),
            contacts: Vec::new(),
        })
        .collect();
    companies.sort_by_key(|c| c.id);

    let index_by_id: HashMap<i64, usize> = companies
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id, i))
        .collect();

    let mut contacts: Vec<Contact> = contact_records.values().map(record_to_contact).collect();
    contacts.sort_by_key(|c| c.id);

    let mut unlinked = Vec::new();
    for contact in contacts {
        match contact.company_id.and_then(|id| index_by_id.get(&id)) {
            Some(&idx) => companies[idx].contacts.push(contact),
            None => unlinked.push(contact),
        }
    }
    (companies, unlinked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_pairing_size_is_min_of_inputs() {
        let contacts: Vec<i64> = (1..=5).collect();
        let companies: Vec<i64> = (10..=12).collect();
        assert_eq!(one_to_one_pairs(&contacts, &companies).len(), 3);
        assert_eq!(one_to_one_pairs(&companies, &contacts).len(), 3);
        assert_eq!(one_to_one_pairs(&[], &companies).len(), 0);
        assert_eq!(one_to_one_pairs(&contacts, &[]).len(), 0);
        assert_eq!(one_to_one_pairs(&[], &[]).len(), 0);
    }

    #[test]
    fn test_pairing_uses_each_id_at_most_once() {
        let contacts: Vec<i64> = (1..=50).collect();
        let companies: Vec<i64> = (100..=140).collect();
        let pairs = one_to_one_pairs(&contacts, &companies);

        let contact_ids: HashSet<i64> = pairs.iter().map(|p| p.0).collect();
        let company_ids: HashSet<i64> = pairs.iter().map(|p| p.1).collect();
        assert_eq!(contact_ids.len(), pairs.len());
        assert_eq!(company_ids.len(), pairs.len());
        assert!(contact_ids.iter().all(|id| contacts.contains(id)));
        assert!(company_ids.iter().all(|id| companies.contains(id)));
    }

    #[test]
    fn test_assemble_graph_groups_by_link() {
        let mut company_records = HashMap::new();
        company_records.insert(
            10,
            EntityRecord {
                id: 10,
                title: Some("Acme".into()),
                ..Default::default()
            },
        );
        company_records.insert(
            11,
            EntityRecord {
                id: 11,
                title: Some("Globex".into()),
                ..Default::default()
            },
        );

        let mut contact_records = HashMap::new();
        contact_records.insert(
            1,
            EntityRecord {
                id: 1,
                name: Some("Anna".into()),
                company_id: Some(10),
                ..Default::default()
            },
        );
        contact_records.insert(
            2,
            EntityRecord {
                id: 2,
                name: Some("Boris".into()),
                company_id: Some(0),
                ..Default::default()
            },
        );

        let (companies, unlinked) = assemble_graph(company_records, contact_records);
        assert_eq!(companies.len(), 2);
        let acme = companies.iter().find(|c| c.id == 10).unwrap();
        assert_eq!(acme.contacts.len(), 1);
        assert_eq!(acme.contacts[0].name, "Anna");
        let globex = companies.iter().find(|c| c.id == 11).unwrap();
        assert!(globex.contacts.is_empty());
        assert_eq!(unlinked.len(), 1);
        assert_eq!(unlinked[0].id, 2);
        assert_eq!(unlinked[0].company_id, None);
    }

    #[test]
    fn test_assemble_graph_empty_inputs() {
        let (companies, unlinked) = assemble_graph(HashMap::new(), HashMap::new());
        assert!(companies.is_empty());
        assert!(unlinked.is_empty());
    }
}
