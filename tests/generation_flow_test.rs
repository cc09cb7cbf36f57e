//! End-to-end generation flow tests against a mock batch client.
//!
//! Time-sensitive tests run with a paused tokio clock, so the inter-batch
//! delays and the 15-second pause timeout elapse instantly.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::time::{sleep, timeout, Duration};

use crm_seeder::error::{ApiError, RemoteError};
use crm_seeder::orchestrator::{GenerationOrchestrator, RunOutcome};
use crm_seeder::remote::{BatchClient, EntityKind, EntityRecord, LinkPair};
use crm_seeder::session::SessionRegistry;

/// Scriptable in-memory batch client.
#[derive(Default)]
struct MockBatchClient {
    /// Every create call as `(kind, item count)`, in order.
    create_sizes: Mutex<Vec<(EntityKind, usize)>>,
    /// Confirmed links, contact id -> company id.
    links: Mutex<HashMap<i64, i64>>,
    next_id: AtomicI64,
    /// Remote accepts the call but rejects every item.
    reject_company_items: bool,
    /// `link_batch` fails wholesale (run-level failure).
    fail_link_calls: bool,
    /// When set, `create_batch` waits for a permit before returning.
    gate: Option<Arc<Semaphore>>,
}

impl MockBatchClient {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }
}

#[async_trait]
impl BatchClient for MockBatchClient {
    async fn create_batch(
        &self,
        kind: EntityKind,
        items: Vec<Value>,
    ) -> Result<Vec<Option<i64>>, RemoteError> {
        self.create_sizes.lock().await.push((kind, items.len()));
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if kind == EntityKind::Company && self.reject_company_items {
            return Ok(vec![None; items.len()]);
        }
        Ok(items
            .iter()
            .map(|_| Some(self.next_id.fetch_add(1, Ordering::SeqCst)))
            .collect())
    }

    async fn link_batch(&self, pairs: &[LinkPair]) -> Result<HashSet<LinkPair>, RemoteError> {
        if self.fail_link_calls {
            return Err(RemoteError::Api("link batch failed".into()));
        }
        let mut links = self.links.lock().await;
        for (contact_id, company_id) in pairs {
            links.insert(*contact_id, *company_id);
        }
        Ok(pairs.iter().copied().collect())
    }

    async fn fetch_batch(
        &self,
        kind: EntityKind,
        ids: &[i64],
    ) -> Result<HashMap<i64, EntityRecord>, RemoteError> {
        let links = self.links.lock().await;
        let mut records = HashMap::new();
        for &id in ids {
            let record = match kind {
                EntityKind::Company => EntityRecord {
                    id,
                    title: Some(format!("Company {}", id)),
                    ..Default::default()
                },
                EntityKind::Contact => EntityRecord {
                    id,
                    name: Some(format!("Name{}", id)),
                    last_name: Some(format!("Surname{}", id)),
                    company_id: links.get(&id).copied(),
                    ..Default::default()
                },
            };
            records.insert(id, record);
        }
        Ok(records)
    }
}

const SESSION: &str = "test-session-1";

async fn setup(
    client: Arc<MockBatchClient>,
    contacts: usize,
    companies: usize,
) -> (
    SessionRegistry,
    GenerationOrchestrator,
    mpsc::UnboundedReceiver<String>,
) {
    let registry = SessionRegistry::new();
    let (tx, rx) = mpsc::unbounded_channel();
    registry.connect_with_session_id(tx, SESSION).await;
    let orchestrator =
        GenerationOrchestrator::new(registry.clone(), client, contacts, companies);
    (registry, orchestrator, rx)
}

/// Drain all buffered events from the channel as parsed JSON.
fn drain_events(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(text) = rx.try_recv() {
        events.push(serde_json::from_str(&text).expect("event is valid JSON"));
    }
    events
}

fn event_types(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|e| e["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

async fn wait_until_active(registry: &SessionRegistry, session_id: &str) {
    loop {
        if let Some((true, _)) = registry.generation_flags(session_id).await {
            return;
        }
        sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_three_by_three() {
    let client = Arc::new(MockBatchClient::new());
    let (registry, orchestrator, mut rx) = setup(client, 3, 3).await;

    let outcome = orchestrator.run(SESSION).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(summary.contacts_created, 3);
    assert_eq!(summary.companies_created, 3);
    assert_eq!(summary.successful_links, 3);

    let events = drain_events(&mut rx);
    let types = event_types(&events);
    assert_eq!(types.first().map(String::as_str), Some("start"));
    assert_eq!(types.last().map(String::as_str), Some("complete"));

    // Phases are reported in orchestrator order.
    let pos = |t: &str| types.iter().position(|x| x == t).unwrap();
    assert!(pos("contact_progress") < pos("company_progress"));
    assert!(pos("company_progress") < pos("link_progress"));
    assert!(pos("link_progress") < pos("complete"));

    // The result graph has 3 companies, each with exactly one linked contact.
    let complete = events.last().unwrap();
    let companies = complete["companies"].as_array().unwrap();
    assert_eq!(companies.len(), 3);
    for company in companies {
        assert_eq!(company["contacts"].as_array().unwrap().len(), 1);
    }
    assert!(complete["unlinked_contacts"].as_array().unwrap().is_empty());

    // Flags are reset after the terminal outcome.
    let status = registry.session_generation_status(SESSION).await.unwrap();
    assert!(!status.generation_active);
    assert!(!status.generation_paused);
}

#[tokio::test(start_paused = true)]
async fn test_batch_slicing_never_exceeds_ceiling() {
    let client = Arc::new(MockBatchClient::new());
    let (_registry, orchestrator, _rx) = setup(Arc::clone(&client), 45, 0).await;

    let outcome = orchestrator.run(SESSION).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(summary.contacts_created, 45);
    assert_eq!(summary.successful_links, 0);

    let sizes = client.create_sizes.lock().await;
    let contact_sizes: Vec<usize> = sizes
        .iter()
        .filter(|(kind, _)| *kind == EntityKind::Contact)
        .map(|(_, n)| *n)
        .collect();
    assert_eq!(contact_sizes, vec![20, 20, 5]);
    assert!(sizes.iter().all(|(_, n)| *n <= 20));
}

#[tokio::test(start_paused = true)]
async fn test_company_creation_rejected_still_completes() {
    let client = Arc::new(MockBatchClient {
        reject_company_items: true,
        ..MockBatchClient::new()
    });
    let (_registry, orchestrator, mut rx) = setup(client, 3, 3).await;

    let outcome = orchestrator.run(SESSION).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(summary.contacts_created, 3);
    assert_eq!(summary.companies_created, 0);
    assert_eq!(summary.successful_links, 0);

    let events = drain_events(&mut rx);
    let complete = events.last().unwrap();
    assert_eq!(complete["type"], "complete");
    assert!(complete["companies"].as_array().unwrap().is_empty());
    // The created contacts are still reported, just unlinked.
    assert_eq!(complete["unlinked_contacts"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_empty_and_unknown_session_rejected() {
    let client = Arc::new(MockBatchClient::new());
    let (_registry, orchestrator, _rx) = setup(client, 3, 3).await;

    assert!(matches!(
        orchestrator.run("").await,
        Err(ApiError::InvalidRequest(_))
    ));
    assert!(matches!(
        orchestrator.run("no-such-session").await,
        Err(ApiError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_paused_session_conflicts() {
    let client = Arc::new(MockBatchClient::new());
    let (registry, orchestrator, _rx) = setup(client, 3, 3).await;

    registry.start_generation(SESSION).await.unwrap();
    registry.pause_generation(SESSION).await;

    assert!(matches!(
        orchestrator.run(SESSION).await,
        Err(ApiError::Conflict)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_second_start_reports_already_running() {
    let gate = Arc::new(Semaphore::new(0));
    let client = Arc::new(MockBatchClient {
        gate: Some(Arc::clone(&gate)),
        ..MockBatchClient::new()
    });
    let (registry, orchestrator, _rx) = setup(Arc::clone(&client), 3, 3).await;

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(SESSION).await })
    };
    wait_until_active(&registry, SESSION).await;

    let second = orchestrator.run(SESSION).await.unwrap();
    assert!(matches!(second, RunOutcome::AlreadyRunning { .. }));

    // Unblock the first run and let it finish.
    gate.add_permits(100);
    let outcome = timeout(Duration::from_secs(60), first)
        .await
        .expect("first run should finish")
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    // Exactly one run's worth of create calls: no second task was spawned.
    assert_eq!(client.create_sizes.lock().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pause_timeout_aborts_run() {
    let client = Arc::new(MockBatchClient::new());
    let (registry, orchestrator, mut rx) = setup(client, 45, 45).await;

    let run = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(SESSION).await })
    };
    wait_until_active(&registry, SESSION).await;
    registry.pause_generation(SESSION).await;

    sleep(Duration::from_secs(16)).await;

    let result = timeout(Duration::from_secs(60), run)
        .await
        .expect("run should abort after the pause expires")
        .unwrap();
    assert!(matches!(result, Err(ApiError::SessionInactive)));

    // Flags are reset; no error event is pushed on the abort path.
    let status = registry.session_generation_status(SESSION).await.unwrap();
    assert!(!status.generation_active);
    assert!(!status.generation_paused);
    let types = event_types(&drain_events(&mut rx));
    assert!(!types.iter().any(|t| t == "error"));
    assert!(!types.iter().any(|t| t == "complete"));
}

#[tokio::test(start_paused = true)]
async fn test_pause_then_resume_completes() {
    let client = Arc::new(MockBatchClient::new());
    let (registry, orchestrator, _rx) = setup(client, 45, 0).await;

    let run = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(SESSION).await })
    };
    wait_until_active(&registry, SESSION).await;
    registry.pause_generation(SESSION).await;

    sleep(Duration::from_secs(10)).await;
    registry.resume_generation(SESSION).await;

    let outcome = timeout(Duration::from_secs(60), run)
        .await
        .expect("run should complete after resume")
        .unwrap()
        .unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(summary.contacts_created, 45);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_only_that_session() {
    let registry = SessionRegistry::new();

    // Session one: gated client so its run is mid-flight when we disconnect.
    let gate = Arc::new(Semaphore::new(0));
    let gated_client = Arc::new(MockBatchClient {
        gate: Some(gate),
        ..MockBatchClient::new()
    });
    let (tx1, _rx1) = mpsc::unbounded_channel();
    registry.connect_with_session_id(tx1.clone(), "s1").await;
    let orch1 = GenerationOrchestrator::new(registry.clone(), gated_client, 3, 3);

    // Session two: independent run against a normal client.
    let (tx2, _rx2) = mpsc::unbounded_channel();
    registry.connect_with_session_id(tx2, "s2").await;
    let orch2 =
        GenerationOrchestrator::new(registry.clone(), Arc::new(MockBatchClient::new()), 3, 3);

    let run1 = tokio::spawn(async move { orch1.run("s1").await });
    wait_until_active(&registry, "s1").await;

    let run2 = tokio::spawn(async move { orch2.run("s2").await });
    wait_until_active(&registry, "s2").await;

    registry.disconnect(&tx1).await;

    let result1 = timeout(Duration::from_secs(60), run1)
        .await
        .expect("cancelled run should return")
        .unwrap();
    assert!(matches!(result1, Err(ApiError::SessionInactive)));
    assert!(!registry.exists("s1").await);

    // The other session's run is unaffected.
    let outcome2 = timeout(Duration::from_secs(60), run2)
        .await
        .expect("second run should finish")
        .unwrap()
        .unwrap();
    assert!(matches!(outcome2, RunOutcome::Completed(_)));
    assert!(registry.exists("s2").await);
    let status = registry.session_generation_status("s2").await.unwrap();
    assert!(!status.generation_active);
}

#[tokio::test(start_paused = true)]
async fn test_link_failure_stops_run_and_reports_error() {
    let client = Arc::new(MockBatchClient {
        fail_link_calls: true,
        ..MockBatchClient::new()
    });
    let (registry, orchestrator, mut rx) = setup(client, 3, 3).await;

    let result = orchestrator.run(SESSION).await;
    assert!(matches!(result, Err(ApiError::Remote(_))));

    // Terminal error event reaches the session, and flags are reset so a
    // subsequent start is not blocked.
    let types = event_types(&drain_events(&mut rx));
    assert_eq!(types.last().map(String::as_str), Some("error"));
    let status = registry.session_generation_status(SESSION).await.unwrap();
    assert!(!status.generation_active);
    assert!(!status.generation_paused);
}
