//! Session registry: maps session tokens to push channels and generation
//! state.
//!
//! The registry owns the session lifecycle. The map is guarded by a single
//! registry-scoped `RwLock`: status queries take read snapshots, mutation
//! (connect/disconnect/start/stop) takes the write lock. Session counts are
//! small and mutations infrequent relative to status polling.
//!
//! Key properties:
//! - At most one active generation per session.
//! - `generation_paused` implies `generation_active`.
//! - `pause_started_at` is set iff `generation_paused`.
//! - Disconnect cancels the session's in-flight run via its abort handle.

pub mod policy;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{GenerationStatus, SessionGenerationStatus};

/// Outbound half of a push channel. The WebSocket task forwards every frame
/// sent here to the client.
pub type ChannelSender = mpsc::UnboundedSender<String>;

/// Outcome of [`SessionRegistry::try_start_generation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    /// No run was active; this caller now owns one.
    Started,
    /// A run is active and not paused.
    AlreadyRunning,
    /// A run is active but paused; the client must reconnect to resume.
    Paused,
}

/// One client's logical connection plus its generation state.
#[derive(Debug)]
pub struct Session {
    channel: ChannelSender,
    pub generation_active: bool,
    pub generation_paused: bool,
    pub pause_started_at: Option<Instant>,
    pub last_activity: Instant,
    pub generation_initiator: bool,
    task: Option<AbortHandle>,
}

impl Session {
    fn new(channel: ChannelSender) -> Self {
        Self {
            channel,
            generation_active: false,
            generation_paused: false,
            pause_started_at: None,
            last_activity: Instant::now(),
            generation_initiator: false,
            task: None,
        }
    }
}

/// Process-wide map of session id to [`Session`]. Cheap to clone; clones
/// share the underlying map.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel under a new server-generated session id.
    pub async fn connect(&self, channel: ChannelSender) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.connect_with_session_id(channel, &session_id).await;
        session_id
    }

    /// Register a channel under a caller-supplied session id (client
    /// reconnects reuse their known id). Overwrites any prior record.
    pub async fn connect_with_session_id(&self, channel: ChannelSender, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(prior) = sessions.insert(session_id.to_string(), Session::new(channel)) {
            // A rebind cancels whatever the prior binding had in flight.
            if let Some(task) = prior.task {
                if !task.is_finished() {
                    task.abort();
                }
            }
            debug!(session = %short(session_id), "Rebound existing session");
        }
        info!(session = %short(session_id), "Session connected");
    }

    /// Remove every session bound to `channel`, cancelling in-flight runs.
    /// Idempotent: unknown channels are a no-op.
    pub async fn disconnect(&self, channel: &ChannelSender) {
        let mut sessions = self.sessions.write().await;
        let owned: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.channel.same_channel(channel))
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in owned {
            if let Some(session) = sessions.remove(&session_id) {
                if session.generation_active {
                    info!(session = %short(&session_id), "Generation cancelled - client disconnected");
                    if let Some(task) = session.task {
                        if !task.is_finished() {
                            task.abort();
                        }
                    }
                }
                info!(session = %short(&session_id), "Session disconnected");
            }
        }
    }

    /// Atomically decide whether a new run may start, and mark it active if
    /// so. Check and flag-set happen under one write lock, so two concurrent
    /// requests can never both start a run for the same session.
    pub async fn try_start_generation(
        &self,
        session_id: &str,
    ) -> Result<StartDecision, ApiError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ApiError::InvalidRequest("session not found".into()))?;
        if session.generation_active {
            return Ok(if session.generation_paused {
                StartDecision::Paused
            } else {
                StartDecision::AlreadyRunning
            });
        }
        session.generation_active = true;
        session.generation_paused = false;
        session.generation_initiator = true;
        session.pause_started_at = None;
        Ok(StartDecision::Started)
    }

    /// Mark a generation run active for the session. The caller must have
    /// already verified no run is active (see the orchestrator contract).
    pub async fn start_generation(&self, session_id: &str) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ApiError::InvalidRequest("session not found".into()))?;
        session.generation_active = true;
        session.generation_paused = false;
        session.generation_initiator = true;
        session.pause_started_at = None;
        Ok(())
    }

    /// Cancel the session's run (if any) and reset its generation flags.
    /// No-op on unknown sessions.
    pub async fn stop_generation(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            if let Some(task) = session.task.take() {
                if !task.is_finished() {
                    task.abort();
                }
            }
            if session.generation_active {
                info!(session = %short(session_id), "Generation stopped");
            }
            session.generation_active = false;
            session.generation_paused = false;
            session.generation_initiator = false;
            session.pause_started_at = None;
        }
    }

    /// Reset generation flags from inside the run task itself, without
    /// aborting the handle (the task is the one finishing).
    pub async fn finish_generation(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.task = None;
            session.generation_active = false;
            session.generation_paused = false;
            session.generation_initiator = false;
            session.pause_started_at = None;
        }
    }

    /// Attach the abort handle of the in-flight run task.
    pub async fn set_generation_task(&self, session_id: &str, task: AbortHandle) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.task = Some(task);
        }
    }

    /// Pause the session's run. Returns false if there is no active,
    /// unpaused run to pause.
    pub async fn pause_generation(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(s) if s.generation_active && !s.generation_paused => {
                s.generation_paused = true;
                s.pause_started_at = Some(Instant::now());
                info!(session = %short(session_id), "Generation paused");
                true
            }
            _ => false,
        }
    }

    /// Resume a paused run. Returns false if the session has no paused run.
    pub async fn resume_generation(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(s) if s.generation_paused => {
                s.generation_paused = false;
                s.pause_started_at = None;
                info!(session = %short(session_id), "Generation resumed");
                true
            }
            _ => false,
        }
    }

    /// Best-effort delivery to one session. A send failure is treated as a
    /// disconnect and swallowed; delivery never fails into the caller.
    pub async fn send_to_session(&self, session_id: &str, text: String) {
        let channel = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(session) => session.channel.clone(),
                None => return,
            }
        };

        if channel.send(text).is_err() {
            warn!(session = %short(session_id), "Send failed - treating as disconnect");
            self.disconnect(&channel).await;
        } else {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(session_id) {
                session.last_activity = Instant::now();
            }
        }
    }

    /// Deliver to every registered channel. Broken channels are collected and
    /// disconnected afterward; one broken channel never stops the rest.
    pub async fn broadcast(&self, text: String) {
        let channels: Vec<ChannelSender> = {
            let sessions = self.sessions.read().await;
            sessions.values().map(|s| s.channel.clone()).collect()
        };

        let mut broken = Vec::new();
        for channel in channels {
            if channel.send(text.clone()).is_err() {
                broken.push(channel);
            }
        }
        for channel in broken {
            self.disconnect(&channel).await;
        }
    }

    pub async fn exists(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn has_active_connections(&self) -> bool {
        !self.sessions.read().await.is_empty()
    }

    pub async fn has_any_active_generation(&self) -> bool {
        self.sessions
            .read()
            .await
            .values()
            .any(|s| s.generation_active)
    }

    /// Point-in-time `(active, paused)` flags, `None` for unknown sessions.
    pub async fn generation_flags(&self, session_id: &str) -> Option<(bool, bool)> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| (s.generation_active, s.generation_paused))
    }

    /// Global generation status snapshot.
    pub async fn generation_status(&self) -> GenerationStatus {
        let sessions = self.sessions.read().await;
        GenerationStatus {
            has_connections: !sessions.is_empty(),
            active_sessions: sessions.len(),
            active_generations: sessions.values().filter(|s| s.generation_active).count(),
            paused_generations: sessions.values().filter(|s| s.generation_paused).count(),
        }
    }

    /// Per-session generation status, `None` for unknown sessions.
    pub async fn session_generation_status(
        &self,
        session_id: &str,
    ) -> Option<SessionGenerationStatus> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| SessionGenerationStatus {
                generation_active: s.generation_active,
                generation_paused: s.generation_paused,
                generation_initiator: s.generation_initiator,
            })
    }
}

/// Truncated session id for log lines.
fn short(session_id: &str) -> &str {
    session_id.get(..8).unwrap_or(session_id)
}
