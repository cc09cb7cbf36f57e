//! Liveness/pause policy consulted by the orchestrator between batches.
//!
//! Pause/resume is driven externally (the pause/resume endpoints flip
//! `generation_paused`); this policy only reads the flags and enforces a
//! timeout so a paused job cannot hold remote-API capacity indefinitely.

use tokio::time::{sleep, Duration};

use super::{Session, SessionRegistry};

/// Continuous pause longer than this aborts the run.
pub const PAUSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Poll interval while waiting for a paused run to resume.
pub const RESUME_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Whether a run should abort: the session is gone, or it has been paused
/// continuously for longer than [`PAUSE_TIMEOUT`].
pub fn should_stop(session: Option<&Session>) -> bool {
    let Some(session) = session else {
        return true;
    };
    if !session.generation_active {
        return false;
    }
    match (session.generation_paused, session.pause_started_at) {
        (true, Some(started)) => started.elapsed() > PAUSE_TIMEOUT,
        _ => false,
    }
}

impl SessionRegistry {
    /// Policy check: should the session's run abort at this checkpoint?
    pub async fn should_stop(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        should_stop(sessions.get(session_id))
    }

    /// Direct read of the session's pause flag.
    pub async fn is_paused(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| s.generation_paused)
            .unwrap_or(false)
    }

    /// Cooperatively wait until the session is gone, no longer paused, no
    /// longer active, or its pause has exceeded [`PAUSE_TIMEOUT`]. Polls at
    /// [`RESUME_POLL_INTERVAL`]; other sessions' runs are unaffected.
    pub async fn wait_for_resume(&self, session_id: &str) {
        loop {
            {
                let sessions = self.sessions.read().await;
                let Some(session) = sessions.get(session_id) else {
                    return;
                };
                if !session.generation_active || !session.generation_paused {
                    return;
                }
                if should_stop(Some(session)) {
                    // Pause expired; the caller's next should_stop aborts.
                    return;
                }
            }
            sleep(RESUME_POLL_INTERVAL).await;
        }
    }
}
