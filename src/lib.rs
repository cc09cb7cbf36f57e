//! Session-scoped bulk generation of synthetic CRM records.
//!
//! The service creates contacts and companies against a remote rate-limited
//! batch API, links them 1:1 at random, and streams progress to connected
//! clients over WebSockets. Each client session owns at most one generation
//! run; pause/resume and abort decisions are driven by channel liveness.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod generator;
pub mod models;
pub mod orchestrator;
pub mod remote;
pub mod session;
