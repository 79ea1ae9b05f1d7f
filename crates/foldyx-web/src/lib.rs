//! Web GUI for Foldyx
//! Provides:
//!   - A per-session sequence editor with example presets
//!   - Job YAML preview
//!   - Run launch with a live, cancellable log over SSE
//!   - Structure viewer, confidence / affinity summaries and downloads

pub mod router;
pub mod handlers;
pub mod state;
pub mod sse;
pub mod error;
