//! # Session Layer
//!
//! Durable per-browser state. The [`store::SessionStore`] owns every session's
//! data (authenticated profiles keyed by client name, pending indirect flows,
//! free-form attributes) behind a concurrent map; the
//! [`context::SessionContext`] is the per-request handle that every pipeline
//! call receives; code never touches a process-wide session table directly.

pub mod context;
pub mod store;

pub use context::SessionContext;
pub use store::{PendingAuthRequest, SessionId, SessionStore};
