//! Holder for the one outgoing call awaiting confirmation.
//!
//! The pending session has to outlive the app being backgrounded while the
//! native dialer owns the screen, so production builds use the SQLite store.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{LeadId, PendingCallSession};

pub use memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;

/// Single-slot storage for the in-flight outgoing call
#[async_trait]
pub trait PendingSessionStore: Send + Sync {
    /// Record a new outgoing call, replacing whatever was pending
    async fn begin(&self, phone_number: &str, lead_id: Option<LeadId>) -> Result<PendingCallSession>;

    /// Current pending call, if any
    async fn peek(&self) -> Result<Option<PendingCallSession>>;

    /// Forget the pending call
    async fn clear(&self) -> Result<()>;
}
