//! Process-local pending session store

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::PendingSessionStore;
use crate::error::Result;
use crate::types::{LeadId, PendingCallSession};

/// Pending session kept in memory only; does not survive a process restart
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    slot: RwLock<Option<PendingCallSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingSessionStore for InMemorySessionStore {
    async fn begin(&self, phone_number: &str, lead_id: Option<LeadId>) -> Result<PendingCallSession> {
        let session = PendingCallSession::new(phone_number, lead_id);
        let mut slot = self.slot.write().await;
        if let Some(previous) = slot.replace(session.clone()) {
            warn!(previous = %previous.phone_number, next = %phone_number, "pending call superseded");
        }
        debug!(phone = %phone_number, "pending call recorded");
        Ok(session)
    }

    async fn peek(&self) -> Result<Option<PendingCallSession>> {
        Ok(self.slot.read().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.slot.write().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_peek_clear() {
        let store = InMemorySessionStore::new();
        assert!(store.peek().await.unwrap().is_none());

        let session = store.begin("+15550100", Some(LeadId::new("lead-1"))).await.unwrap();
        assert_eq!(store.peek().await.unwrap(), Some(session));

        store.clear().await.unwrap();
        assert!(store.peek().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_begin_overwrites() {
        let store = InMemorySessionStore::new();
        store.begin("+15550100", None).await.unwrap();
        store.begin("+15550199", Some(LeadId::new("lead-2"))).await.unwrap();

        let current = store.peek().await.unwrap().unwrap();
        assert_eq!(current.phone_number, "+15550199");
        assert_eq!(current.lead_id, Some(LeadId::new("lead-2")));
    }
}
