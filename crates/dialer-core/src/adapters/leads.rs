//! Phone number to lead resolution

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::LeadId;

/// CRM lookup used when a call arrives without session context
#[async_trait]
pub trait LeadDirectory: Send + Sync {
    async fn resolve(&self, phone_number: &str) -> Result<Option<LeadId>>;
}

/// Fixed phone-to-lead table
#[derive(Debug, Clone, Default)]
pub struct StaticLeadDirectory {
    leads: HashMap<String, LeadId>,
}

impl StaticLeadDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lead(mut self, phone_number: &str, lead_id: impl Into<String>) -> Self {
        self.leads.insert(normalize_phone(phone_number), LeadId::new(lead_id));
        self
    }
}

#[async_trait]
impl LeadDirectory for StaticLeadDirectory {
    async fn resolve(&self, phone_number: &str) -> Result<Option<LeadId>> {
        Ok(self.leads.get(&normalize_phone(phone_number)).cloned())
    }
}

/// Keep digits and a leading plus; device logs format numbers inconsistently
pub fn normalize_phone(phone_number: &str) -> String {
    let trimmed = phone_number.trim();
    let mut normalized = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        normalized.push('+');
    }
    normalized.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone(" +1 (555) 010-0 "), "+15550100");
        assert_eq!(normalize_phone("555.0100"), "5550100");
    }

    #[tokio::test]
    async fn test_static_directory() {
        let leads = StaticLeadDirectory::new().with_lead("+1 555 0100", "lead-1");
        assert_eq!(leads.resolve("+15550100").await.unwrap(), Some(LeadId::new("lead-1")));
        assert_eq!(leads.resolve("+15550199").await.unwrap(), None);
    }
}
