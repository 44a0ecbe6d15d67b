//! Call-log read permission

use async_trait::async_trait;

use crate::error::Result;

/// Platform permission check for reading the device call log.
///
/// Without it the native bridge never reports call-log entries and every
/// call ends through the fallback timer.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check(&self) -> Result<bool>;
    async fn request(&self) -> Result<bool>;
}

/// Gate for platforms without a permission model
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionGate for AlwaysGranted {
    async fn check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn request(&self) -> Result<bool> {
        Ok(true)
    }
}
