//! Native dialer launch with a generic fallback mechanism

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{DialerError, Result};

/// Something that can hand a number to the phone's dialer.
///
/// Launching is fire-and-forget: `Ok(true)` only means the dialer was
/// opened. Whether a call happened is reported later by the native bridge.
#[async_trait]
pub trait DialerLauncher: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Open the dialer for `phone_number`.
    ///
    /// Returns [`DialerError::BridgeUnavailable`] when the mechanism does not
    /// exist on this platform.
    async fn launch(&self, phone_number: &str) -> Result<bool>;
}

/// Launch through the native plugin when present, otherwise (or when it
/// fails) through the generic mechanism, which gets `retries` extra attempts.
pub async fn launch_with_fallback(
    native: Option<&Arc<dyn DialerLauncher>>,
    generic: &Arc<dyn DialerLauncher>,
    retries: u32,
    phone_number: &str,
) -> Result<()> {
    if let Some(native) = native {
        match native.launch(phone_number).await {
            Ok(true) => {
                info!(launcher = native.name(), phone = %phone_number, "dialer launched");
                return Ok(());
            }
            Ok(false) => warn!(launcher = native.name(), "native launcher refused, using generic dialer"),
            Err(DialerError::BridgeUnavailable(reason)) => {
                debug!(launcher = native.name(), %reason, "native bridge unavailable, using generic dialer")
            }
            Err(e) => warn!(launcher = native.name(), "native launch failed, using generic dialer: {}", e),
        }
    }

    let mut last_failure = String::from("launcher refused");
    for attempt in 0..=retries {
        match generic.launch(phone_number).await {
            Ok(true) => {
                info!(launcher = generic.name(), phone = %phone_number, attempt, "dialer launched");
                return Ok(());
            }
            Ok(false) => last_failure = String::from("launcher refused"),
            Err(e) => last_failure = e.to_string(),
        }
        warn!(launcher = generic.name(), attempt, "dialer launch attempt failed: {}", last_failure);
    }

    Err(DialerError::LaunchFailed {
        phone: phone_number.to_string(),
        reason: last_failure,
    })
}
