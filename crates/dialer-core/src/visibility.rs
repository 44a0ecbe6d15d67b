//! Foreground/background tracking for the hosting app.
//!
//! While the native dialer covers the app the fallback countdown is paused;
//! when the user comes back it restarts from the full delay, so elapsed
//! background time is never carried over.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Visibility state reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppVisibility {
    Foreground,
    Background,
}

/// What the engine should do with the fallback timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityAction {
    /// Re-arm with the full delay if a call is still pending
    Rearm,
    /// Cancel the running countdown
    Suspend,
    /// No transition happened
    None,
}

/// Turns raw visibility reports into transitions
#[derive(Debug, Clone)]
pub struct VisibilityWatcher {
    current: AppVisibility,
}

impl Default for VisibilityWatcher {
    fn default() -> Self {
        Self::new(AppVisibility::Foreground)
    }
}

impl VisibilityWatcher {
    pub fn new(initial: AppVisibility) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> AppVisibility {
        self.current
    }

    /// Record a visibility report and return the action for the timer.
    /// Repeated reports of the same state are not transitions.
    pub fn observe(&mut self, visibility: AppVisibility) -> VisibilityAction {
        if visibility == self.current {
            return VisibilityAction::None;
        }
        debug!(from = ?self.current, to = ?visibility, "app visibility changed");
        self.current = visibility;
        match visibility {
            AppVisibility::Foreground => VisibilityAction::Rearm,
            AppVisibility::Background => VisibilityAction::Suspend,
        }
    }
}
