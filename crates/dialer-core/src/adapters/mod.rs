//! Seams to the platform: dialer launch, lead lookup, call-log permission

pub mod launcher;
pub mod leads;
pub mod permission;

pub use launcher::{launch_with_fallback, DialerLauncher};
pub use leads::{LeadDirectory, StaticLeadDirectory};
pub use permission::{AlwaysGranted, PermissionGate};
