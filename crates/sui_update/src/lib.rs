//! SUI Update - firmware update workflow for the router admin interface
//!
//! Checks the update server's manifest for this router model, downloads and
//! verifies the firmware image, and launches the flash once the administrator
//! authorizes it.

pub mod artifact;
pub mod claim;
pub mod config;
pub mod error;
pub mod launcher;
pub mod lock;
pub mod manifest;
pub mod memory;
pub mod model;
pub mod outcome;
pub mod reconciler;
pub mod remote;
pub mod upgrade_log;
pub mod version;

pub use claim::{AuthorizationClaim, ClaimInput};
pub use config::UpdateConfig;
pub use error::{DownloadError, FetchError, Severity, UpdateError};
pub use manifest::{Manifest, ManifestIndex, ManifestSummary};
pub use outcome::{UpdateOutcome, UpdateResponse, UpdateStage};
pub use reconciler::UpdateReconciler;
pub use version::{compare_versions, is_newer_version};
