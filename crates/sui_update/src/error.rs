//! Error types for the update endpoint.
//!
//! Display text is for the log. `user_message()` is what the administrator
//! sees, `status_code()` the HTTP status, `severity()` the log urgency.

use std::io;
use thiserror::Error;
use tracing::{error, warn};

/// Log urgency, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Emergency,
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Emergency => "emerg",
            Severity::Error => "err",
            Severity::Warning => "warning",
        }
    }
}

const CONTACT_ERROR: &str = "Error while contacting update server.";
const ARTIFACT_ERROR: &str = "Error while reading the downloaded update file.";

/// Manifest retrieval failures
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Unable to connect to update server: {0}")]
    NetworkFailure(String),

    #[error("Unable to get manifest, got HTTP code: {0}")]
    ServerError(u16),

    #[error("Unable to allocate memory for the manifest")]
    OutOfMemory,

    #[error("Unable to parse manifest: {0}")]
    ParseFailure(String),

    #[error("Manifest has no usable {field} for model {model}")]
    MissingField { model: String, field: &'static str },
}

impl FetchError {
    pub fn user_message(&self) -> &'static str {
        match self {
            FetchError::NetworkFailure(_) | FetchError::ServerError(_) => CONTACT_ERROR,
            FetchError::OutOfMemory => {
                "The router is out of memory and needs to be restarted immediately."
            }
            FetchError::ParseFailure(_) => "Error while reading update information from server.",
            FetchError::MissingField { field: "version", .. } => {
                "Error while reading update version number for device."
            }
            FetchError::MissingField { .. } => "Error while reading update file information.",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            FetchError::OutOfMemory => Severity::Emergency,
            FetchError::ServerError(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Artifact download failures
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Unable to open update file for writing: {0}")]
    Prepare(#[source] io::Error),

    #[error("Unable to connect to update server: {0}")]
    Network(String),

    #[error("Unable to get update file, got HTTP code: {0}")]
    Server(u16),

    #[error("Transfer of update file failed: {0}")]
    Write(#[source] io::Error),
}

impl DownloadError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DownloadError::Prepare(_) => "Error while preparing update file.",
            DownloadError::Network(_) | DownloadError::Server(_) | DownloadError::Write(_) => {
                CONTACT_ERROR
            }
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            DownloadError::Server(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Every terminal failure of an update request
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Unable to retrieve router model: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Authorization claim is missing version, size or md5")]
    ClaimIncomplete,

    #[error("Authorization claim does not match the manifest")]
    AuthorizationMismatch,

    #[error("Update file is locked: {0}")]
    Busy(String),

    #[error("{context}: {source}")]
    Filesystem {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Unable to read free memory: {0}")]
    MemoryProbe(String),

    #[error("Insufficient memory to download the update: {free} bytes free, {required} required")]
    InsufficientMemory { free: u64, required: u64 },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Downloaded update file is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Downloaded update file md5 is {actual}, expected {expected}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Unable to start the upgrade command: {0}")]
    ProcessLaunchFailure(#[source] io::Error),
}

impl UpdateError {
    pub fn filesystem(context: &'static str, source: io::Error) -> Self {
        UpdateError::Filesystem { context, source }
    }

    /// Message shown to the administrator
    pub fn user_message(&self) -> &'static str {
        match self {
            UpdateError::ModelUnavailable(_) => "Unable to determine router model.",
            UpdateError::Fetch(e) => e.user_message(),
            UpdateError::ClaimIncomplete => {
                "Version, size (in bytes, as a number), and md5 must be supplied before an update will be applied."
            }
            UpdateError::AuthorizationMismatch => {
                "The version, size, and md5 supplied did not match the corresponding values that were expected."
            }
            UpdateError::Busy(_) => "Another update request is already in progress.",
            UpdateError::Filesystem { .. } => ARTIFACT_ERROR,
            UpdateError::MemoryProbe(_) => "Error while checking for available memory.",
            UpdateError::InsufficientMemory { .. } => {
                "Insufficient free memory to download update file. Restarting the router will likely solve this problem."
            }
            UpdateError::Download(e) => e.user_message(),
            UpdateError::SizeMismatch { .. } => "Downloaded update file was the wrong size.",
            UpdateError::ChecksumMismatch { .. } => {
                "Downloaded update file did not have the correct md5."
            }
            UpdateError::ProcessLaunchFailure(_) => "Error while starting the upgrade.",
        }
    }

    /// HTTP status for the response
    pub fn status_code(&self) -> u16 {
        match self {
            UpdateError::ClaimIncomplete | UpdateError::AuthorizationMismatch => 422,
            UpdateError::Busy(_) => 409,
            _ => 500,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            UpdateError::Fetch(e) => e.severity(),
            UpdateError::Download(e) => e.severity(),
            UpdateError::ClaimIncomplete
            | UpdateError::AuthorizationMismatch
            | UpdateError::Busy(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Write this error to the log at its severity
    pub fn log(&self) {
        match self.severity() {
            Severity::Emergency => error!(severity = Severity::Emergency.as_str(), "{}", self),
            Severity::Error => error!("{}", self),
            Severity::Warning => warn!("{}", self),
        }
    }
}
