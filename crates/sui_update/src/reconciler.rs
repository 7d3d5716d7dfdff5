//! Update reconciliation.
//!
//! One request walks these states, each returning a value that decides the next:
//!
//! 1. CheckingManifest - resolve the model, fetch the manifest
//! 2. ComparingVersion - newer than the installed firmware? If not, `none`
//! 3. Authorizing - a claim, if supplied, must match the manifest exactly
//! 4. CheckingLocalArtifact - stale or corrupt images are deleted
//! 5. valid image: `complete` if authorized (flash launched), else `ready`
//! 6. Downloading/Verifying - memory headroom, download, re-verify, `ready`
//!
//! Steps 4-6 hold the artifact lock. Every failure after step 2 carries the
//! manifest's version/size/md5 so the caller can resubmit a correct claim.

use crate::artifact::{inspect_artifact, remove_artifact, ArtifactState};
use crate::claim::ClaimInput;
use crate::config::UpdateConfig;
use crate::error::UpdateError;
use crate::launcher::UpgradeLauncher;
use crate::lock::{ArtifactLock, LockError};
use crate::manifest::Manifest;
use crate::memory::{required_bytes, MemoryProbe};
use crate::model::ModelSource;
use crate::outcome::{UpdateOutcome, UpdateStage};
use crate::remote::UpdateServer;
use crate::version::is_newer_version;
use std::io;
use tracing::{debug, info, warn};

/// Reconciliation states, for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    CheckingManifest,
    ComparingVersion,
    Authorizing,
    CheckingLocalArtifact,
    Downloading,
    Verifying,
    Executing,
}

/// Runs one update request against its collaborators
pub struct UpdateReconciler<'a> {
    config: &'a UpdateConfig,
    model: &'a dyn ModelSource,
    server: &'a dyn UpdateServer,
    memory: &'a dyn MemoryProbe,
    launcher: &'a dyn UpgradeLauncher,
}

impl<'a> UpdateReconciler<'a> {
    pub fn new(
        config: &'a UpdateConfig,
        model: &'a dyn ModelSource,
        server: &'a dyn UpdateServer,
        memory: &'a dyn MemoryProbe,
        launcher: &'a dyn UpgradeLauncher,
    ) -> Self {
        Self {
            config,
            model,
            server,
            memory,
            launcher,
        }
    }

    /// Decide and carry out the update request. Failures are logged here.
    pub fn run(&self, claim: &ClaimInput) -> UpdateOutcome {
        let outcome = self.reconcile(claim);
        if let UpdateOutcome::Failed { error, .. } = &outcome {
            error.log();
        }
        outcome
    }

    fn enter(&self, state: ReconcileState) {
        debug!(state = ?state, "Update reconciliation");
    }

    fn reconcile(&self, claim: &ClaimInput) -> UpdateOutcome {
        self.enter(ReconcileState::CheckingManifest);
        let model = match self.model.model() {
            Ok(m) => m,
            Err(e) => return UpdateOutcome::failed(UpdateError::ModelUnavailable(e)),
        };
        let index = match self.server.fetch_manifest() {
            Ok(index) => index,
            Err(e) => return UpdateOutcome::failed(e.into()),
        };

        self.enter(ReconcileState::ComparingVersion);
        let remote_version = match index.version_for(&model) {
            Ok(v) => v,
            Err(e) => return UpdateOutcome::failed(e.into()),
        };
        let installed = self.config.installed_version();
        if !is_newer_version(remote_version, installed) {
            info!(model = %model, installed, remote = remote_version, "No update available");
            return UpdateOutcome::NoUpdate;
        }

        let manifest = match index.manifest_for(&model) {
            Ok(m) => m,
            Err(e) => return UpdateOutcome::failed(e.into()),
        };
        drop(index);
        info!(
            model = %model,
            installed,
            remote = %manifest.version,
            size = manifest.size,
            "Update available"
        );

        self.enter(ReconcileState::Authorizing);
        let authorized = match claim.authorize(&manifest) {
            Ok(claim) => claim.is_some(),
            Err(e) => {
                return UpdateOutcome::failed_with(e, manifest.summary(), UpdateStage::Available);
            }
        };

        match self.reconcile_artifact(&manifest, authorized) {
            Ok(outcome) => outcome,
            Err(e) => UpdateOutcome::failed_with(e, manifest.summary(), UpdateStage::Available),
        }
    }

    /// Steps 4-6, under the artifact lock
    fn reconcile_artifact(
        &self,
        manifest: &Manifest,
        authorized: bool,
    ) -> Result<UpdateOutcome, UpdateError> {
        let path = &self.config.artifact_path;
        let _lock = ArtifactLock::acquire(&self.config.lock_path(), self.config.lock_stale_limit())
            .map_err(|e| match e {
                LockError::Held(_) => UpdateError::Busy(e.to_string()),
                LockError::Io(source) => {
                    UpdateError::filesystem("Unable to lock the update file", source)
                }
            })?;

        self.enter(ReconcileState::CheckingLocalArtifact);
        let state = inspect_artifact(path, manifest.size, &manifest.md5)
            .map_err(|e| UpdateError::filesystem("Unable to read the old update file", e))?;
        debug!(path = %path.display(), state = state.as_str(), "Local update file");

        match state {
            ArtifactState::Valid if authorized => return Ok(self.execute(manifest)),
            ArtifactState::Valid => {
                info!(version = %manifest.version, "Update file ready, awaiting authorization");
                return Ok(UpdateOutcome::Ready(manifest.summary()));
            }
            ArtifactState::Stale { actual_size } => {
                warn!(
                    actual_size,
                    expected = manifest.size,
                    "Size of previously downloaded update file is wrong, deleting it"
                );
                remove_artifact(path).map_err(|e| {
                    UpdateError::filesystem(
                        "Unable to remove the old incorrect size update file",
                        e,
                    )
                })?;
            }
            ArtifactState::Corrupt { actual_md5 } => {
                warn!(
                    actual_md5 = %actual_md5,
                    expected = %manifest.md5,
                    "MD5 of previously downloaded update file is wrong, deleting it"
                );
                remove_artifact(path).map_err(|e| {
                    UpdateError::filesystem(
                        "Unable to remove the old incorrect md5 update file",
                        e,
                    )
                })?;
            }
            ArtifactState::Absent => {}
        }

        self.enter(ReconcileState::Downloading);
        self.ensure_memory(manifest.size)?;
        self.server.download(&manifest.url, path, manifest.size)?;

        self.enter(ReconcileState::Verifying);
        self.verify_download(manifest)?;

        info!(version = %manifest.version, "Update file downloaded and verified");
        Ok(UpdateOutcome::Ready(manifest.summary()))
    }

    fn ensure_memory(&self, size: u64) -> Result<(), UpdateError> {
        let free = self.memory.free_bytes().map_err(UpdateError::MemoryProbe)?;
        let required = required_bytes(size, self.config.memory_margin_bytes);
        if free <= required {
            return Err(UpdateError::InsufficientMemory { free, required });
        }
        debug!(free, required, "Memory headroom ok");
        Ok(())
    }

    /// A finished download is not trusted until size and md5 are rechecked
    fn verify_download(&self, manifest: &Manifest) -> Result<(), UpdateError> {
        let path = &self.config.artifact_path;
        let state = inspect_artifact(path, manifest.size, &manifest.md5)
            .map_err(|e| UpdateError::filesystem("Unable to read the new update file", e))?;

        let error = match state {
            ArtifactState::Valid => return Ok(()),
            ArtifactState::Absent => {
                return Err(UpdateError::filesystem(
                    "Unable to stat the new update file",
                    io::Error::new(io::ErrorKind::NotFound, "missing after download"),
                ));
            }
            ArtifactState::Stale { actual_size } => UpdateError::SizeMismatch {
                expected: manifest.size,
                actual: actual_size,
            },
            ArtifactState::Corrupt { actual_md5 } => UpdateError::ChecksumMismatch {
                expected: manifest.md5.clone(),
                actual: actual_md5,
            },
        };

        if let Err(e) = remove_artifact(path) {
            warn!("Unable to remove the rejected update file: {}", e);
        }
        Err(error)
    }

    fn execute(&self, manifest: &Manifest) -> UpdateOutcome {
        self.enter(ReconcileState::Executing);
        match self.launcher.launch(&self.config.artifact_path) {
            Ok(()) => {
                info!(version = %manifest.version, "Upgrade authorized, rebooting");
                UpdateOutcome::Complete
            }
            Err(e) => UpdateOutcome::failed_with(
                UpdateError::ProcessLaunchFailure(e),
                manifest.summary(),
                UpdateStage::Ready,
            ),
        }
    }
}
