//! Flashing command launch.
//!
//! The command runs in the background after a short delay so the HTTP
//! response can go out before the router starts tearing down services. Its
//! output is appended to the upgrade log.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

use crate::config::UpdateConfig;

/// Starts the reboot-and-flash operation
pub trait UpgradeLauncher {
    /// Start flashing `artifact`. Returns once the process has been spawned.
    fn launch(&self, artifact: &Path) -> io::Result<()>;
}

/// `sysupgrade -v -d <delay> <image>` behind `sleep`
#[derive(Debug, Clone)]
pub struct Sysupgrade {
    command: String,
    launch_delay_secs: u64,
    reboot_delay_secs: u64,
    log_path: PathBuf,
}

/// Positional parameters keep paths out of shell parsing
const SCRIPT: &str = r#"sleep "$1" && exec "$2" -v -d "$3" "$4""#;

impl Sysupgrade {
    pub fn from_config(config: &UpdateConfig) -> Self {
        Self {
            command: config.sysupgrade_command.clone(),
            launch_delay_secs: config.launch_delay_secs,
            reboot_delay_secs: config.reboot_delay_secs,
            log_path: config.log_path.clone(),
        }
    }

    fn build_command(&self, artifact: &Path) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(SCRIPT)
            .arg("sh")
            .arg(self.launch_delay_secs.to_string())
            .arg(&self.command)
            .arg(self.reboot_delay_secs.to_string())
            .arg(artifact);
        cmd
    }
}

impl UpgradeLauncher for Sysupgrade {
    fn launch(&self, artifact: &Path) -> io::Result<()> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        let log_err = log.try_clone()?;

        let child = self
            .build_command(artifact)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()?;

        info!(
            pid = child.id(),
            delay = self.launch_delay_secs,
            image = %artifact.display(),
            "Upgrade command launched"
        );
        // Not waited on: the router reboots underneath us
        drop(child);
        Ok(())
    }
}
