//! Upgrade log passthrough.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Filename offered to the browser
pub const ATTACHMENT_NAME: &str = "update.log";

/// Open the upgrade log. `None` if it does not exist.
pub fn open_upgrade_log(path: &Path) -> io::Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Copy an opened log to `out` byte-for-byte
pub fn stream_upgrade_log<W: Write>(mut log: File, out: &mut W) -> io::Result<u64> {
    let copied = io::copy(&mut log, out)?;
    out.flush()?;
    Ok(copied)
}
