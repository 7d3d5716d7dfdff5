//! Local firmware image verification.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

/// State of the local image relative to the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactState {
    /// Nothing downloaded yet
    Absent,
    /// Wrong size; checksum not computed
    Stale { actual_size: u64 },
    /// Right size, wrong checksum
    Corrupt { actual_md5: String },
    Valid,
}

impl ArtifactState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactState::Absent => "absent",
            ArtifactState::Stale { .. } => "stale",
            ArtifactState::Corrupt { .. } => "corrupt",
            ArtifactState::Valid => "valid",
        }
    }
}

/// Compare the file at `path` against the expected size and md5.
///
/// Not-found is `Absent`; any other I/O error is returned.
pub fn inspect_artifact(
    path: &Path,
    expected_size: u64,
    expected_md5: &str,
) -> io::Result<ArtifactState> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ArtifactState::Absent),
        Err(e) => return Err(e),
    };

    if metadata.len() != expected_size {
        return Ok(ArtifactState::Stale {
            actual_size: metadata.len(),
        });
    }

    let actual_md5 = md5_file(path)?;
    if !actual_md5.eq_ignore_ascii_case(expected_md5) {
        return Ok(ArtifactState::Corrupt { actual_md5 });
    }

    Ok(ArtifactState::Valid)
}

/// Streamed md5 of a file, lowercase hex
pub fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        context.consume(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Remove the image. Already gone counts as removed.
pub fn remove_artifact(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // md5("hello world")
    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    fn write(dir: &TempDir, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join("sysupgrade.bin");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_md5_of_known_content() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, b"hello world");
        assert_eq!(md5_file(&path).unwrap(), HELLO_MD5);
    }

    #[test]
    fn test_md5_spans_buffer_boundaries() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let path = write(&dir, &data);
        assert_eq!(md5_file(&path).unwrap(), format!("{:x}", md5::compute(&data)));
    }

    #[test]
    fn test_absent() {
        let dir = TempDir::new().unwrap();
        let state = inspect_artifact(&dir.path().join("missing.bin"), 11, HELLO_MD5).unwrap();
        assert_eq!(state, ArtifactState::Absent);
    }

    #[test]
    fn test_wrong_size_is_stale_even_with_matching_checksum() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, b"hello world");
        let state = inspect_artifact(&path, 12, HELLO_MD5).unwrap();
        assert_eq!(state, ArtifactState::Stale { actual_size: 11 });
    }

    #[test]
    fn test_right_size_wrong_checksum_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, b"hello wxrld");
        let state = inspect_artifact(&path, 11, HELLO_MD5).unwrap();
        assert!(matches!(state, ArtifactState::Corrupt { .. }));
    }

    #[test]
    fn test_valid_ignores_checksum_case() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, b"hello world");
        let state = inspect_artifact(&path, 11, &HELLO_MD5.to_uppercase()).unwrap();
        assert_eq!(state, ArtifactState::Valid);
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, b"x");
        remove_artifact(&path).unwrap();
        assert!(!path.exists());
        remove_artifact(&path).unwrap();
    }
}
