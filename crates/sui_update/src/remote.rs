//! Update server client.
//!
//! Blocking reqwest client pinned to the configured CA certificate. The
//! manifest is buffered (bounded); firmware images are streamed to disk.

use crate::artifact::remove_artifact;
use crate::config::UpdateConfig;
use crate::error::{DownloadError, FetchError};
use crate::manifest::ManifestIndex;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read};
use std::path::Path;
use tracing::{debug, info};

/// Where manifests and firmware images come from
pub trait UpdateServer {
    /// Fetch and parse the manifest document
    fn fetch_manifest(&self) -> Result<ManifestIndex, FetchError>;

    /// Stream `url` (relative to the server base) into `dest`, replacing it.
    /// At most `expected_size + 1` bytes are written, enough for verification
    /// to see an oversized body. Returns the number of bytes written.
    fn download(&self, url: &str, dest: &Path, expected_size: u64) -> Result<u64, DownloadError>;
}

/// HTTPS update server
pub struct HttpUpdateServer {
    client: reqwest::blocking::Client,
    config: UpdateConfig,
}

impl HttpUpdateServer {
    /// Build the client. Trust-anchor problems surface as `NetworkFailure`,
    /// the same way a failed TLS handshake would.
    pub fn new(config: &UpdateConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(concat!("sui-update/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.connect_timeout())
            .timeout(config.download_timeout());

        if let Some(ca_file) = &config.ca_file {
            let pem = fs::read(ca_file).map_err(|e| {
                FetchError::NetworkFailure(format!(
                    "Failed to read CA cert {}: {}",
                    ca_file.display(),
                    e
                ))
            })?;
            let ca_cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                FetchError::NetworkFailure(format!("Failed to parse CA certificate: {}", e))
            })?;
            builder = builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(ca_cert);
        }

        let client = builder.build().map_err(|e| {
            FetchError::NetworkFailure(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn stream_into(&self, url: &str, file: File, expected_size: u64) -> Result<u64, DownloadError> {
        let full_url = self.config.join_url(url);
        info!(url = %full_url, expected_size, "Downloading update file");

        let response = self
            .client
            .get(&full_url)
            .timeout(self.config.download_timeout())
            .send()
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(DownloadError::Server(status));
        }

        // /tmp is RAM; never write past what the memory check allowed for
        let mut body = response.take(expected_size.saturating_add(1));
        let mut writer = BufWriter::new(file);
        let written = io::copy(&mut body, &mut writer).map_err(DownloadError::Write)?;
        let file = writer
            .into_inner()
            .map_err(|e| DownloadError::Write(e.into_error()))?;
        file.sync_all().map_err(DownloadError::Write)?;

        Ok(written)
    }
}

impl UpdateServer for HttpUpdateServer {
    fn fetch_manifest(&self) -> Result<ManifestIndex, FetchError> {
        let manifest_url = self.config.manifest_url();
        debug!(url = %manifest_url, "Fetching manifest");

        let mut response = self
            .client
            .get(&manifest_url)
            .timeout(self.config.manifest_timeout())
            .send()
            .map_err(|e| FetchError::NetworkFailure(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(FetchError::ServerError(status));
        }

        let body = read_bounded(&mut response, self.config.max_manifest_bytes)?;
        ManifestIndex::parse(&body)
    }

    fn download(&self, url: &str, dest: &Path, expected_size: u64) -> Result<u64, DownloadError> {
        let file = File::create(dest).map_err(DownloadError::Prepare)?;

        let result = self.stream_into(url, file, expected_size);
        match &result {
            Ok(bytes) => info!(bytes, path = %dest.display(), "Update file downloaded"),
            // A partial image must not be mistaken for a previous download
            Err(_) => {
                let _ = remove_artifact(dest);
            }
        }
        result
    }
}

/// Read a body into memory, failing on allocation failure or past `limit`
pub fn read_bounded<R: Read>(reader: &mut R, limit: usize) -> Result<Vec<u8>, FetchError> {
    let mut body: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FetchError::NetworkFailure(e.to_string())),
        };

        if body.len() + n > limit {
            return Err(FetchError::ParseFailure(format!(
                "manifest exceeds {} bytes",
                limit
            )));
        }
        body.try_reserve(n).map_err(|_| FetchError::OutOfMemory)?;
        body.extend_from_slice(&chunk[..n]);
    }

    Ok(body)
}
