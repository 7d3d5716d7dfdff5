//! Remote update manifest.
//!
//! `latest.json` is an object keyed by device model:
//!
//! ```json
//! {"wr1043nd": {"version": "2.1", "size": 3932160, "url": "wr1043nd/2.1.bin",
//!               "md5": "0123456789abcdef0123456789abcdef"}}
//! ```
//!
//! Parsing is two-stage: the body must be a JSON object (`ParseFailure`
//! otherwise), then the model's entry is looked up field by field
//! (`MissingField`). Other models' entries are never inspected.

use crate::error::FetchError;
use serde::Serialize;
use serde_json::{Map, Value};

/// Latest firmware for one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    pub size: u64,
    /// Relative to the update server's base URL
    pub url: String,
    /// Lowercase hex
    pub md5: String,
}

/// The fields echoed back so the caller can form an authorization claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestSummary {
    pub version: String,
    pub size: u64,
    pub md5: String,
}

impl Manifest {
    pub fn summary(&self) -> ManifestSummary {
        ManifestSummary {
            version: self.version.clone(),
            size: self.size,
            md5: self.md5.clone(),
        }
    }
}

/// Parsed manifest document
#[derive(Debug, Clone)]
pub struct ManifestIndex {
    models: Map<String, Value>,
}

impl ManifestIndex {
    /// Parse a manifest body
    pub fn parse(body: &[u8]) -> Result<Self, FetchError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| FetchError::ParseFailure(e.to_string()))?;

        match value {
            Value::Object(models) => Ok(Self { models }),
            other => Err(FetchError::ParseFailure(format!(
                "expected an object at top level, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Latest version advertised for `model`
    pub fn version_for(&self, model: &str) -> Result<&str, FetchError> {
        self.field(model, "version")?
            .as_str()
            .ok_or_else(|| missing(model, "version"))
    }

    /// Full record for `model`
    pub fn manifest_for(&self, model: &str) -> Result<Manifest, FetchError> {
        let version = self.version_for(model)?.to_string();

        let size = self
            .field(model, "size")?
            .as_u64()
            .ok_or_else(|| missing(model, "size"))?;

        let url = self
            .field(model, "url")?
            .as_str()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| missing(model, "url"))?
            .to_string();

        let md5 = self
            .field(model, "md5")?
            .as_str()
            .filter(|m| is_md5_hex(m))
            .ok_or_else(|| missing(model, "md5"))?
            .to_ascii_lowercase();

        Ok(Manifest {
            version,
            size,
            url,
            md5,
        })
    }

    fn field(&self, model: &str, field: &'static str) -> Result<&Value, FetchError> {
        self.models
            .get(model)
            .and_then(|entry| entry.get(field))
            .ok_or_else(|| missing(model, field))
    }
}

fn missing(model: &str, field: &'static str) -> FetchError {
    FetchError::MissingField {
        model: model.to_string(),
        field,
    }
}

/// 32 hex characters
pub fn is_md5_hex(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LATEST: &str = r#"{
        "wr1043nd": {
            "version": "2.1",
            "size": 3932160,
            "url": "wr1043nd/sui-2.1.bin",
            "md5": "0123456789ABCDEF0123456789abcdef"
        },
        "archer-c7": {"version": "2.0"},
        "broken": {"version": 21, "size": "big", "url": "", "md5": "xyz"}
    }"#;

    fn index() -> ManifestIndex {
        ManifestIndex::parse(LATEST.as_bytes()).unwrap()
    }

    #[test]
    fn test_full_entry() {
        let manifest = index().manifest_for("wr1043nd").unwrap();
        assert_eq!(manifest.version, "2.1");
        assert_eq!(manifest.size, 3_932_160);
        assert_eq!(manifest.url, "wr1043nd/sui-2.1.bin");
        assert_eq!(manifest.md5, "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn test_version_only_entry() {
        let index = index();
        assert_eq!(index.version_for("archer-c7").unwrap(), "2.0");
        match index.manifest_for("archer-c7") {
            Err(FetchError::MissingField { field, .. }) => assert_eq!(field, "size"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_model_is_missing_version() {
        match index().version_for("nonexistent") {
            Err(FetchError::MissingField { field, model }) => {
                assert_eq!(field, "version");
                assert_eq!(model, "nonexistent");
            }
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_types_are_missing_not_parse_failures() {
        let index = index();
        assert!(matches!(
            index.version_for("broken"),
            Err(FetchError::MissingField { field: "version", .. })
        ));
    }

    #[test]
    fn test_bad_md5_is_missing() {
        let body = r#"{"m": {"version": "2.1", "size": 10, "url": "m.bin", "md5": "abc"}}"#;
        let index = ManifestIndex::parse(body.as_bytes()).unwrap();
        assert!(matches!(
            index.manifest_for("m"),
            Err(FetchError::MissingField { field: "md5", .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_parse_failure() {
        assert!(matches!(
            ManifestIndex::parse(b"{\"m\": {"),
            Err(FetchError::ParseFailure(_))
        ));
        assert!(matches!(
            ManifestIndex::parse(b"[1, 2, 3]"),
            Err(FetchError::ParseFailure(_))
        ));
        assert!(matches!(
            ManifestIndex::parse(b""),
            Err(FetchError::ParseFailure(_))
        ));
    }

    #[test]
    fn test_negative_size_rejected() {
        let body = r#"{"m": {"version": "2.1", "size": -1, "url": "m.bin",
                       "md5": "0123456789abcdef0123456789abcdef"}}"#;
        let index = ManifestIndex::parse(body.as_bytes()).unwrap();
        assert!(matches!(
            index.manifest_for("m"),
            Err(FetchError::MissingField { field: "size", .. })
        ));
    }
}
