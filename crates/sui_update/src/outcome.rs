//! Request outcomes and their JSON bodies.

use crate::error::UpdateError;
use crate::manifest::ManifestSummary;
use serde::Serialize;

/// Value of the `update` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStage {
    None,
    /// Newer firmware exists but is not downloaded and verified
    Available,
    /// Verified image on disk, waiting for authorization
    Ready,
    Complete,
}

/// Manifest fields attached to a failure, and the stage the update was in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    pub manifest: ManifestSummary,
    pub stage: UpdateStage,
}

/// The one result of an update request
#[derive(Debug)]
pub enum UpdateOutcome {
    NoUpdate,
    Ready(ManifestSummary),
    /// Flashing started, router is rebooting
    Complete,
    Failed {
        error: UpdateError,
        context: Option<FailureContext>,
    },
}

/// JSON body of an update response
#[derive(Debug, Serialize)]
pub struct UpdateResponse<'a> {
    pub xsrf: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebooting: Option<bool>,
}

impl<'a> UpdateResponse<'a> {
    fn new(xsrf: &'a str) -> Self {
        Self {
            xsrf,
            errors: Vec::new(),
            version: None,
            size: None,
            md5: None,
            update: None,
            rebooting: None,
        }
    }

    fn with_manifest(mut self, manifest: &'a ManifestSummary) -> Self {
        self.version = Some(&manifest.version);
        self.size = Some(manifest.size);
        self.md5 = Some(&manifest.md5);
        self
    }

    /// Body carrying only an error message
    pub fn error(xsrf: &'a str, message: &'static str) -> Self {
        let mut response = Self::new(xsrf);
        response.errors.push(message);
        response
    }
}

impl UpdateOutcome {
    /// Failure that happened before the manifest was known
    pub fn failed(error: UpdateError) -> Self {
        UpdateOutcome::Failed {
            error,
            context: None,
        }
    }

    /// Failure with the manifest fields needed to retry
    pub fn failed_with(error: UpdateError, manifest: ManifestSummary, stage: UpdateStage) -> Self {
        UpdateOutcome::Failed {
            error,
            context: Some(FailureContext { manifest, stage }),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            UpdateOutcome::Failed { error, .. } => error.status_code(),
            _ => 200,
        }
    }

    pub fn stage(&self) -> Option<UpdateStage> {
        match self {
            UpdateOutcome::NoUpdate => Some(UpdateStage::None),
            UpdateOutcome::Ready(_) => Some(UpdateStage::Ready),
            UpdateOutcome::Complete => Some(UpdateStage::Complete),
            UpdateOutcome::Failed { context, .. } => context.as_ref().map(|c| c.stage),
        }
    }

    pub fn response<'a>(&'a self, xsrf: &'a str) -> UpdateResponse<'a> {
        let mut response = match self {
            UpdateOutcome::NoUpdate | UpdateOutcome::Complete => UpdateResponse::new(xsrf),
            UpdateOutcome::Ready(manifest) => UpdateResponse::new(xsrf).with_manifest(manifest),
            UpdateOutcome::Failed { error, context } => {
                let response = UpdateResponse::error(xsrf, error.user_message());
                match context {
                    Some(c) => response.with_manifest(&c.manifest),
                    None => response,
                }
            }
        };
        response.update = self.stage();
        if let UpdateOutcome::Complete = self {
            response.rebooting = Some(true);
        }
        response
    }

    /// Serialized response body
    pub fn to_json(&self, xsrf: &str) -> String {
        serde_json::to_string(&self.response(xsrf))
            .unwrap_or_else(|_| token_only_body(xsrf))
    }
}

/// Last-resort body when the full response cannot be serialized
fn token_only_body(xsrf: &str) -> String {
    serde_json::json!({ "xsrf": xsrf }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> ManifestSummary {
        ManifestSummary {
            version: "2.1".into(),
            size: 4096,
            md5: "0123456789abcdef0123456789abcdef".into(),
        }
    }

    #[test]
    fn test_none_body() {
        assert_eq!(
            UpdateOutcome::NoUpdate.to_json("tok"),
            r#"{"xsrf":"tok","update":"none"}"#
        );
    }

    #[test]
    fn test_ready_body() {
        assert_eq!(
            UpdateOutcome::Ready(summary()).to_json("tok"),
            r#"{"xsrf":"tok","version":"2.1","size":4096,"md5":"0123456789abcdef0123456789abcdef","update":"ready"}"#
        );
    }

    #[test]
    fn test_complete_body() {
        let outcome = UpdateOutcome::Complete;
        assert_eq!(outcome.status_code(), 200);
        assert_eq!(
            outcome.to_json("tok"),
            r#"{"xsrf":"tok","update":"complete","rebooting":true}"#
        );
    }

    #[test]
    fn test_error_with_context() {
        let outcome = UpdateOutcome::failed_with(
            UpdateError::AuthorizationMismatch,
            summary(),
            UpdateStage::Available,
        );
        assert_eq!(outcome.status_code(), 422);
        assert_eq!(
            outcome.to_json("tok"),
            r#"{"xsrf":"tok","errors":["The version, size, and md5 supplied did not match the corresponding values that were expected."],"version":"2.1","size":4096,"md5":"0123456789abcdef0123456789abcdef","update":"available"}"#
        );
    }

    #[test]
    fn test_error_without_context() {
        let outcome = UpdateOutcome::failed(UpdateError::ModelUnavailable("uci".into()));
        assert_eq!(outcome.status_code(), 500);
        assert_eq!(
            outcome.to_json("tok"),
            r#"{"xsrf":"tok","errors":["Unable to determine router model."]}"#
        );
    }

    #[test]
    fn test_token_only_body_is_json_escaped() {
        let token = "a\"b\\c\u{1}";
        let value: serde_json::Value = serde_json::from_str(&token_only_body(token)).unwrap();
        assert_eq!(value["xsrf"], token);
        assert_eq!(token_only_body("tok"), r#"{"xsrf":"tok"}"#);
    }

    #[test]
    fn test_token_is_escaped() {
        let json = UpdateOutcome::NoUpdate.to_json("a\"b");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["xsrf"], "a\"b");
    }
}
