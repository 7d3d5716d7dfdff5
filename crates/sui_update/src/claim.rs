//! Authorization claims.
//!
//! The administrator authorizes a flash by echoing back the version, size and
//! md5 the endpoint previously reported. All three must be present and equal
//! to the current manifest.

use crate::error::UpdateError;
use crate::manifest::Manifest;
use serde_json::Value;

/// A complete claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationClaim {
    pub version: String,
    pub size: u64,
    pub md5: String,
}

/// What the request body said about authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimInput {
    /// No claim fields at all
    Absent,
    /// Some but not all fields, or fields of the wrong type
    Incomplete,
    Complete(AuthorizationClaim),
}

impl ClaimInput {
    /// Extract the claim from a parsed request body.
    ///
    /// `version` and `md5` must be strings and `size` a non-negative integer;
    /// a field of the wrong type counts as supplied but unusable.
    pub fn from_request(body: &Value) -> Self {
        let version = body.get("version");
        let size = body.get("size");
        let md5 = body.get("md5");

        if version.is_none() && size.is_none() && md5.is_none() {
            return ClaimInput::Absent;
        }

        let version = version.and_then(Value::as_str);
        let size = size.and_then(Value::as_u64);
        let md5 = md5.and_then(Value::as_str);

        match (version, size, md5) {
            (Some(version), Some(size), Some(md5)) => ClaimInput::Complete(AuthorizationClaim {
                version: version.to_string(),
                size,
                md5: md5.to_string(),
            }),
            _ => ClaimInput::Incomplete,
        }
    }

    /// Check against the manifest.
    ///
    /// Returns the authorized claim if one was supplied and matches, `None` if
    /// nothing was supplied.
    pub fn authorize(
        &self,
        manifest: &Manifest,
    ) -> Result<Option<&AuthorizationClaim>, UpdateError> {
        match self {
            ClaimInput::Absent => Ok(None),
            ClaimInput::Incomplete => Err(UpdateError::ClaimIncomplete),
            ClaimInput::Complete(claim) if claim.matches(manifest) => Ok(Some(claim)),
            ClaimInput::Complete(_) => Err(UpdateError::AuthorizationMismatch),
        }
    }
}

impl AuthorizationClaim {
    /// Exact equality: strings byte-for-byte, size numerically
    pub fn matches(&self, manifest: &Manifest) -> bool {
        self.version == manifest.version && self.size == manifest.size && self.md5 == manifest.md5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> Manifest {
        Manifest {
            version: "2.1".into(),
            size: 4096,
            url: "m.bin".into(),
            md5: "0123456789abcdef0123456789abcdef".into(),
        }
    }

    #[test]
    fn test_empty_body_is_absent() {
        assert_eq!(ClaimInput::from_request(&json!({})), ClaimInput::Absent);
        assert_eq!(ClaimInput::from_request(&json!({"other": 1})), ClaimInput::Absent);
        assert!(ClaimInput::Absent.authorize(&manifest()).unwrap().is_none());
    }

    #[test]
    fn test_partial_claim_is_incomplete() {
        let input = ClaimInput::from_request(&json!({"version": "2.1"}));
        assert_eq!(input, ClaimInput::Incomplete);
        assert!(matches!(
            input.authorize(&manifest()),
            Err(UpdateError::ClaimIncomplete)
        ));

        // Size only, no version
        assert_eq!(
            ClaimInput::from_request(&json!({"size": 4096})),
            ClaimInput::Incomplete
        );
    }

    #[test]
    fn test_size_as_string_is_incomplete() {
        let input = ClaimInput::from_request(&json!({
            "version": "2.1", "size": "4096", "md5": "0123456789abcdef0123456789abcdef"
        }));
        assert_eq!(input, ClaimInput::Incomplete);
    }

    #[test]
    fn test_matching_claim_authorizes() {
        let input = ClaimInput::from_request(&json!({
            "version": "2.1", "size": 4096, "md5": "0123456789abcdef0123456789abcdef"
        }));
        let manifest = manifest();
        let claim = input.authorize(&manifest).unwrap().unwrap();
        assert_eq!(claim.size, 4096);
    }

    #[test]
    fn test_any_difference_is_mismatch() {
        let manifest = manifest();
        for body in [
            json!({"version": "2.2", "size": 4096, "md5": "0123456789abcdef0123456789abcdef"}),
            json!({"version": "2.1", "size": 4097, "md5": "0123456789abcdef0123456789abcdef"}),
            json!({"version": "2.1", "size": 4096, "md5": "ffffffffffffffffffffffffffffffff"}),
            // Case differs: claims must be byte-exact
            json!({"version": "2.1", "size": 4096, "md5": "0123456789ABCDEF0123456789ABCDEF"}),
        ] {
            let input = ClaimInput::from_request(&body);
            assert!(
                matches!(input.authorize(&manifest), Err(UpdateError::AuthorizationMismatch)),
                "expected mismatch for {}",
                body
            );
        }
    }
}
