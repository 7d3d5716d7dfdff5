//! Device model lookup.

use std::process::Command;

/// Where the device model string comes from
pub trait ModelSource {
    fn model(&self) -> Result<String, String>;
}

/// Model read from a UCI option (`uci -q get <key>`)
#[derive(Debug, Clone)]
pub struct UciModel {
    key: String,
}

impl UciModel {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl ModelSource for UciModel {
    fn model(&self) -> Result<String, String> {
        let output = Command::new("uci")
            .args(["-q", "get", &self.key])
            .output()
            .map_err(|e| format!("uci failed: {}", e))?;

        if !output.status.success() {
            return Err(format!("no value at {}", self.key));
        }

        parse_model(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| format!("empty value at {}", self.key))
    }
}

/// Model fixed in configuration
#[derive(Debug, Clone)]
pub struct FixedModel(pub String);

impl ModelSource for FixedModel {
    fn model(&self) -> Result<String, String> {
        parse_model(&self.0).ok_or_else(|| "configured model is empty".to_string())
    }
}

fn parse_model(raw: &str) -> Option<String> {
    let model = raw.trim();
    if model.is_empty() {
        None
    } else {
        Some(model.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_model_trims() {
        assert_eq!(FixedModel(" wr1043nd\n".into()).model().unwrap(), "wr1043nd");
        assert!(FixedModel("  ".into()).model().is_err());
    }

    #[test]
    fn test_uci_with_unknown_key_fails() {
        // Either uci is missing or the key does not exist; both are errors
        let source = UciModel::new("sui.nonexistent_section_for_tests.model");
        assert!(source.model().is_err());
    }
}
