//! Typed view of an analysis's settings document.
//!
//! The document is a JSON object with an optional `workflow` text field (one
//! step identifier per line) and any number of free-form parameters. It is
//! validated once when read, and its full contents become the initial shared
//! document of every run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{JobError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,

    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl AnalysisSettings {
    /// Parse a stored settings text. Absent or blank text yields empty settings.
    pub fn from_text(text: Option<&str>) -> Result<Self> {
        match text.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(raw) => {
                let value: Value = serde_json::from_str(raw).map_err(|e| {
                    JobError::Validation(format!("settings must be valid JSON: {e}"))
                })?;
                Self::from_value(value)
            }
        }
    }

    /// Build from an already-decoded JSON value. `null` yields empty settings.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(value).map_err(|e| {
                JobError::Validation(format!("invalid settings document: {e}"))
            }),
            _ => Err(JobError::Validation(
                "settings must be a JSON object".to_string(),
            )),
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The document every run's workspace is seeded with.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Object(Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_text_is_empty_settings() {
        assert_eq!(AnalysisSettings::from_text(None).unwrap(), AnalysisSettings::default());
        assert_eq!(
            AnalysisSettings::from_text(Some("   ")).unwrap(),
            AnalysisSettings::default()
        );
    }

    #[test]
    fn test_workflow_and_params_split() {
        let settings = AnalysisSettings::from_text(Some(
            r#"{"workflow": "a.py\nb.js", "dateFrom": "2024-01-01", "limit": 5}"#,
        ))
        .unwrap();

        assert_eq!(settings.workflow.as_deref(), Some("a.py\nb.js"));
        assert_eq!(settings.params.get("dateFrom"), Some(&json!("2024-01-01")));
        assert_eq!(settings.params.get("limit"), Some(&json!(5)));
        assert!(!settings.params.contains_key("workflow"));
    }

    #[test]
    fn test_document_keeps_everything() {
        let settings =
            AnalysisSettings::from_value(json!({"workflow": "a.py", "x": [1, 2]})).unwrap();
        assert_eq!(settings.to_document(), json!({"workflow": "a.py", "x": [1, 2]}));
    }

    #[test]
    fn test_rejects_non_objects_and_bad_json() {
        assert!(matches!(
            AnalysisSettings::from_value(json!([1, 2])),
            Err(JobError::Validation(_))
        ));
        assert!(matches!(
            AnalysisSettings::from_text(Some("{not json")),
            Err(JobError::Validation(_))
        ));
        assert!(matches!(
            AnalysisSettings::from_value(json!({"workflow": 12})),
            Err(JobError::Validation(_))
        ));
    }
}
