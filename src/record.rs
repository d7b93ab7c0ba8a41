//! Normalised results of profile acquisition.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Top-level field of the Workday custom report that carries the entries.
pub const REPORT_ENTRY: &str = "Report_Entry";

/// A validated Workday profile report.
///
/// Always holds a non-empty `Report_Entry` array; construction through
/// [`ProfileRecord::from_value`] is the only way to obtain one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProfileRecord(Map<String, Value>);

impl ProfileRecord {
    /// Validate a decoded report body for `employee_id`.
    ///
    /// A missing or non-array `Report_Entry` is a structural problem with
    /// the response; an empty array means the backend knows no such worker.
    pub fn from_value(value: Value, employee_id: &str) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::InvalidProfileResponse(
                "expected a JSON object".to_string(),
            ));
        };
        match map.get(REPORT_ENTRY) {
            None => Err(Error::InvalidProfileResponse(format!(
                "missing '{REPORT_ENTRY}' in JSON"
            ))),
            Some(Value::Array(entries)) if entries.is_empty() => {
                Err(Error::EmployeeNotFound(employee_id.to_string()))
            }
            Some(Value::Array(_)) => Ok(Self(map)),
            Some(_) => Err(Error::InvalidProfileResponse(format!(
                "'{REPORT_ENTRY}' is not an array"
            ))),
        }
    }

    pub fn entries(&self) -> &[Value] {
        match self.0.get(REPORT_ENTRY) {
            Some(Value::Array(entries)) => entries,
            _ => &[],
        }
    }

    /// First report entry as an object, if it is one.
    pub fn first_entry(&self) -> Option<&Map<String, Value>> {
        self.entries().first().and_then(Value::as_object)
    }

    /// Display name of the worker, e.g. `"Jane Doe"` for `"Jane Doe (123)"`.
    pub fn worker_name(&self) -> Option<String> {
        let worker = self.first_entry()?.get("Worker")?.as_str()?;
        let name = worker.split('(').next().unwrap_or(worker).trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Look up a dotted path such as `Report_Entry.0.Worker`.
    ///
    /// Paths that do not start at a top-level key fall back to the first
    /// report entry, so templates can write `{{ Worker }}`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.').map(str::trim);
        let head = segments.next()?;
        let (mut current, rest): (&Value, Vec<&str>) = match self.0.get(head) {
            Some(v) => (v, segments.collect()),
            None => {
                let entry = self.entries().first()?;
                (entry.get(head)?, segments.collect())
            }
        };
        for segment in rest {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Base64 photo payload extracted verbatim from a SOAP `wd:File` element.
///
/// Not decoded or validated here; callers decide what to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPayload(String);

impl PhotoPayload {
    pub fn new(base64: impl Into<String>) -> Self {
        Self(base64.into())
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Output of the orchestrator: markup text or PDF bytes, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderArtifact {
    Markup(String),
    Pdf(Vec<u8>),
}

impl RenderArtifact {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RenderArtifact::Markup(text) => text.as_bytes(),
            RenderArtifact::Pdf(bytes) => bytes,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            RenderArtifact::Markup(_) => "text/html; charset=utf-8",
            RenderArtifact::Pdf(_) => "application/pdf",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_non_empty_report() {
        let record =
            ProfileRecord::from_value(json!({"Report_Entry": [{"Worker": "Jane Doe (123)"}]}), "123")
                .unwrap();
        assert_eq!(record.entries().len(), 1);
        assert_eq!(record.worker_name().as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn empty_report_is_not_found() {
        let err = ProfileRecord::from_value(json!({"Report_Entry": []}), "42").unwrap_err();
        assert!(matches!(err, Error::EmployeeNotFound(id) if id == "42"));
    }

    #[test]
    fn missing_or_mistyped_report_is_invalid() {
        for body in [json!({}), json!({"Report_Entry": "x"}), json!([1, 2])] {
            let err = ProfileRecord::from_value(body, "1").unwrap_err();
            assert!(matches!(err, Error::InvalidProfileResponse(_)), "{err:?}");
        }
    }

    #[test]
    fn lookup_walks_paths_and_falls_back_to_first_entry() {
        let record = ProfileRecord::from_value(
            json!({
                "Report_Entry": [{
                    "Worker": "Jane Doe (123)",
                    "Jobs": [{"Title": "Engineer"}]
                }]
            }),
            "123",
        )
        .unwrap();
        assert_eq!(
            record.lookup("Report_Entry.0.Worker"),
            Some(&json!("Jane Doe (123)"))
        );
        assert_eq!(record.lookup("Worker"), Some(&json!("Jane Doe (123)")));
        assert_eq!(record.lookup("Jobs.0.Title"), Some(&json!("Engineer")));
        assert_eq!(record.lookup("Jobs.3.Title"), None);
        assert_eq!(record.lookup("Nope"), None);
    }
}
