//! JSON report generation.
//!
//! [`JsonGenerator`] serializes a [`Report`] as compact single-line JSON or
//! pretty-printed for reading.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{Report, ReportError, Result};

/// JSON report generator.
///
/// # Example
///
/// ```rust
/// use tutor_report::json::JsonGenerator;
/// # use tutor_core::{Course, Module};
/// # let course = Course {
/// #     id: "c".into(), topic: "t".into(), title: "T".into(), description: "D".into(),
/// #     modules: vec![Module::new("m", "M", "d")], created_at: chrono::Utc::now(),
/// # };
/// let report = tutor_report::Report::from_course(&course).unwrap();
/// let json = JsonGenerator::new(&report).generate_pretty().unwrap();
/// assert!(json.contains("courseTitle"));
/// ```
pub struct JsonGenerator<'a> {
    report: &'a Report,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates compact JSON output (single line, no extra whitespace).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Generates pretty-printed JSON output with indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the JSON report to a file, creating or overwriting it.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tests::sample_report;

    #[test]
    fn test_generate_compact_json() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate().unwrap();

        assert!(!json.contains('\n'));
        assert!(json.contains("\"courseTitle\":\"Rust *Basics*\""));
    }

    #[test]
    fn test_generate_pretty_json() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate_pretty().unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("  "));
    }

    #[test]
    fn test_json_fields() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["summary"]["completedModules"], 1);
        assert_eq!(value["summary"]["percent"], 33);
        assert_eq!(value["modules"][0]["status"], "completed");
        assert_eq!(value["modules"][2]["status"], "not_started");
        assert!(value["modules"][2].get("quizScore").is_none());
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = sample_report();

        JsonGenerator::new(&report).write_to_file(&path, true).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Report = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.modules, report.modules);
    }

    #[test]
    fn test_write_to_file_invalid_path() {
        let report = sample_report();
        let result = JsonGenerator::new(&report)
            .write_to_file(Path::new("/nonexistent/dir/report.json"), false);
        assert!(matches!(result, Err(ReportError::Io(_))));
    }
}
