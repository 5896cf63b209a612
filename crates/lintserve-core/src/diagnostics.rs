//! Translation of analysis engine output into protocol-shaped diagnostics
//! and proposed patches.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::patch::Patch;
use crate::position::{Position, Range};

/// Protocol diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl Severity {
    /// Map an engine severity (0 info, 1 normal, 2 major) onto the protocol
    /// scale. Any other value has no protocol counterpart.
    pub fn from_engine(severity: i64) -> Option<Self> {
        match severity {
            0 => Some(Severity::Information),
            1 => Some(Severity::Warning),
            2 => Some(Severity::Error),
            _ => None,
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> u8 {
        severity as u8
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(Severity::Error),
            2 => Ok(Severity::Warning),
            3 => Ok(Severity::Information),
            4 => Ok(Severity::Hint),
            other => Err(format!("unknown diagnostic severity {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub range: Range,
    pub source: String,
    pub message: String,
}

/// Everything one analysis run produced: diagnostics to publish and the
/// patches the engine proposed, in the order the engine reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
    fixes: Vec<(PathBuf, Patch)>,
}

#[derive(Debug, Deserialize)]
struct EngineReport {
    #[serde(default)]
    results: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Finding {
    severity: i64,
    message: String,
    origin: String,
    #[serde(default)]
    affected_code: Vec<AffectedCode>,
    #[serde(default)]
    diffs: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct AffectedCode {
    start: SourcePosition,
    end: SourcePosition,
}

// 1-based; either coordinate may be null
#[derive(Debug, Deserialize)]
struct SourcePosition {
    line: Option<u32>,
    column: Option<u32>,
}

/// 1-based to 0-based. Null stays null.
fn convert_offset(offset: Option<u32>) -> Option<u32> {
    offset.map(|x| x.saturating_sub(1))
}

fn convert_range(code: &AffectedCode) -> Range {
    let start_line = convert_offset(code.start.line).unwrap_or(0);
    let end_line = convert_offset(code.end.line).unwrap_or(start_line);

    match (convert_offset(code.start.column), convert_offset(code.end.column)) {
        (Some(start_char), Some(end_char)) => Range::new(
            Position::new(start_line, start_char),
            Position::new(end_line, end_char),
        ),
        // whole line
        _ => Range::new(
            Position::new(start_line, 0),
            Position::new(start_line + 1, 0),
        ),
    }
}

impl Diagnostics {
    pub fn new(diagnostics: Vec<Diagnostic>, fixes: Vec<(PathBuf, Patch)>) -> Self {
        Self { diagnostics, fixes }
    }

    /// Parse the engine's JSON result.
    ///
    /// `results` maps a section name to the findings that section produced.
    /// Every affected code region of a finding becomes one diagnostic
    /// tagged with `source`; every diff a finding carries becomes one fix.
    /// Findings with an unknown severity are dropped and logged.
    ///
    /// # Errors
    ///
    /// `CoreError::EngineOutput` if the text is not a well-formed result.
    pub fn from_engine_result(json: &str, source: &str) -> CoreResult<Self> {
        let report: EngineReport = serde_json::from_str(json).map_err(CoreError::EngineOutput)?;
        let mut diagnostics = Vec::new();
        let mut fixes = Vec::new();

        for (section, findings) in report.results {
            let findings: Vec<Finding> =
                serde_json::from_value(findings).map_err(CoreError::EngineOutput)?;

            for finding in findings {
                let Some(severity) = Severity::from_engine(finding.severity) else {
                    warn!(
                        section = %section,
                        severity = finding.severity,
                        "dropping finding with unknown severity"
                    );
                    continue;
                };
                let message = format!("[{}] {}: {}", section, finding.origin, finding.message);

                for code in &finding.affected_code {
                    diagnostics.push(Diagnostic {
                        severity,
                        range: convert_range(code),
                        source: source.to_string(),
                        message: message.clone(),
                    });
                }

                for (file, diff) in finding.diffs.into_iter().flatten() {
                    match diff {
                        Value::String(text) => fixes.push((PathBuf::from(file), Patch::new(text))),
                        Value::Null => {}
                        other => debug!(file = %file, diff = %other, "ignoring non-text diff"),
                    }
                }
            }
        }

        debug!(
            diagnostics = diagnostics.len(),
            fixes = fixes.len(),
            "translated engine result"
        );
        Ok(Self { diagnostics, fixes })
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn fixes(&self) -> &[(PathBuf, Patch)] {
        &self.fixes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn translate(result: Value) -> Diagnostics {
        Diagnostics::from_engine_result(&result.to_string(), "coala").unwrap()
    }

    fn finding(severity: i64, start: Value, end: Value) -> Value {
        json!({
            "severity": severity,
            "message": "Line is too long",
            "origin": "LineLengthBear",
            "affected_code": [{"start": start, "end": end}],
        })
    }

    #[test]
    fn test_translates_finding() {
        let result = json!({"results": {"python": [
            finding(2, json!({"line": 3, "column": 5}), json!({"line": 3, "column": 9}))
        ]}});

        let diags = translate(result);
        assert_eq!(
            diags.diagnostics(),
            &[Diagnostic {
                severity: Severity::Error,
                range: Range::new(Position::new(2, 4), Position::new(2, 8)),
                source: "coala".to_string(),
                message: "[python] LineLengthBear: Line is too long".to_string(),
            }]
        );
        assert!(diags.fixes().is_empty());
    }

    #[test]
    fn test_severity_table() {
        assert_eq!(Severity::from_engine(0), Some(Severity::Information));
        assert_eq!(Severity::from_engine(1), Some(Severity::Warning));
        assert_eq!(Severity::from_engine(2), Some(Severity::Error));
        assert_eq!(Severity::from_engine(3), None);
        assert_eq!(Severity::from_engine(-1), None);
    }

    #[test]
    fn test_unknown_severity_is_dropped() {
        let pos = json!({"line": 1, "column": 1});
        let result = json!({"results": {"all": [
            finding(7, pos.clone(), pos.clone()),
            finding(0, pos.clone(), pos),
        ]}});

        let diags = translate(result);
        assert_eq!(diags.diagnostics().len(), 1);
        assert_eq!(diags.diagnostics()[0].severity, Severity::Information);
    }

    #[test]
    fn test_null_column_becomes_whole_line() {
        let result = json!({"results": {"all": [
            finding(1, json!({"line": 5, "column": null}), json!({"line": 8, "column": 4}))
        ]}});

        let range = translate(result).diagnostics()[0].range;
        assert_eq!(range, Range::new(Position::new(4, 0), Position::new(5, 0)));
    }

    #[test]
    fn test_null_end_column_becomes_whole_line() {
        let result = json!({"results": {"all": [
            finding(1, json!({"line": 2, "column": 3}), json!({"line": 2, "column": null}))
        ]}});

        let range = translate(result).diagnostics()[0].range;
        assert_eq!(range, Range::new(Position::new(1, 0), Position::new(2, 0)));
    }

    #[test]
    fn test_zero_offsets_stay_at_zero() {
        let result = json!({"results": {"all": [
            finding(1, json!({"line": 0, "column": 0}), json!({"line": 1, "column": 1}))
        ]}});

        let range = translate(result).diagnostics()[0].range;
        assert_eq!(range, Range::new(Position::new(0, 0), Position::new(0, 0)));
    }

    #[test]
    fn test_missing_lines_default_to_start() {
        let result = json!({"results": {"all": [
            finding(1, json!({"line": null, "column": 2}), json!({"line": null, "column": 6}))
        ]}});

        let range = translate(result).diagnostics()[0].range;
        assert_eq!(range, Range::new(Position::new(0, 1), Position::new(0, 5)));
    }

    #[test]
    fn test_one_diagnostic_per_affected_region() {
        let result = json!({"results": {"all": [{
            "severity": 1,
            "message": "m",
            "origin": "o",
            "affected_code": [
                {"start": {"line": 1, "column": 1}, "end": {"line": 1, "column": 2}},
                {"start": {"line": 4, "column": 1}, "end": {"line": 4, "column": 2}},
            ],
        }]}});

        let diags = translate(result);
        assert_eq!(diags.diagnostics().len(), 2);
        assert_eq!(diags.diagnostics()[1].range.start.line, 3);
    }

    #[test]
    fn test_sections_keep_engine_order() {
        let pos = json!({"line": 1, "column": 1});
        let result = json!({"results": {
            "zeta": [finding(1, pos.clone(), pos.clone())],
            "alpha": [finding(1, pos.clone(), pos)],
        }});

        let diags = translate(result);
        assert!(diags.diagnostics()[0].message.starts_with("[zeta]"));
        assert!(diags.diagnostics()[1].message.starts_with("[alpha]"));
    }

    #[test]
    fn test_diffs_become_fixes() {
        let result = json!({"results": {"cli": [{
            "severity": 1,
            "message": "m",
            "origin": "PEP8Bear",
            "affected_code": [],
            "diffs": {
                "/work/a.py": "--- \n+++ \n@@ -1 +1 @@\n-a\n+A\n",
                "/work/b.py": "--- \n+++ \n@@ -1 +1 @@\n-b\n+B\n",
                "/work/c.py": null,
            },
        }]}});

        let diags = translate(result);
        assert!(diags.diagnostics().is_empty());
        let paths: Vec<_> = diags.fixes().iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/work/a.py"), PathBuf::from("/work/b.py")]);
        assert_eq!(diags.fixes()[0].1.parse_hunks().unwrap().len(), 1);
    }

    #[test]
    fn test_null_diffs_yield_no_fixes() {
        let result = json!({"results": {"cli": [{
            "severity": 1, "message": "m", "origin": "o",
            "affected_code": [], "diffs": null,
        }]}});
        assert!(translate(result).fixes().is_empty());
    }

    #[test]
    fn test_empty_result() {
        let diags = translate(json!({"results": {}}));
        assert_eq!(diags, Diagnostics::default());
    }

    #[test]
    fn test_malformed_json_is_error() {
        let err = Diagnostics::from_engine_result("not json", "coala").unwrap_err();
        assert!(matches!(err, CoreError::EngineOutput(_)));

        let err = Diagnostics::from_engine_result(r#"{"results": {"a": 3}}"#, "coala").unwrap_err();
        assert!(matches!(err, CoreError::EngineOutput(_)));
    }

    #[test]
    fn test_severity_serializes_as_number() {
        assert_eq!(serde_json::to_value(Severity::Warning).unwrap(), json!(2));
        let back: Severity = serde_json::from_value(json!(4)).unwrap();
        assert_eq!(back, Severity::Hint);
        assert!(serde_json::from_value::<Severity>(json!(9)).is_err());
    }
}
