//! Maps lintserve-core values to LSP types.

use lintserve_core::{Diagnostic, Position, Range, Severity, TextEdit};
use tower_lsp::lsp_types::{
    Diagnostic as LspDiagnostic, DiagnosticSeverity, Position as LspPosition, Range as LspRange,
    TextEdit as LspTextEdit,
};

pub fn to_lsp_position(position: Position) -> LspPosition {
    LspPosition {
        line: position.line,
        character: position.character,
    }
}

pub fn to_lsp_range(range: Range) -> LspRange {
    LspRange {
        start: to_lsp_position(range.start),
        end: to_lsp_position(range.end),
    }
}

/// Range carried by an incremental change notification.
pub fn from_lsp_range(range: LspRange) -> Range {
    Range::new(
        Position::new(range.start.line, range.start.character),
        Position::new(range.end.line, range.end.character),
    )
}

pub fn to_lsp_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}

/// Convert a lintserve-core diagnostic to an LSP diagnostic.
///
/// Positions are already 0-based; only the container types change.
pub fn to_lsp_diagnostic(diag: &Diagnostic) -> LspDiagnostic {
    LspDiagnostic {
        range: to_lsp_range(diag.range),
        severity: Some(to_lsp_severity(diag.severity)),
        code: None,
        code_description: None,
        source: Some(diag.source.clone()),
        message: diag.message.clone(),
        related_information: None,
        tags: None,
        data: None,
    }
}

pub fn to_lsp_diagnostics(diagnostics: &[Diagnostic]) -> Vec<LspDiagnostic> {
    diagnostics.iter().map(to_lsp_diagnostic).collect()
}

pub fn to_lsp_text_edits(edits: &[TextEdit]) -> Vec<LspTextEdit> {
    edits
        .iter()
        .map(|edit| LspTextEdit {
            range: to_lsp_range(edit.range),
            new_text: edit.new_text.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_diagnostic(severity: Severity) -> Diagnostic {
        Diagnostic {
            severity,
            range: Range::new(Position::new(4, 2), Position::new(4, 9)),
            source: "coala".to_string(),
            message: "[python] PEP8Bear: The code does not comply to PEP8.".to_string(),
        }
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(to_lsp_severity(Severity::Error), DiagnosticSeverity::ERROR);
        assert_eq!(to_lsp_severity(Severity::Warning), DiagnosticSeverity::WARNING);
        assert_eq!(
            to_lsp_severity(Severity::Information),
            DiagnosticSeverity::INFORMATION
        );
        assert_eq!(to_lsp_severity(Severity::Hint), DiagnosticSeverity::HINT);
    }

    #[test]
    fn test_diagnostic_fields_carried_over() {
        let lsp = to_lsp_diagnostic(&make_diagnostic(Severity::Warning));

        assert_eq!(lsp.range.start, LspPosition::new(4, 2));
        assert_eq!(lsp.range.end, LspPosition::new(4, 9));
        assert_eq!(lsp.severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(lsp.source.as_deref(), Some("coala"));
        assert!(lsp.message.starts_with("[python] PEP8Bear:"));
        assert!(lsp.code.is_none());
        assert!(lsp.data.is_none());
    }

    #[test]
    fn test_core_and_lsp_wire_shapes_agree() {
        let core = make_diagnostic(Severity::Error);
        let lsp = to_lsp_diagnostic(&core);

        let core_json = serde_json::to_value(&core).unwrap();
        let lsp_json = serde_json::to_value(&lsp).unwrap();
        assert_eq!(core_json["range"], lsp_json["range"]);
        assert_eq!(core_json["severity"], lsp_json["severity"]);
        assert_eq!(core_json["message"], lsp_json["message"]);
    }

    #[test]
    fn test_text_edits() {
        let edits = vec![TextEdit {
            range: Range::spanning("a\nb\n"),
            new_text: "A\nb\n".to_string(),
        }];
        let lsp = to_lsp_text_edits(&edits);

        assert_eq!(lsp.len(), 1);
        assert_eq!(lsp[0].range.start, LspPosition::new(0, 0));
        assert_eq!(lsp[0].range.end, LspPosition::new(2, 0));
        assert_eq!(lsp[0].new_text, "A\nb\n");
    }

    #[test]
    fn test_change_range_conversion() {
        let lsp = LspRange::new(LspPosition::new(1, 3), LspPosition::new(2, 0));
        let range = from_lsp_range(lsp);
        assert_eq!(range.start, Position::new(1, 3));
        assert_eq!(range.end, Position::new(2, 0));
        assert_eq!(to_lsp_range(range), lsp);
    }

    #[test]
    fn test_empty_diagnostics() {
        assert!(to_lsp_diagnostics(&[]).is_empty());
    }
}
