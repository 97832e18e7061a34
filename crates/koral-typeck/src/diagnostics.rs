//! Ariadne-based rendering of semantic errors.
//!
//! Every diagnostic has an error code, a terse message, one label on the
//! error's span and a help line when a plausible fix exists. The JSON form
//! carries the same information plus 1-based line/column positions for
//! editor integrations.

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use koral_common::span::LineIndex;
use serde::Serialize;

use crate::error::{SemanticError, SemanticErrorKind, SolverError, VisibilityError};

/// Rendering options.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticOptions {
    pub color: bool,
}

impl DiagnosticOptions {
    /// Colorless output, for deterministic snapshots.
    pub fn colorless() -> Self {
        DiagnosticOptions { color: false }
    }

    pub fn from_config(config: &koral_common::CompilerConfig) -> Self {
        DiagnosticOptions {
            color: config.diagnostics.color,
        }
    }
}

/// The text under the primary label.
fn label_message(error: &SemanticError) -> String {
    match &error.kind {
        SemanticErrorKind::DuplicateDefinition { .. } => "declared again here".into(),
        SemanticErrorKind::UndefinedType { .. } => "not found in scope".into(),
        SemanticErrorKind::UndefinedVariable { .. } => "not found in scope".into(),
        SemanticErrorKind::UndefinedMember { member, .. } => format!("no member `{}`", member),
        SemanticErrorKind::UndefinedMethod { method, .. } => format!("no method `{}`", method),
        SemanticErrorKind::UnknownCase { case, .. } => format!("no case `{}`", case),
        SemanticErrorKind::UnknownTrait { .. } => "unknown trait".into(),
        SemanticErrorKind::TypeMismatch { expected, .. } => format!("expected {}", expected),
        SemanticErrorKind::InvalidArgumentCount { expected, .. } => {
            format!("expected {} argument(s)", expected)
        }
        SemanticErrorKind::InvalidOperation { .. } => "not allowed here".into(),
        SemanticErrorKind::NotAFunction { .. } => "called here".into(),
        SemanticErrorKind::RecursiveType { .. } => "contains itself by value".into(),
        SemanticErrorKind::MissingTraitMethod { method, .. } => format!("missing `{}`", method),
        SemanticErrorKind::NonExhaustiveMatch { .. } | SemanticErrorKind::MissingCatchAll { .. } => {
            "not all values are covered".into()
        }
        SemanticErrorKind::UnreachablePattern { .. } => "never matches".into(),
        SemanticErrorKind::Solver(SolverError::Unification { .. }) => "types do not agree".into(),
        SemanticErrorKind::Solver(SolverError::UnsolvedVariable { .. }) => {
            "type annotations needed".into()
        }
        SemanticErrorKind::Solver(SolverError::ConflictingConstraints { literal, .. }) => {
            format!("{} literal", literal)
        }
        SemanticErrorKind::Solver(SolverError::UnsatisfiedTraitBound { trait_name, .. }) => {
            format!("requires `{}`", trait_name)
        }
        SemanticErrorKind::Visibility(VisibilityError::RequiresModulePrefix { .. }) => {
            "needs a module prefix".into()
        }
        SemanticErrorKind::Visibility(VisibilityError::NotAccessible { .. }) => {
            "not accessible here".into()
        }
    }
}

/// Render one error against its source text.
pub fn render_diagnostic(
    error: &SemanticError,
    source: &str,
    _filename: &str,
    options: &DiagnosticOptions,
) -> String {
    let config = Config::default().with_color(options.color);
    let range = error.span.to_range(source.len());

    let mut builder = Report::build(ReportKind::Error, range.clone())
        .with_code(error.code())
        .with_message(error.to_string())
        .with_config(config)
        .with_label(
            Label::new(range)
                .with_message(label_message(error))
                .with_color(Color::Red),
        );
    if let Some(help) = error.help() {
        builder.set_help(help);
    }

    let mut buf = Vec::new();
    if builder.finish().write(Source::from(source), &mut buf).is_err() {
        return format!("error[{}]: {}", error.code(), error);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[derive(Debug, Serialize)]
struct JsonPosition {
    line: u32,
    column: u32,
}

#[derive(Debug, Serialize)]
struct JsonDiagnostic<'e> {
    code: &'static str,
    message: String,
    file: &'e str,
    start: JsonPosition,
    end: JsonPosition,
    #[serde(skip_serializing_if = "Option::is_none")]
    help: Option<String>,
    kind: &'e SemanticErrorKind,
}

/// The error as a single-line JSON object.
pub fn render_json(error: &SemanticError, source: &str, filename: &str) -> String {
    let index = LineIndex::new(source);
    let position = |offset: u32| {
        let (line, column) = index.line_col(offset.min(source.len() as u32));
        JsonPosition { line, column }
    };
    let diagnostic = JsonDiagnostic {
        code: error.code(),
        message: error.to_string(),
        file: filename,
        start: position(error.span.start),
        end: position(error.span.end),
        help: error.help(),
        kind: &error.kind,
    };
    serde_json::to_string(&diagnostic)
        .unwrap_or_else(|e| format!("{{\"code\":\"{}\",\"message\":\"{}\"}}", error.code(), e))
}
