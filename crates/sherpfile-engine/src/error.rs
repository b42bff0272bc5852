//! Engine error types with source-mapped template diagnostics

use std::path::PathBuf;

use miette::{Diagnostic, NamedSource, SourceSpan};
use sherpfile_core::CoreError;
use thiserror::Error;

use crate::suggestions::{
    extract_name_after, suggest_undefined_variable, suggest_unknown_filter, suggest_unknown_function,
};

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(code(sherpfile::core))]
    Core(#[from] CoreError),

    #[error("failed to render part {part} of {}", file.display())]
    #[diagnostic(code(sherpfile::engine::render))]
    Render {
        file: PathBuf,
        part: usize,
        #[source]
        #[diagnostic_source]
        source: TemplateError,
    },

    #[error("failed to render values file {}", file.display())]
    #[diagnostic(code(sherpfile::engine::values_template))]
    ValuesTemplate {
        file: PathBuf,
        #[source]
        #[diagnostic_source]
        source: TemplateError,
    },

    #[error("failed to parse part {part} of {}: {message}", file.display())]
    #[diagnostic(code(sherpfile::engine::parse))]
    Parse {
        file: PathBuf,
        part: usize,
        message: String,
    },

    #[error("failed to parse values file {}: {message}", file.display())]
    #[diagnostic(code(sherpfile::engine::values))]
    ValuesFile { file: PathBuf, message: String },

    #[error("environment '{name}' is not defined in {}", file.display())]
    #[diagnostic(
        code(sherpfile::engine::undefined_environment),
        help("declare it under `environments:` or pick another with --environment")
    )]
    UndefinedEnvironment { name: String, file: PathBuf },

    #[error("base {} declares its own bases; only one level of bases is supported", base.display())]
    #[diagnostic(code(sherpfile::engine::nested_base))]
    NestedBase { base: PathBuf },

    #[error("release '{release}' in part {part} of {} has an empty chart", file.display())]
    #[diagnostic(code(sherpfile::engine::empty_chart))]
    EmptyChart {
        release: String,
        part: usize,
        file: PathBuf,
    },

    #[error("namespace is set both by --namespace and by `namespace:` in {}", file.display())]
    #[diagnostic(
        code(sherpfile::engine::namespace_conflict),
        help("remove one of them")
    )]
    ConflictingNamespace { file: PathBuf },

    #[error("kube context is set both by --kube-context and by `helmDefaults.kubeContext` in {}", file.display())]
    #[diagnostic(
        code(sherpfile::engine::kube_context_conflict),
        help("remove one of them")
    )]
    ConflictingKubeContext { file: PathBuf },

    #[error("helmfile {} includes itself through '{pattern}'", file.display())]
    #[diagnostic(code(sherpfile::engine::recursion))]
    RecursiveHelmfile { file: PathBuf, pattern: String },

    #[error("no file matches '{pattern}' referenced from {}", file.display())]
    #[diagnostic(
        code(sherpfile::engine::no_match),
        help("set `missingFileHandler: Warn` to skip unmatched helmfiles")
    )]
    NoMatchingFiles { pattern: String, file: PathBuf },

    #[error("environment values file matching '{pattern}' does not exist (from {})", file.display())]
    #[diagnostic(
        code(sherpfile::engine::missing_values),
        help("set `missingFileHandler: Warn` on the environment to skip missing files")
    )]
    MissingValuesFile { pattern: String, file: PathBuf },

    #[error("no helmfile found in {}", dir.display())]
    #[diagnostic(
        code(sherpfile::engine::no_document),
        help("name it helmfile.yaml, put documents in helmfile.d/, or pass --file")
    )]
    NoDocument { dir: PathBuf },

    #[error("both {} and {} exist", file.display(), dir.display())]
    #[diagnostic(
        code(sherpfile::engine::ambiguous_document),
        help("keep only one of them, or pass --file")
    )]
    AmbiguousDocument { file: PathBuf, dir: PathBuf },
}

impl EngineError {
    /// Whether this is an undefined-environment error
    pub fn is_undefined_environment(&self) -> bool {
        matches!(self, EngineError::UndefinedEnvironment { .. })
    }
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    InvalidOperation,
    Other,
}

/// Template-specific error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(sherpfile::template))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Build from a MiniJinja error, with suggestions drawn from `values`
    pub fn from_minijinja(
        err: minijinja::Error,
        template_name: &str,
        template_source: &str,
        values: Option<&serde_json::Value>,
    ) -> Self {
        let kind = categorize(&err);
        let detailed = format!("{:#}", err);
        let expression = extract_expression(&detailed);

        let message = match (kind, &expression) {
            (TemplateErrorKind::UndefinedVariable, Some(expr)) => format!("undefined variable `{}`", expr),
            _ => err
                .detail()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string())
                .replace("undefined value", "undefined variable"),
        };

        let suggestion = match kind {
            TemplateErrorKind::UndefinedVariable => expression
                .as_deref()
                .and_then(|expr| suggest_undefined_variable(expr, values))
                .or_else(|| Some("Check spelling or use the `default` filter.".to_string())),
            TemplateErrorKind::UnknownFilter => unknown_name(&err).and_then(|name| suggest_unknown_filter(&name)),
            TemplateErrorKind::UnknownFunction => {
                unknown_name(&err).and_then(|name| suggest_unknown_function(&name))
            }
            TemplateErrorKind::SyntaxError => Some(
                "Check bracket matching: `{{ }}` for expressions, `{% %}` for statements".to_string(),
            ),
            _ => None,
        };

        let span = err.line().and_then(|line| calculate_span(template_source, line));

        Self {
            message,
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion,
        }
    }

    /// Create an error without source mapping
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TemplateErrorKind::Other,
            src: NamedSource::new("<unknown>", String::new()),
            span: None,
            suggestion: None,
        }
    }
}

fn categorize(err: &minijinja::Error) -> TemplateErrorKind {
    match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        _ => TemplateErrorKind::Other,
    }
}

/// Name of the unknown filter or function
///
/// MiniJinja reports it in the detail, e.g. "filter toyml is unknown".
fn unknown_name(err: &minijinja::Error) -> Option<String> {
    let detail = err.detail()?;
    let detail = detail
        .strip_prefix("filter ")
        .or_else(|| detail.strip_prefix("function "))
        .unwrap_or(detail);
    extract_name_after(detail, "")
}

/// Pull the `{{ ... }}` expression off the line MiniJinja marks with `>`
///
/// MiniJinja's alternate display looks like:
/// ```text
///    8 >   tag: {{ values.image.tga }}
///      i          ^^^^^^^^^^^^^^^^ undefined value
/// ```
fn extract_expression(display: &str) -> Option<String> {
    let line = display.lines().find(|line| {
        let trimmed = line.trim_start();
        trimmed.contains(" > ") || trimmed.starts_with("> ")
    })?;
    let start = line.find("{{")?;
    let end = line[start..].find("}}")?;
    let expr = line[start + 2..start + end].trim();
    let expr = expr.split('|').next().unwrap_or(expr).trim();
    (!expr.is_empty()).then(|| expr.to_string())
}

/// Span covering line `line_num` (1-based) of `source`
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }
    None
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
