//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use sherwave_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    #[error("values file not found: {path}")]
    #[diagnostic(code(sherwave::values::missing))]
    MissingValues { path: String },

    #[error("invalid manifest in {template}: {message}")]
    #[diagnostic(code(sherwave::render::manifest))]
    Manifest { template: String, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A template failed to parse or render
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(sherwave::template::render))]
pub struct TemplateError {
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    pub fn from_minijinja(err: minijinja::Error, template_name: &str, source: &str) -> Self {
        let span = err.line().and_then(|line| line_span(source, line));
        let suggestion = match err.kind() {
            minijinja::ErrorKind::UndefinedError => Some(
                "Check the key exists in the values, or guard it with `| default(...)`".to_string(),
            ),
            minijinja::ErrorKind::UnknownFilter => Some(
                "Available filters: toyaml, tojson, quote, squote, b64encode, b64decode, indent, nindent, required, sha256, default"
                    .to_string(),
            ),
            _ => None,
        };

        Self {
            message: err.to_string().replace("undefined value", "undefined variable"),
            src: NamedSource::new(template_name, source.to_string()),
            span,
            suggestion,
        }
    }
}

/// Span covering a whole 1-based source line
fn line_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (idx, line) in source.lines().enumerate() {
        if idx + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_span() {
        let src = "a: 1\nbb: {{ x }}\nc: 3";
        let span = line_span(src, 2).unwrap();
        assert_eq!(span.offset(), 5);
        assert_eq!(span.len(), 11);
        assert!(line_span(src, 9).is_none());
    }
}
