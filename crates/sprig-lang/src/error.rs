use crate::syntax::ast::Span;

/// Diagnostic codes prefixed by class: G = grammar definition, W = warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    G001, // malformed loop range
    G002, // duplicate switch case value
    G003, // parameter count mismatch
    G004, // unresolved shape reference
    G005, // percentage weights exceed 100%
    G006, // shape replacement inside a path
    G007, // path operation outside a path
    G008, // shape has no rules
    G009, // malformed path operator arguments
    G010, // duplicate definition in one frame
    G011, // duplicate shape name
    G012, // undefined variable or function

    W001, // non-positive rule weight normalized to 1.0
}

impl ErrorCode {
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::W001)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::G001 => "G001",
            Self::G002 => "G002",
            Self::G003 => "G003",
            Self::G004 => "G004",
            Self::G005 => "G005",
            Self::G006 => "G006",
            Self::G007 => "G007",
            Self::G008 => "G008",
            Self::G009 => "G009",
            Self::G010 => "G010",
            Self::G011 => "G011",
            Self::G012 => "G012",
            Self::W001 => "W001",
        }
    }
}

/// Grammar-definition diagnostic tied to a source location.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{}] {line}:{column}: {message}", .code.as_str())]
pub struct Error {
    pub code: ErrorCode,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self { code, line, column, message: message.into() }
    }

    pub fn at(code: ErrorCode, span: &Span, message: impl Into<String>) -> Self {
        Self::new(code, span.line, span.column, message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────

/// Failure raised while expanding a grammar.
///
/// `Eval` failures belong to one shape instance and a renderer may choose to
/// skip it. `Internal` and `Aborted` end the render.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// A grammar-definition error only detectable on first use.
    #[error("{0}")]
    Grammar(Error),

    #[error("[runtime] {}:{}: {message}", .span.line, .span.column)]
    Eval { span: Span, message: String },

    /// Broken engine invariant, e.g. an unbalanced parameter stack.
    #[error("[internal] {0}")]
    Internal(String),

    #[error("render aborted by renderer")]
    Aborted,
}

impl RuntimeError {
    pub fn eval(span: &Span, message: impl Into<String>) -> Self {
        Self::Eval { span: span.clone(), message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Aborted)
    }

    /// Source line of the offending node, when there is one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Grammar(e)       => Some(e.line),
            Self::Eval { span, .. } => Some(span.line),
            _ => None,
        }
    }
}

impl From<Error> for RuntimeError {
    fn from(e: Error) -> Self { Self::Grammar(e) }
}
