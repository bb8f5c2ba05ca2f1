use std::fmt::Display;

use crate::token::Span;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SyntaxError,
    UndefinedVariable,
    TypeMismatch,
    ArityMismatch,
    UnknownFunction,
    DivisionByZero,
    RuntimeLimitExceeded,
    InvalidControlFlow,
    IndexOutOfRange,
    ConstantReassignment,
    HostError,
    /// The concrete tree handed to the AST builder did not have the
    /// shape the parser promises. Never caused by user input.
    MalformedTree,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::SyntaxError => "syntax error",
            Self::UndefinedVariable => "undefined variable",
            Self::TypeMismatch => "type mismatch",
            Self::ArityMismatch => "arity mismatch",
            Self::UnknownFunction => "unknown function",
            Self::DivisionByZero => "division by zero",
            Self::RuntimeLimitExceeded => "runtime limit exceeded",
            Self::InvalidControlFlow => "invalid control flow",
            Self::IndexOutOfRange => "index out of range",
            Self::ConstantReassignment => "constant reassignment",
            Self::HostError => "host error",
            Self::MalformedTree => "internal error",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One entry of a runtime call stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub function: String,
    pub call_site: Span,
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "in {} called at {}", self.function, self.call_site.start)
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{kind} at {}: {message}", .span.start)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    /// Innermost-first call stack, captured where a runtime error was
    /// raised. `None` for lexing/parsing diagnostics.
    pub trace: Option<Vec<Frame>>,
}

impl Diagnostic {
    pub fn error(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            span,
            trace: None,
        }
    }

    pub fn warning(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, message, span)
        }
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::error(ErrorKind::SyntaxError, message, span)
    }

    pub fn with_trace(mut self, trace: Vec<Frame>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Whether evaluation was aborted for exhausting a budget rather
    /// than because the script is wrong.
    pub fn is_limit(&self) -> bool {
        self.kind == ErrorKind::RuntimeLimitExceeded
    }

    /// Multi-line rendering including the call stack, if any.
    pub fn report(&self) -> String {
        let mut out = format!(
            "{}{self}",
            match self.severity {
                Severity::Error => "",
                Severity::Warning => "warning: ",
            }
        );
        for frame in self.trace.iter().flatten() {
            out.push_str("\n    ");
            out.push_str(&frame.to_string());
        }
        out
    }
}

/// Lexer messages.
#[derive(Debug)]
pub enum ErrorMsg {
    UnexpectedChar,
    UnterminatedString,
    UnknownEscape,
    InvalidNumber,
}

impl Display for ErrorMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::UnexpectedChar => "unexpected character",
            Self::UnterminatedString => "unterminated string",
            Self::UnknownEscape => "unknown escape sequence",
            Self::InvalidNumber => "invalid number literal",
        })
    }
}
