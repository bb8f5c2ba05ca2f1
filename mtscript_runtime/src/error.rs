use std::fmt::Display;

use mtscript_syntax::{
    error::{Diagnostic, ErrorKind},
    token::Span,
};

use crate::value::Value;

/// Everything that unwinds the evaluator. Only `Error` is a failure;
/// the other variants are control flow absorbed by the nearest function
/// or loop.
#[derive(Debug)]
pub enum Exception {
    Error(Diagnostic),
    Return(Value, Span),
    Break(Span),
    Continue(Span),
}

impl Display for Exception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::Return(val, _) => write!(f, "return {val}"),
            Self::Break(_) => f.write_str("break"),
            Self::Continue(_) => f.write_str("continue"),
        }
    }
}

impl From<Diagnostic> for Exception {
    fn from(e: Diagnostic) -> Self {
        Self::Error(e)
    }
}

impl Exception {
    /// Turn a control signal that escaped every construct able to
    /// absorb it into an error.
    pub fn into_diagnostic(self) -> Diagnostic {
        match self {
            Self::Error(e) => e,
            Self::Return(_, span) => make(ErrorMsg::ReturnOutsideFunction, span),
            Self::Break(span) => make(ErrorMsg::BreakOutsideLoop, span),
            Self::Continue(span) => make(ErrorMsg::ContinueOutsideLoop, span),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMsg {
    // Type errors
    ExpectedNumber,
    NotIndexable,
    NonIntegerIndex,
    InvalidTarget,
    // Arithmetic
    DivisionByZero,
    // Scope errors
    UndefinedVar,
    ConstantAssign,
    UnknownFunction,
    DeadScope,
    WrongArity,
    IndexOutOfRange,
    // Control flow
    ReturnOutsideFunction,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    // Limits
    StepLimit,
    DepthLimit,
    NestingLimit,
}

impl Display for ErrorMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ExpectedNumber => "expected a numeric operand, found",
            Self::NotIndexable => "cannot index into",
            Self::NonIntegerIndex => "list index must be an integer, found",
            Self::InvalidTarget => "cannot assign to",
            Self::DivisionByZero => "right operand is zero for",
            Self::UndefinedVar => "no variable named",
            Self::ConstantAssign => "cannot assign to constant",
            Self::UnknownFunction => "no function named",
            Self::DeadScope => "defining scope is gone for function",
            Self::WrongArity => "wrong number of arguments for",
            Self::IndexOutOfRange => "list index out of range:",
            Self::ReturnOutsideFunction => "'return' outside of a function",
            Self::BreakOutsideLoop => "'break' outside of a loop",
            Self::ContinueOutsideLoop => "'continue' outside of a loop",
            Self::StepLimit => "step budget exhausted after",
            Self::DepthLimit => "call depth limit reached at",
            Self::NestingLimit => "evaluation nested deeper than",
        })
    }
}

impl ErrorMsg {
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::ExpectedNumber | Self::NotIndexable | Self::NonIntegerIndex | Self::InvalidTarget => {
                ErrorKind::TypeMismatch
            }
            Self::DivisionByZero => ErrorKind::DivisionByZero,
            Self::UndefinedVar => ErrorKind::UndefinedVariable,
            Self::ConstantAssign => ErrorKind::ConstantReassignment,
            Self::UnknownFunction | Self::DeadScope => ErrorKind::UnknownFunction,
            Self::WrongArity => ErrorKind::ArityMismatch,
            Self::IndexOutOfRange => ErrorKind::IndexOutOfRange,
            Self::ReturnOutsideFunction | Self::BreakOutsideLoop | Self::ContinueOutsideLoop => {
                ErrorKind::InvalidControlFlow
            }
            Self::StepLimit | Self::DepthLimit | Self::NestingLimit => {
                ErrorKind::RuntimeLimitExceeded
            }
        }
    }
}

pub fn make(msg: ErrorMsg, span: Span) -> Diagnostic {
    Diagnostic::error(msg.kind(), msg.to_string(), span)
}

pub fn make_with(msg: ErrorMsg, detail: impl Display, span: Span) -> Diagnostic {
    Diagnostic::error(msg.kind(), format!("{msg} {detail}"), span)
}

pub fn runtime_error(msg: ErrorMsg, detail: impl Display, span: Span) -> Exception {
    Exception::Error(make_with(msg, detail, span))
}

/// Failure reported by a host function. The evaluator attaches the
/// call site and the call stack.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct HostError {
    pub kind: ErrorKind,
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::HostError,
            message: message.into(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::TypeMismatch,
            message: message.into(),
        }
    }
}

/// Host misconfiguration of a function registry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("function '{0}' is already registered")]
    Duplicate(String),
}
