pub mod ast;
pub mod build;
pub mod error;
pub mod lex;
pub mod parse;
pub mod token;

use ast::Ast;
use error::Diagnostic;
use log::trace;
use parse::{ParseMode, Parser};

/// A successfully built script, plus the diagnostics that did not stop
/// it: warnings, and in lenient mode the syntax errors recovered from.
#[derive(Debug)]
pub struct Parsed {
    pub ast: Ast,
    pub diagnostics: Vec<Diagnostic>,
}

impl Parsed {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Lex, parse and build `source`. In strict mode the first error is
/// returned on its own; in lenient mode the partial AST comes back with
/// every diagnostic, sorted by position.
pub fn compile(source: &str, mode: ParseMode) -> Result<Parsed, Vec<Diagnostic>> {
    trace!("Lexing {source}");
    let (tokens, mut diagnostics) = lex::tokenize(source);
    if mode == ParseMode::Strict {
        if let Some(e) = diagnostics.iter().find(|d| d.is_error()) {
            return Err(vec![e.clone()]);
        }
    }

    trace!("Parsing {tokens:#?}");
    let output = Parser::new(&tokens, mode)
        .parse_all()
        .map_err(|e| vec![e])?;
    diagnostics.extend(output.diagnostics);
    diagnostics.sort_by_key(|d| d.span.start.offset);

    trace!("Building {:#?}", output.tree);
    let ast = build::build(output.tree).map_err(|e| vec![e])?;
    Ok(Parsed { ast, diagnostics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Severity};

    #[test]
    fn strict_returns_first_error() {
        let errors = compile("a = ; b = ;", ParseMode::Strict).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::SyntaxError);
        assert_eq!(errors[0].span.start.column, 5);
    }

    #[test]
    fn strict_reports_lexical_errors() {
        let errors = compile("x = 1 # 2;", ParseMode::Strict).unwrap_err();
        assert_eq!(errors[0].message, "unexpected character #");
    }

    #[test]
    fn lenient_returns_partial_ast() {
        let parsed = compile("a = 1; b = ; c = 3 $;", ParseMode::Lenient).unwrap();
        assert!(parsed.has_errors());
        assert_eq!(parsed.ast.body.len(), 2);
        let offsets: Vec<usize> = parsed
            .diagnostics
            .iter()
            .map(|d| d.span.start.offset)
            .collect();
        let mut sorted = offsets.clone();
        sorted.sort();
        assert_eq!(offsets, sorted);
    }

    #[test]
    fn unterminated_string_is_reported() {
        let source = "x = 'abc\ny = 2;";
        let parsed = compile(source, ParseMode::Lenient).unwrap();
        let first = &parsed.diagnostics[0];
        assert_eq!(first.kind, ErrorKind::SyntaxError);
        assert_eq!(first.span.start.offset, 4);
        assert!(compile(source, ParseMode::Strict).is_err());
    }

    #[test]
    fn warnings_do_not_fail_strict() {
        let parsed = compile("'\\q'", ParseMode::Strict).unwrap();
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].severity, Severity::Warning);
        assert!(!parsed.has_errors());
    }
}
