pub mod config;
pub mod environment;
pub mod error;
pub mod interpret;
pub mod output;
pub mod registry;
pub mod stdlib;
pub mod value;

use interpret::Interpreter;
use log::{trace, warn};
use mtscript_syntax::{compile, error::Diagnostic};
use value::Value;

/// Compile and evaluate `source`. A script with syntax errors is never
/// run, even when the parse mode recovered a partial AST.
pub fn run(source: &str, interpreter: &mut Interpreter) -> Result<Value, Vec<Diagnostic>> {
    let parsed = compile(source, interpreter.config().parse_mode)?;
    if parsed.has_errors() {
        return Err(parsed
            .diagnostics
            .into_iter()
            .filter(Diagnostic::is_error)
            .collect());
    }
    for warning in &parsed.diagnostics {
        warn!("{warning}");
    }
    trace!("Interpreting {:#?}", parsed.ast);
    interpreter.evaluate(&parsed.ast).map_err(|e| vec![e])
}
