use crate::error::ReconcileError;
use crate::projection::{Outcome, detail};
use callgate_tools::{BuiltinError, BuiltinFunction, format_result};
use serde_json::{Map, Value};

/// Evaluate builtin `function` over the parsed arguments.
///
/// An unknown function name and division by zero end the request; operand
/// problems are returned uncommitted.
pub(crate) fn execute(
    function: &str,
    arguments: &Map<String, Value>,
) -> Result<Outcome, ReconcileError> {
    let evaluated = function
        .parse::<BuiltinFunction>()
        .and_then(|builtin| Ok((builtin, builtin.evaluate(arguments)?)));

    match evaluated {
        Ok((builtin, value)) => Ok(Outcome::succeeded(
            Some(format_result(value)),
            format!("builtin {builtin} evaluated"),
        )),
        Err(err) if err.is_terminal() => Ok(terminal_outcome(&err)),
        Err(err) => Err(ReconcileError::Builtin(err)),
    }
}

fn terminal_outcome(err: &BuiltinError) -> Outcome {
    match err {
        BuiltinError::DivisionByZero => Outcome::failed(detail::DIVISION_BY_ZERO, err.to_string()),
        _ => Outcome::invalid(detail::UNKNOWN_BUILTIN, err.to_string()),
    }
}
