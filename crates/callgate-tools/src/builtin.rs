use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name of the left operand argument
pub const LEFT_OPERAND: &str = "a";
/// Name of the right operand argument
pub const RIGHT_OPERAND: &str = "b";

/// Fixed registry of builtin functions.
///
/// Each function takes two named operands, `a` and `b`, coercible to `f64`
/// from a JSON float, integer or numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BuiltinFunction {
    pub const ALL: [BuiltinFunction; 4] = [
        BuiltinFunction::Add,
        BuiltinFunction::Subtract,
        BuiltinFunction::Multiply,
        BuiltinFunction::Divide,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BuiltinFunction::Add => "add",
            BuiltinFunction::Subtract => "subtract",
            BuiltinFunction::Multiply => "multiply",
            BuiltinFunction::Divide => "divide",
        }
    }

    /// Evaluate the function over the `a` and `b` entries of `arguments`.
    ///
    /// # Errors
    ///
    /// - [`BuiltinError::MissingArgument`] / [`BuiltinError::Coercion`] when an
    ///   operand is absent or not numeric
    /// - [`BuiltinError::DivisionByZero`] for `divide` with `b == 0`
    pub fn evaluate(self, arguments: &Map<String, Value>) -> Result<f64, BuiltinError> {
        let a = coerce_operand(arguments, LEFT_OPERAND)?;
        let b = coerce_operand(arguments, RIGHT_OPERAND)?;
        match self {
            BuiltinFunction::Add => Ok(a + b),
            BuiltinFunction::Subtract => Ok(a - b),
            BuiltinFunction::Multiply => Ok(a * b),
            BuiltinFunction::Divide if b == 0.0 => Err(BuiltinError::DivisionByZero),
            BuiltinFunction::Divide => Ok(a / b),
        }
    }
}

impl FromStr for BuiltinFunction {
    type Err = BuiltinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuiltinFunction::ALL
            .into_iter()
            .find(|function| function.as_str() == s)
            .ok_or_else(|| BuiltinError::UnknownFunction(s.to_string()))
    }
}

impl fmt::Display for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coerce one named operand to a finite `f64`
pub fn coerce_operand(
    arguments: &Map<String, Value>,
    name: &'static str,
) -> Result<f64, BuiltinError> {
    let value = arguments
        .get(name)
        .ok_or(BuiltinError::MissingArgument(name))?;

    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    number
        .filter(|n| n.is_finite())
        .ok_or_else(|| BuiltinError::Coercion {
            argument: name,
            found: value.to_string(),
        })
}

/// Canonical string form of a numeric result (`5`, not `5.0`)
pub fn format_result(value: f64) -> String {
    value.to_string()
}

/// Builtin evaluation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuiltinError {
    #[error("unknown builtin function '{0}'")]
    UnknownFunction(String),

    #[error("missing argument '{0}'")]
    MissingArgument(&'static str),

    #[error("argument '{argument}' is not a number: {found}")]
    Coercion { argument: &'static str, found: String },

    #[error("division by zero")]
    DivisionByZero,
}

impl BuiltinError {
    /// Whether the error is a business or validation failure that should end
    /// the tool call, rather than an operand problem left for redelivery
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuiltinError::UnknownFunction(_) | BuiltinError::DivisionByZero
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[rstest]
    #[case("add", json!({"a": 2, "b": 3}), "5")]
    #[case("subtract", json!({"a": 2.5, "b": 1}), "1.5")]
    #[case("multiply", json!({"a": "4", "b": -2}), "-8")]
    #[case("divide", json!({"a": 10, "b": 2}), "5")]
    #[case("divide", json!({"a": 1, "b": 4}), "0.25")]
    fn test_evaluate(#[case] function: &str, #[case] input: Value, #[case] expected: &str) {
        let function: BuiltinFunction = function.parse().unwrap();
        let value = function.evaluate(&args(input)).unwrap();
        assert_eq!(format_result(value), expected);
    }

    #[test]
    fn test_divide_by_zero_is_terminal() {
        let err = BuiltinFunction::Divide
            .evaluate(&args(json!({"a": 1, "b": 0})))
            .unwrap_err();
        assert_eq!(err, BuiltinError::DivisionByZero);
        assert!(err.is_terminal());
        assert_eq!(err.to_string(), "division by zero");
    }

    #[rstest]
    #[case(json!({"a": "two", "b": 3}))]
    #[case(json!({"a": true, "b": 3}))]
    #[case(json!({"a": null, "b": 3}))]
    #[case(json!({"a": 1, "b": "NaN"}))]
    #[case(json!({"a": 1}))]
    fn test_operand_problems_are_not_terminal(#[case] input: Value) {
        let err = BuiltinFunction::Add.evaluate(&args(input)).unwrap_err();
        assert!(!err.is_terminal(), "{err}");
    }

    #[test]
    fn test_unknown_function() {
        let err = "modulo".parse::<BuiltinFunction>().unwrap_err();
        assert_eq!(err, BuiltinError::UnknownFunction("modulo".into()));
        assert!(err.is_terminal());
    }
}
