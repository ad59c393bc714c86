//! Runtime values and arithmetic.

use std::cmp::Ordering;
use std::fmt;

use crate::script::error::RuntimeError;
use crate::script::lexer::Operator;
use crate::script::nodes::format_double;

/// A value on the echo stack or bound to a loop variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Double(f64),
    Text(String),
}

impl Value {
    /// Coerce to a number: integers and doubles as-is, text parsed as an
    /// integer first and as a double second.
    pub fn to_number(&self) -> Result<Number, RuntimeError> {
        match self {
            Value::Integer(value) => Ok(Number::Integer(*value)),
            Value::Double(value) => Ok(Number::Double(*value)),
            Value::Text(text) => Number::parse(text),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{value}"),
            Value::Double(value) => f.write_str(&format_double(*value)),
            Value::Text(text) => f.write_str(text),
        }
    }
}

impl From<Number> for Value {
    fn from(number: Number) -> Self {
        match number {
            Number::Integer(value) => Value::Integer(value),
            Number::Double(value) => Value::Double(value),
        }
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

/// A numeric value after coercion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Double(f64),
}

impl Number {
    pub fn parse(text: &str) -> Result<Self, RuntimeError> {
        if let Ok(value) = text.parse::<i64>() {
            return Ok(Number::Integer(value));
        }
        text.parse::<f64>()
            .map(Number::Double)
            .map_err(|_| RuntimeError::NotANumber {
                value: text.to_string(),
            })
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(value) => value as f64,
            Number::Double(value) => value,
        }
    }

    pub fn is_negative(self) -> bool {
        match self {
            Number::Integer(value) => value < 0,
            Number::Double(value) => value < 0.0,
        }
    }

    /// Integer arithmetic when both sides are integers, double otherwise.
    pub fn apply(self, operator: Operator, rhs: Number) -> Result<Number, RuntimeError> {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => {
                let result = match operator {
                    Operator::Add => a.checked_add(b),
                    Operator::Sub => a.checked_sub(b),
                    Operator::Mul => a.checked_mul(b),
                    Operator::Div if b == 0 => return Err(RuntimeError::DivisionByZero),
                    Operator::Div => a.checked_div(b),
                };
                result
                    .map(Number::Integer)
                    .ok_or(RuntimeError::Overflow {
                        operator: operator.symbol(),
                    })
            }
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                Ok(Number::Double(match operator {
                    Operator::Add => a + b,
                    Operator::Sub => a - b,
                    Operator::Mul => a * b,
                    Operator::Div => a / b,
                }))
            }
        }
    }

    pub fn compare(self, other: Number) -> Ordering {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a.cmp(&b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }
}
