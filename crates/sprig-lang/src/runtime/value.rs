use smallvec::SmallVec;

use crate::syntax::ast::ExpType;
use crate::types::draw::Modification;

/// Numeric vectors are short (points, colors, loop ranges).
pub type Numbers = SmallVec<[f64; 4]>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Flag(bool),
    /// Numeric vector of width two or more.
    Tuple(Numbers),
    Mod(Box<Modification>),
}

impl Value {
    pub fn exp_type(&self) -> ExpType {
        match self {
            Value::Number(_) | Value::Tuple(_) => ExpType::Numeric,
            Value::Flag(_) => ExpType::Flag,
            Value::Mod(_)  => ExpType::Mod,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Value::Tuple(v) => v.len(),
            _ => 1,
        }
    }

    /// Build a numeric value, collapsing one-element vectors to a number.
    pub fn from_numbers(v: Numbers) -> Value {
        if v.len() == 1 { Value::Number(v[0]) } else { Value::Tuple(v) }
    }

    /// Flatten a numeric value into its components.
    pub fn numbers(&self) -> Option<Numbers> {
        match self {
            Value::Number(x) => Some(smallvec::smallvec![*x]),
            Value::Tuple(v)  => Some(v.clone()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Tuple(v) => format!("number[{}]", v.len()),
            other => other.exp_type().name().to_string(),
        }
    }
}
