use std::{fmt, str::FromStr};

use serde_json::{Number, Value};
use thiserror::Error;

/// Comparison applied between a value read from the request and an expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

#[derive(Error, Debug, PartialEq)]
#[error("Unknown condition `{0}`")]
pub struct UnknownCondition(pub String);

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Equal => "Equal",
            Condition::NotEqual => "NotEqual",
            Condition::Contains => "Contains",
            Condition::NotContains => "NotContains",
            Condition::StartsWith => "StartsWith",
            Condition::EndsWith => "EndsWith",
            Condition::GreaterThan => "GreaterThan",
            Condition::LessThan => "LessThan",
            Condition::GreaterThanOrEqual => "GreaterThanOrEqual",
            Condition::LessThanOrEqual => "LessThanOrEqual",
        }
    }

    /// Never fails: comparisons that cannot be satisfied are simply false.
    pub fn evaluate(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            Condition::Equal => values_equal(actual, expected),
            Condition::NotEqual => !values_equal(actual, expected),
            Condition::GreaterThan => compare_numbers(actual, expected, |a, b| a > b),
            Condition::LessThan => compare_numbers(actual, expected, |a, b| a < b),
            Condition::GreaterThanOrEqual => compare_numbers(actual, expected, |a, b| a >= b),
            Condition::LessThanOrEqual => compare_numbers(actual, expected, |a, b| a <= b),
            Condition::Contains => compare_strings(actual, expected, |a, b| a.contains(b)),
            Condition::NotContains => compare_strings(actual, expected, |a, b| !a.contains(b)),
            Condition::StartsWith => compare_strings(actual, expected, |a, b| a.starts_with(b)),
            Condition::EndsWith => compare_strings(actual, expected, |a, b| a.ends_with(b)),
        }
    }
}

impl FromStr for Condition {
    type Err = UnknownCondition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let condition = match s {
            "Equal" => Condition::Equal,
            "NotEqual" => Condition::NotEqual,
            "Contains" => Condition::Contains,
            "NotContains" => Condition::NotContains,
            "StartsWith" => Condition::StartsWith,
            "EndsWith" => Condition::EndsWith,
            "GreaterThan" => Condition::GreaterThan,
            "LessThan" => Condition::LessThan,
            "GreaterThanOrEqual" => Condition::GreaterThanOrEqual,
            "LessThanOrEqual" => Condition::LessThanOrEqual,
            other => return Err(UnknownCondition(String::from(other))),
        };
        Ok(condition)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return a.is_null() && b.is_null();
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn compare_numbers(a: &Value, b: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn compare_strings(a: &Value, b: &Value, cmp: impl Fn(&str, &str) -> bool) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    cmp(&stringify(a), &stringify(b))
}

/// Default textual form of a loosely-typed value.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => format_number(n),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn format_number(n: &Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                return (f as i64).to_string();
            }
        }
    }
    n.to_string()
}
