//! Typed constructors for every instruction the control plane understands.
//!
//! Each function returns the wire form, ready to be passed to
//! [`Client::register_route`](crate::client::Client::register_route):
//!
//! ```no_run
//! use burattino::{condition::Condition, funcs::*};
//!
//! let script = vec![
//!     if_request_json_body_set_case("user.type", Condition::Equal, "vip", "vip"),
//!     extract_request_json_body("user.name", "NAME"),
//!     set_status_code("", 200),
//!     set_json_body("", r#"{"hello":"{{.NAME}}"}"#),
//!     set_json_body("vip", r#"{"hello":"{{.NAME}}","lounge":true}"#),
//! ];
//! ```

use serde_json::{Number, Value};

use crate::{
    condition::Condition,
    interchange::{func, group, HashAlgorithm, JsonType, ResponseFunc},
};

/// A literal argument, or a reference to a request variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// Rendered as `{{.Name}}` and resolved per request.
    Var(String),
}

/// Refers to a variable bound earlier in the same script.
pub fn var(name: impl Into<String>) -> Arg {
    Arg::Var(name.into())
}

impl Arg {
    pub fn into_value(self) -> Value {
        match self {
            Arg::Str(s) => Value::String(s),
            Arg::Int(i) => Value::from(i),
            Arg::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            Arg::Bool(b) => Value::Bool(b),
            Arg::Null => Value::Null,
            Arg::Var(name) => Value::String(format!("{{{{.{}}}}}", name)),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(String::from(value))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<()> for Arg {
    fn from(_: ()) -> Self {
        Arg::Null
    }
}

macro_rules! int_args {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Arg {
            fn from(value: $ty) -> Self {
                Arg::Int(i64::from(value))
            }
        })*
    };
}

int_args!(i8, i16, i32, i64, u8, u16, u32);

fn arg(value: impl Into<Arg>) -> Value {
    value.into().into_value()
}

fn text(value: &str) -> Value {
    Value::String(String::from(value))
}

fn prepare(name: &str, args: Vec<Value>) -> ResponseFunc {
    ResponseFunc::new(group::PREPARE_DATA, name, args)
}

fn generator(name: &str, args: Vec<Value>) -> ResponseFunc {
    ResponseFunc::new(group::GENERATOR, name, args)
}

fn dynamic(name: &str, args: Vec<Value>) -> ResponseFunc {
    ResponseFunc::new(group::DYNAMIC_VARIABLE, name, args)
}

fn setup(name: &str, case: &str, mut args: Vec<Value>) -> ResponseFunc {
    args.insert(0, text(case));
    ResponseFunc::new(group::SETUP_RESPONSE, name, args)
}

fn bind(mut args: Vec<Value>, variable: &str, to_be: impl Into<Arg>) -> Vec<Value> {
    args.push(text(variable));
    args.push(arg(to_be));
    args
}

fn set_case(mut args: Vec<Value>, case: &str) -> Vec<Value> {
    args.push(text(case));
    args
}

// Conditions that bind a variable when they hold.

pub fn if_request_header(
    header: &str,
    condition: Condition,
    value: impl Into<Arg>,
    variable: &str,
    to_be: impl Into<Arg>,
) -> ResponseFunc {
    let args = vec![text(header), text(condition.as_str()), arg(value)];
    prepare(func::IF_REQUEST_HEADER, bind(args, variable, to_be))
}

pub fn if_request_json_body(
    field: &str,
    condition: Condition,
    value: impl Into<Arg>,
    variable: &str,
    to_be: impl Into<Arg>,
) -> ResponseFunc {
    let args = vec![text(field), text(condition.as_str()), arg(value)];
    prepare(func::IF_REQUEST_JSON_BODY, bind(args, variable, to_be))
}

pub fn if_request_path(
    condition: Condition,
    value: impl Into<Arg>,
    variable: &str,
    to_be: impl Into<Arg>,
) -> ResponseFunc {
    let args = vec![text(condition.as_str()), arg(value)];
    prepare(func::IF_REQUEST_PATH, bind(args, variable, to_be))
}

pub fn if_request_query(
    param: &str,
    condition: Condition,
    value: impl Into<Arg>,
    variable: &str,
    to_be: impl Into<Arg>,
) -> ResponseFunc {
    let args = vec![text(param), text(condition.as_str()), arg(value)];
    prepare(func::IF_REQUEST_QUERY, bind(args, variable, to_be))
}

pub fn if_dynamic_variable(
    name: &str,
    condition: Condition,
    value: impl Into<Arg>,
    variable: &str,
    to_be: impl Into<Arg>,
) -> ResponseFunc {
    let args = vec![text(name), text(condition.as_str()), arg(value)];
    prepare(func::IF_DYNAMIC_VARIABLE, bind(args, variable, to_be))
}

pub fn if_request_json_array_length(
    field: &str,
    condition: Condition,
    length: u32,
    variable: &str,
    to_be: impl Into<Arg>,
) -> ResponseFunc {
    let args = vec![text(field), text(condition.as_str()), Value::from(length)];
    prepare(func::IF_REQUEST_JSON_ARRAY_LENGTH, bind(args, variable, to_be))
}

pub fn if_request_json_object_length(
    field: &str,
    condition: Condition,
    length: u32,
    variable: &str,
    to_be: impl Into<Arg>,
) -> ResponseFunc {
    let args = vec![text(field), text(condition.as_str()), Value::from(length)];
    prepare(func::IF_REQUEST_JSON_OBJECT_LENGTH, bind(args, variable, to_be))
}

pub fn if_request_json_type(
    field: &str,
    json_type: JsonType,
    variable: &str,
    to_be: impl Into<Arg>,
) -> ResponseFunc {
    let args = vec![text(field), text(json_type.as_str())];
    prepare(func::IF_REQUEST_JSON_TYPE, bind(args, variable, to_be))
}

// Conditions that switch the active case when they hold.

pub fn if_request_header_set_case(
    header: &str,
    condition: Condition,
    value: impl Into<Arg>,
    case: &str,
) -> ResponseFunc {
    let args = vec![text(header), text(condition.as_str()), arg(value)];
    prepare(func::IF_REQUEST_HEADER_SET_CASE, set_case(args, case))
}

pub fn if_request_json_body_set_case(
    field: &str,
    condition: Condition,
    value: impl Into<Arg>,
    case: &str,
) -> ResponseFunc {
    let args = vec![text(field), text(condition.as_str()), arg(value)];
    prepare(func::IF_REQUEST_JSON_BODY_SET_CASE, set_case(args, case))
}

pub fn if_request_path_set_case(condition: Condition, value: impl Into<Arg>, case: &str) -> ResponseFunc {
    let args = vec![text(condition.as_str()), arg(value)];
    prepare(func::IF_REQUEST_PATH_SET_CASE, set_case(args, case))
}

pub fn if_request_query_set_case(
    param: &str,
    condition: Condition,
    value: impl Into<Arg>,
    case: &str,
) -> ResponseFunc {
    let args = vec![text(param), text(condition.as_str()), arg(value)];
    prepare(func::IF_REQUEST_QUERY_SET_CASE, set_case(args, case))
}

pub fn if_dynamic_variable_set_case(
    name: &str,
    condition: Condition,
    value: impl Into<Arg>,
    case: &str,
) -> ResponseFunc {
    let args = vec![text(name), text(condition.as_str()), arg(value)];
    prepare(func::IF_DYNAMIC_VARIABLE_SET_CASE, set_case(args, case))
}

pub fn if_request_json_array_length_set_case(
    field: &str,
    condition: Condition,
    length: u32,
    case: &str,
) -> ResponseFunc {
    let args = vec![text(field), text(condition.as_str()), Value::from(length)];
    prepare(func::IF_REQUEST_JSON_ARRAY_LENGTH_SET_CASE, set_case(args, case))
}

pub fn if_request_json_object_length_set_case(
    field: &str,
    condition: Condition,
    length: u32,
    case: &str,
) -> ResponseFunc {
    let args = vec![text(field), text(condition.as_str()), Value::from(length)];
    prepare(func::IF_REQUEST_JSON_OBJECT_LENGTH_SET_CASE, set_case(args, case))
}

pub fn if_request_json_type_set_case(field: &str, json_type: JsonType, case: &str) -> ResponseFunc {
    let args = vec![text(field), text(json_type.as_str())];
    prepare(func::IF_REQUEST_JSON_TYPE_SET_CASE, set_case(args, case))
}

// Extractors.

pub fn extract_request_header(header: &str, variable: &str) -> ResponseFunc {
    prepare(func::EXTRACT_REQUEST_HEADER, vec![text(header), text(variable)])
}

pub fn extract_request_json_body(field: &str, variable: &str) -> ResponseFunc {
    prepare(func::EXTRACT_REQUEST_JSON_BODY, vec![text(field), text(variable)])
}

pub fn extract_request_path(variable: &str) -> ResponseFunc {
    prepare(func::EXTRACT_REQUEST_PATH, vec![text(variable)])
}

pub fn extract_request_query(param: &str, variable: &str) -> ResponseFunc {
    prepare(func::EXTRACT_REQUEST_QUERY, vec![text(param), text(variable)])
}

// Generators.

pub fn generate_random_string(length: u32, variable: &str) -> ResponseFunc {
    generator(func::GENERATE_RANDOM_STRING, vec![Value::from(length), text(variable)])
}

pub fn generate_random_int(min: i64, max: i64, variable: &str) -> ResponseFunc {
    generator(
        func::GENERATE_RANDOM_INT,
        vec![Value::from(min), Value::from(max), text(variable)],
    )
}

/// `digits` must be between 1 and 18; anything else is skipped by the server.
pub fn generate_random_int_fix_length(digits: u32, variable: &str) -> ResponseFunc {
    generator(
        func::GENERATE_RANDOM_INT_FIX_LENGTH,
        vec![Value::from(digits), text(variable)],
    )
}

pub fn generate_random_decimal(min: f64, max: f64, max_decimals: u32, variable: &str) -> ResponseFunc {
    generator(
        func::GENERATE_RANDOM_DECIMAL,
        vec![arg(min), arg(max), Value::from(max_decimals), text(variable)],
    )
}

pub fn hashed_string(from: &str, algorithm: HashAlgorithm, variable: &str) -> ResponseFunc {
    generator(
        func::HASHED_STRING,
        vec![text(from), text(algorithm.as_str()), text(variable)],
    )
}

// Variable manipulation.

pub fn convert_to_string(variable: &str) -> ResponseFunc {
    dynamic(func::CONVERT_TO_STRING, vec![text(variable)])
}

pub fn convert_to_int(variable: &str) -> ResponseFunc {
    dynamic(func::CONVERT_TO_INT, vec![text(variable)])
}

pub fn delete(variable: &str) -> ResponseFunc {
    dynamic(func::DELETE, vec![text(variable)])
}

/// Character offsets, end exclusive.
pub fn dynamic_var_substring(source: &str, start: u32, end: u32, target: &str) -> ResponseFunc {
    dynamic(
        func::DYNAMIC_VAR_SUBSTRING,
        vec![text(source), Value::from(start), Value::from(end), text(target)],
    )
}

pub fn dynamic_var_join<I, A>(target: &str, separator: &str, parts: I) -> ResponseFunc
where
    I: IntoIterator<Item = A>,
    A: Into<Arg>,
{
    let mut args = vec![text(target), text(separator)];
    args.extend(parts.into_iter().map(arg));
    dynamic(func::DYNAMIC_VAR_JOIN, args)
}

// Response setup. An empty `case` applies to every request.

pub fn set_json_body(case: &str, body: &str) -> ResponseFunc {
    setup(func::SET_JSON_BODY, case, vec![text(body)])
}

pub fn set_status_code(case: &str, status: u16) -> ResponseFunc {
    setup(func::SET_STATUS_CODE, case, vec![Value::from(status)])
}

pub fn set_wait(case: &str, millis: u64) -> ResponseFunc {
    setup(func::SET_WAIT, case, vec![Value::from(millis)])
}

pub fn set_random_wait(case: &str, min_millis: u64, max_millis: u64) -> ResponseFunc {
    setup(
        func::SET_RANDOM_WAIT,
        case,
        vec![Value::from(min_millis), Value::from(max_millis)],
    )
}

pub fn set_header(case: &str, name: &str, value: &str) -> ResponseFunc {
    setup(func::SET_HEADER, case, vec![text(name), text(value)])
}

pub fn copy_header_from_request(case: &str, name: &str) -> ResponseFunc {
    setup(func::COPY_HEADER_FROM_REQUEST, case, vec![text(name)])
}
