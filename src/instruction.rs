//! Typed form of the wire `(group, func, args)` triples.
//!
//! Decoding never rejects a script. An entry that does not fit its declared
//! shape becomes [`Instruction::Invalid`], which the interpreter skips.

use hyper::header::HeaderName;
use serde_json::Value;
use thiserror::Error;

use crate::{
    condition::{stringify, Condition},
    interchange::{func, group, HashAlgorithm, ResponseFunc},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Condition(ConditionOp),
    Generator(GeneratorOp),
    Variable(VariableOp),
    Response { case: String, op: ResponseOp },
    Invalid { group: String, func: String, reason: DecodeError },
}

/// Where the left operand of a condition comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Header(String),
    JsonBody(String),
    Path,
    Query(String),
    Variable(String),
}

/// What is measured on the source before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    Value,
    ArrayLength,
    ObjectLength,
    Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Bind { variable: String, value: Value },
    SetCase(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOp {
    Test {
        source: Source,
        kind: TestKind,
        condition: Condition,
        expected: Value,
        effect: Effect,
    },
    Extract {
        source: Source,
        variable: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorOp {
    RandomString { length: usize, variable: String },
    RandomInt { min: i64, max: i64, variable: String },
    RandomIntFixLength { digits: u32, variable: String },
    RandomDecimal { min: f64, max: f64, max_decimals: u32, variable: String },
    Hash { from: String, algorithm: HashAlgorithm, variable: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariableOp {
    ConvertToString(String),
    ConvertToInt(String),
    Delete(String),
    Substring { source: String, start: usize, end: usize, target: String },
    Join { target: String, separator: Value, parts: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOp {
    StatusCode(u16),
    JsonBody(String),
    Wait { millis: u64 },
    RandomWait { min_millis: u64, max_millis: u64 },
    Header { name: HeaderName, value: String },
    CopyHeader(HeaderName),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Unknown group")]
    UnknownGroup,
    #[error("Unknown function")]
    UnknownFunc,
    #[error("Missing argument {0}")]
    MissingArgument(usize),
    #[error("Argument {0} is not a number")]
    NotANumber(usize),
    #[error("Argument {0} is out of range")]
    OutOfRange(usize),
    #[error("Argument {0} is not a valid condition")]
    BadCondition(usize),
    #[error("Argument {0} is not a supported hash algorithm")]
    BadAlgorithm(usize),
    #[error("Argument {0} is not a valid header name")]
    BadHeaderName(usize),
}

impl Instruction {
    pub fn decode(config: &ResponseFunc) -> Self {
        let decoded = match config.group.as_str() {
            group::PREPARE_DATA | group::CONDITION_ALIAS => {
                decode_condition(&config.func, Args::new(&config.args)).map(Instruction::Condition)
            }
            group::GENERATOR => {
                decode_generator(&config.func, Args::new(&config.args)).map(Instruction::Generator)
            }
            group::DYNAMIC_VARIABLE | group::VARIABLE_OP_ALIAS => {
                decode_variable(&config.func, Args::new(&config.args)).map(Instruction::Variable)
            }
            group::SETUP_RESPONSE | group::RESPONSE_SETUP_ALIAS => {
                decode_response(&config.func, Args::new(&config.args))
            }
            _ => Err(DecodeError::UnknownGroup),
        };
        decoded.unwrap_or_else(|reason| Instruction::Invalid {
            group: config.group.clone(),
            func: config.func.clone(),
            reason,
        })
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Instruction::Invalid { .. })
    }
}

/// Positional reader over loosely-typed arguments.
struct Args<'a> {
    values: &'a [Value],
    position: usize,
}

impl<'a> Args<'a> {
    fn new(values: &'a [Value]) -> Self {
        Self { values, position: 0 }
    }

    fn value(&mut self) -> Result<Value, DecodeError> {
        let value = self
            .values
            .get(self.position)
            .cloned()
            .ok_or(DecodeError::MissingArgument(self.position))?;
        self.position += 1;
        Ok(value)
    }

    fn name(&mut self) -> Result<String, DecodeError> {
        self.value().map(|value| stringify(&value))
    }

    fn number(&mut self) -> Result<f64, DecodeError> {
        let index = self.position;
        let value = self.value()?;
        match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|n| n.is_finite())
        .ok_or(DecodeError::NotANumber(index))
    }

    fn integer(&mut self) -> Result<i64, DecodeError> {
        let index = self.position;
        let n = self.number()?;
        if n.abs() >= i64::MAX as f64 {
            return Err(DecodeError::OutOfRange(index));
        }
        Ok(n.trunc() as i64)
    }

    fn unsigned(&mut self) -> Result<u64, DecodeError> {
        let index = self.position;
        u64::try_from(self.integer()?).map_err(|_| DecodeError::OutOfRange(index))
    }

    fn condition(&mut self) -> Result<Condition, DecodeError> {
        let index = self.position;
        self.name()?
            .parse()
            .map_err(|_| DecodeError::BadCondition(index))
    }

    fn header_name(&mut self) -> Result<HeaderName, DecodeError> {
        let index = self.position;
        HeaderName::from_bytes(self.name()?.as_bytes()).map_err(|_| DecodeError::BadHeaderName(index))
    }

    fn rest(&mut self) -> Vec<Value> {
        let rest = self.values.get(self.position..).unwrap_or_default().to_vec();
        self.position = self.values.len();
        rest
    }
}

#[derive(Clone, Copy)]
enum SourceKind {
    Header,
    JsonBody,
    Path,
    Query,
    Variable,
}

impl SourceKind {
    fn read(self, args: &mut Args) -> Result<Source, DecodeError> {
        Ok(match self {
            SourceKind::Header => Source::Header(args.name()?),
            SourceKind::JsonBody => Source::JsonBody(args.name()?),
            SourceKind::Path => Source::Path,
            SourceKind::Query => Source::Query(args.name()?),
            SourceKind::Variable => Source::Variable(args.name()?),
        })
    }
}

enum ConditionShape {
    Test { source: SourceKind, kind: TestKind, set_case: bool },
    Extract(SourceKind),
}

fn condition_shape(name: &str) -> Option<ConditionShape> {
    use ConditionShape::{Extract, Test};
    use SourceKind::*;

    let test = |source, kind, set_case| Some(Test { source, kind, set_case });
    match name {
        func::IF_REQUEST_HEADER => test(Header, TestKind::Value, false),
        func::IF_REQUEST_JSON_BODY => test(JsonBody, TestKind::Value, false),
        func::IF_REQUEST_PATH => test(Path, TestKind::Value, false),
        func::IF_REQUEST_QUERY => test(Query, TestKind::Value, false),
        func::IF_DYNAMIC_VARIABLE => test(Variable, TestKind::Value, false),
        func::IF_REQUEST_JSON_ARRAY_LENGTH => test(JsonBody, TestKind::ArrayLength, false),
        func::IF_REQUEST_JSON_OBJECT_LENGTH => test(JsonBody, TestKind::ObjectLength, false),
        func::IF_REQUEST_JSON_TYPE => test(JsonBody, TestKind::Type, false),
        func::IF_REQUEST_HEADER_SET_CASE => test(Header, TestKind::Value, true),
        func::IF_REQUEST_JSON_BODY_SET_CASE => test(JsonBody, TestKind::Value, true),
        func::IF_REQUEST_PATH_SET_CASE => test(Path, TestKind::Value, true),
        func::IF_REQUEST_QUERY_SET_CASE => test(Query, TestKind::Value, true),
        func::IF_DYNAMIC_VARIABLE_SET_CASE => test(Variable, TestKind::Value, true),
        func::IF_REQUEST_JSON_ARRAY_LENGTH_SET_CASE => test(JsonBody, TestKind::ArrayLength, true),
        func::IF_REQUEST_JSON_OBJECT_LENGTH_SET_CASE => test(JsonBody, TestKind::ObjectLength, true),
        func::IF_REQUEST_JSON_TYPE_SET_CASE => test(JsonBody, TestKind::Type, true),
        func::EXTRACT_REQUEST_HEADER => Some(Extract(Header)),
        func::EXTRACT_REQUEST_JSON_BODY => Some(Extract(JsonBody)),
        func::EXTRACT_REQUEST_PATH => Some(Extract(Path)),
        func::EXTRACT_REQUEST_QUERY => Some(Extract(Query)),
        _ => None,
    }
}

fn decode_condition(name: &str, mut args: Args) -> Result<ConditionOp, DecodeError> {
    match condition_shape(name).ok_or(DecodeError::UnknownFunc)? {
        ConditionShape::Extract(source) => Ok(ConditionOp::Extract {
            source: source.read(&mut args)?,
            variable: args.name()?,
        }),
        ConditionShape::Test {
            source,
            kind,
            set_case,
        } => {
            let source = source.read(&mut args)?;
            // Type tests carry only the type name; equality is implied.
            let condition = match kind {
                TestKind::Type => Condition::Equal,
                _ => args.condition()?,
            };
            let expected = args.value()?;
            let effect = if set_case {
                Effect::SetCase(args.name()?)
            } else {
                Effect::Bind {
                    variable: args.name()?,
                    value: args.value()?,
                }
            };
            Ok(ConditionOp::Test {
                source,
                kind,
                condition,
                expected,
                effect,
            })
        }
    }
}

/// Longest string `GenerateRandomString` may produce.
pub const MAX_RANDOM_STRING_LENGTH: u64 = 1 << 20;

fn decode_generator(name: &str, mut args: Args) -> Result<GeneratorOp, DecodeError> {
    let op = match name {
        func::GENERATE_RANDOM_STRING => {
            let length = args.unsigned()?;
            if length > MAX_RANDOM_STRING_LENGTH {
                return Err(DecodeError::OutOfRange(0));
            }
            GeneratorOp::RandomString {
                length: length as usize,
                variable: args.name()?,
            }
        }
        func::GENERATE_RANDOM_INT => GeneratorOp::RandomInt {
            min: args.integer()?,
            max: args.integer()?,
            variable: args.name()?,
        },
        func::GENERATE_RANDOM_INT_FIX_LENGTH => {
            let digits = args.unsigned()?;
            if !(1..=18).contains(&digits) {
                return Err(DecodeError::OutOfRange(0));
            }
            GeneratorOp::RandomIntFixLength {
                digits: digits as u32,
                variable: args.name()?,
            }
        }
        func::GENERATE_RANDOM_DECIMAL => {
            let min = args.number()?;
            let max = args.number()?;
            // The sampler needs a finite span.
            if !(max - min).is_finite() {
                return Err(DecodeError::OutOfRange(1));
            }
            GeneratorOp::RandomDecimal {
                min,
                max,
                max_decimals: args.unsigned()?.min(15) as u32,
                variable: args.name()?,
            }
        }
        func::HASHED_STRING => GeneratorOp::Hash {
            from: args.name()?,
            algorithm: HashAlgorithm::parse(&args.name()?).ok_or(DecodeError::BadAlgorithm(1))?,
            variable: args.name()?,
        },
        _ => return Err(DecodeError::UnknownFunc),
    };
    Ok(op)
}

fn decode_variable(name: &str, mut args: Args) -> Result<VariableOp, DecodeError> {
    let op = match name {
        func::CONVERT_TO_STRING => VariableOp::ConvertToString(args.name()?),
        func::CONVERT_TO_INT => VariableOp::ConvertToInt(args.name()?),
        func::DELETE => VariableOp::Delete(args.name()?),
        func::DYNAMIC_VAR_SUBSTRING => VariableOp::Substring {
            source: args.name()?,
            start: args.unsigned()? as usize,
            end: args.unsigned()? as usize,
            target: args.name()?,
        },
        func::DYNAMIC_VAR_JOIN => VariableOp::Join {
            target: args.name()?,
            separator: args.value()?,
            parts: args.rest(),
        },
        _ => return Err(DecodeError::UnknownFunc),
    };
    Ok(op)
}

fn decode_response(name: &str, mut args: Args) -> Result<Instruction, DecodeError> {
    let case = args.name()?;
    let op = match name {
        func::SET_STATUS_CODE => {
            let code = args.unsigned()?;
            if !(100..=999).contains(&code) {
                return Err(DecodeError::OutOfRange(1));
            }
            ResponseOp::StatusCode(code as u16)
        }
        func::SET_JSON_BODY => ResponseOp::JsonBody(args.name()?),
        func::SET_WAIT => ResponseOp::Wait {
            millis: args.unsigned()?,
        },
        func::SET_RANDOM_WAIT => ResponseOp::RandomWait {
            min_millis: args.unsigned()?,
            max_millis: args.unsigned()?,
        },
        func::SET_HEADER => ResponseOp::Header {
            name: args.header_name()?,
            value: args.name()?,
        },
        func::COPY_HEADER_FROM_REQUEST => ResponseOp::CopyHeader(args.header_name()?),
        _ => return Err(DecodeError::UnknownFunc),
    };
    Ok(Instruction::Response { case, op })
}
