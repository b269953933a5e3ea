//! Per-request execution of a decoded script.
//!
//! Every request gets a fresh [`Interpreter`]: variables, parsed body, active
//! case and the pending response live only as long as the request does.

use std::{collections::HashMap, time::Duration};

use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Body, Bytes},
    header::{HeaderName, HeaderValue},
    http::request::Parts,
    HeaderMap, Method, Request, Response, StatusCode,
};
use md5::Md5;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    condition::stringify,
    instruction::{
        ConditionOp, Effect, GeneratorOp, Instruction, ResponseOp, Source, TestKind, VariableOp,
        MAX_RANDOM_STRING_LENGTH,
    },
    interchange::{HashAlgorithm, JsonType},
    json_path, template,
};

/// The parts of an inbound request a script can observe, with the body buffered.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestSnapshot {
    pub fn new(parts: &Parts, body: Bytes) -> Self {
        let query = parts
            .uri
            .query()
            .map(|query| form_urlencoded::parse(query.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self {
            method: parts.method.clone(),
            path: String::from(parts.uri.path()),
            query,
            headers: parts.headers.clone(),
            body,
        }
    }

    /// Buffers the body; a body that fails to arrive is treated as empty.
    pub async fn read<B>(req: Request<B>) -> Self
    where
        B: Body,
        B::Error: std::fmt::Debug,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                debug!(path = parts.uri.path(), "Failed to read request body: {:?}", err);
                Bytes::new()
            }
        };
        Self::new(&parts, body)
    }

    pub fn header(&self, name: &str) -> String {
        self.headers
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default()
    }

    pub fn query_param(&self, name: &str) -> String {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    }
}

impl From<Request<Bytes>> for RequestSnapshot {
    fn from(req: Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(&parts, body)
    }
}

#[derive(Debug, Default)]
struct PendingResponse {
    status: Option<StatusCode>,
    body: String,
    headers: HeaderMap,
    fixed_delay: Duration,
    random_delay: Option<(u64, u64)>,
}

pub struct Interpreter<'r> {
    request: &'r RequestSnapshot,
    parsed_body: Option<Value>,
    variables: HashMap<String, Value>,
    active_case: String,
    pending: PendingResponse,
}

impl<'r> Interpreter<'r> {
    pub fn new(request: &'r RequestSnapshot) -> Self {
        let parsed_body = if request.body.is_empty() {
            None
        } else {
            serde_json::from_slice(&request.body).ok()
        };
        Self {
            request,
            parsed_body,
            variables: HashMap::new(),
            active_case: String::new(),
            pending: PendingResponse::default(),
        }
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn active_case(&self) -> &str {
        &self.active_case
    }

    pub fn run(&mut self, script: &[Instruction]) {
        for instruction in script {
            self.step(instruction);
        }
    }

    pub fn step(&mut self, instruction: &Instruction) {
        match instruction {
            Instruction::Condition(op) => self.condition(op),
            Instruction::Generator(op) => self.generate(op),
            Instruction::Variable(op) => self.mutate(op),
            Instruction::Response { case, op } => {
                if *case == self.active_case {
                    self.setup_response(op);
                }
            }
            Instruction::Invalid { .. } => {}
        }
    }

    /// Renders the pending response. Delays are applied by [`Rendered::into_response`].
    pub fn finish(self) -> Rendered {
        let mut delay = self.pending.fixed_delay;
        if let Some((min, max)) = self.pending.random_delay {
            if max > 0 {
                let millis = rand::thread_rng().gen_range(min.min(max)..=max);
                delay += Duration::from_millis(millis);
            }
        }
        let body = template::render(&self.pending.body, &self.variables);
        Rendered {
            delay,
            status: self.pending.status.unwrap_or(StatusCode::OK),
            headers: self.pending.headers,
            body,
            variables: self.variables,
        }
    }

    fn resolve(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(template::render(s, &self.variables)),
            other => other.clone(),
        }
    }

    fn read_source(&self, source: &Source) -> Option<Value> {
        match source {
            Source::Header(name) => Some(Value::String(self.request.header(name))),
            Source::Path => Some(Value::String(self.request.path.clone())),
            Source::Query(name) => Some(Value::String(self.request.query_param(name))),
            Source::Variable(name) => self.variables.get(name).cloned(),
            Source::JsonBody(path) => {
                let body = self.parsed_body.as_ref()?;
                match json_path::resolve(body, path) {
                    Ok(value) => Some(value.clone()),
                    Err(err) => {
                        debug!("{}", err);
                        None
                    }
                }
            }
        }
    }

    fn condition(&mut self, op: &ConditionOp) {
        match op {
            ConditionOp::Extract { source, variable } => match self.read_source(source) {
                Some(Value::Null) | None => debug!(%variable, "Nothing to extract"),
                Some(value) => {
                    self.variables.insert(variable.clone(), value);
                }
            },
            ConditionOp::Test {
                source,
                kind,
                condition,
                expected,
                effect,
            } => {
                let Some(actual) = self.read_source(source).and_then(|value| measure(*kind, value))
                else {
                    return;
                };
                let expected = self.resolve(expected);
                if !condition.evaluate(&actual, &expected) {
                    return;
                }
                match effect {
                    Effect::Bind { variable, value } => {
                        let value = self.resolve(value);
                        self.variables.insert(variable.clone(), value);
                    }
                    Effect::SetCase(case) => self.active_case = case.clone(),
                }
            }
        }
    }

    fn generate(&mut self, op: &GeneratorOp) {
        let mut rng = rand::thread_rng();
        let (variable, value) = match op {
            GeneratorOp::RandomString { length, variable } => {
                let value: String = (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take((*length).min(MAX_RANDOM_STRING_LENGTH as usize))
                    .map(char::from)
                    .collect();
                (variable, Value::String(value))
            }
            GeneratorOp::RandomInt { min, max, variable } => {
                if min > max {
                    debug!(%variable, "Random int range is empty");
                    return;
                }
                (variable, Value::from(rng.gen_range(*min..=*max)))
            }
            GeneratorOp::RandomIntFixLength { digits, variable } => {
                let low = 10i64.pow(digits - 1);
                let high = 10i64.pow(*digits) - 1;
                (variable, Value::from(rng.gen_range(low..=high)))
            }
            GeneratorOp::RandomDecimal {
                min,
                max,
                max_decimals,
                variable,
            } => {
                if min > max || !(max - min).is_finite() {
                    debug!(%variable, "Random decimal range is unusable");
                    return;
                }
                let raw = if min == max { *min } else { rng.gen_range(*min..=*max) };
                let factor = 10f64.powi(*max_decimals as i32);
                let value = ((raw * factor).round() / factor).clamp(*min, *max);
                (variable, Value::from(value))
            }
            GeneratorOp::Hash {
                from,
                algorithm,
                variable,
            } => {
                let Some(source) = self.variables.get(from) else {
                    debug!(variable = %from, "Hash source is not bound");
                    return;
                };
                let input = stringify(source);
                let digest = match algorithm {
                    HashAlgorithm::Md5 => format!("{:x}", Md5::digest(input.as_bytes())),
                    HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(input.as_bytes())),
                };
                (variable, Value::String(digest))
            }
        };
        self.variables.insert(variable.clone(), value);
    }

    fn mutate(&mut self, op: &VariableOp) {
        match op {
            VariableOp::ConvertToString(name) => {
                if let Some(value) = self.variables.get_mut(name) {
                    *value = Value::String(stringify(value));
                }
            }
            VariableOp::ConvertToInt(name) => {
                let Some(value) = self.variables.get_mut(name) else {
                    return;
                };
                let parsed = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                match parsed.filter(|n| n.is_finite()) {
                    Some(n) => *value = Value::from(n.trunc() as i64),
                    None => debug!(variable = %name, "Value is not numeric"),
                }
            }
            VariableOp::Delete(name) => {
                self.variables.remove(name);
            }
            VariableOp::Substring {
                source,
                start,
                end,
                target,
            } => {
                let Some(value) = self.variables.get(source) else {
                    return;
                };
                let chars: Vec<char> = stringify(value).chars().collect();
                let end = (*end).min(chars.len());
                if *start > end {
                    debug!(variable = %source, start, end, "Substring offsets out of range");
                    return;
                }
                let value: String = chars[*start..end].iter().collect();
                self.variables.insert(target.clone(), Value::String(value));
            }
            VariableOp::Join {
                target,
                separator,
                parts,
            } => {
                let separator = stringify(&self.resolve(separator));
                let joined = parts
                    .iter()
                    .map(|part| stringify(&self.resolve(part)))
                    .collect::<Vec<_>>()
                    .join(&separator);
                self.variables.insert(target.clone(), Value::String(joined));
            }
        }
    }

    fn setup_response(&mut self, op: &ResponseOp) {
        match op {
            ResponseOp::StatusCode(code) => match StatusCode::from_u16(*code) {
                Ok(status) => self.pending.status = Some(status),
                Err(_) => debug!(code, "Invalid status code"),
            },
            ResponseOp::JsonBody(body) => self.pending.body = body.clone(),
            ResponseOp::Wait { millis } => self.pending.fixed_delay = Duration::from_millis(*millis),
            ResponseOp::RandomWait {
                min_millis,
                max_millis,
            } => self.pending.random_delay = Some((*min_millis, *max_millis)),
            ResponseOp::Header { name, value } => {
                let value = template::render(value, &self.variables);
                match HeaderValue::from_str(&value) {
                    Ok(value) => {
                        self.pending.headers.insert(name.clone(), value);
                    }
                    Err(_) => debug!(header = name.as_str(), "Invalid header value"),
                }
            }
            ResponseOp::CopyHeader(name) => self.copy_header(name),
        }
    }

    fn copy_header(&mut self, name: &HeaderName) {
        if let Some(value) = self.request.headers.get(name) {
            if !value.is_empty() {
                self.pending.headers.insert(name.clone(), value.clone());
            }
        }
    }
}

fn measure(kind: TestKind, value: Value) -> Option<Value> {
    match kind {
        TestKind::Value => Some(value),
        TestKind::ArrayLength => value.as_array().map(|array| Value::from(array.len())),
        TestKind::ObjectLength => value.as_object().map(|object| Value::from(object.len())),
        TestKind::Type => Some(Value::from(JsonType::of(&value).as_str())),
    }
}

/// A response ready to be written, still owing its delay.
#[derive(Debug)]
pub struct Rendered {
    pub delay: Duration,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
    pub variables: HashMap<String, Value>,
}

impl Rendered {
    pub async fn into_response(self) -> Response<Full<Bytes>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut response = Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Runs `script` against `request` and renders the response, delays included.
pub async fn respond(script: &[Instruction], request: &RequestSnapshot) -> Response<Full<Bytes>> {
    let mut interpreter = Interpreter::new(request);
    interpreter.run(script);
    interpreter.finish().into_response().await
}
