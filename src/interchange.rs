use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

/// One instruction as it travels between client and control plane.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResponseFunc {
    pub group: String,
    pub func: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl ResponseFunc {
    pub fn new(group: &str, func: &str, args: Vec<Value>) -> Self {
        Self {
            group: String::from(group),
            func: String::from(func),
            args,
        }
    }
}

/// Body of `POST /registerRoute`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegisterRoute {
    pub port: u16,
    pub method: String,
    pub path: String,
    #[serde(rename = "responseFunc", default)]
    pub response_func: Vec<ResponseFunc>,
}

/// Body of `POST /resetPort`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ResetPort {
    pub port: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: String::from("ok"),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: String::from("error"),
            message: message.into(),
        }
    }
}

pub mod group {
    pub const PREPARE_DATA: &str = "PrepareData";
    pub const GENERATOR: &str = "Generator";
    pub const DYNAMIC_VARIABLE: &str = "DynamicVariable";
    pub const SETUP_RESPONSE: &str = "SetupResponse";

    // Accepted on decode only.
    pub const CONDITION_ALIAS: &str = "Condition";
    pub const VARIABLE_OP_ALIAS: &str = "VariableOp";
    pub const RESPONSE_SETUP_ALIAS: &str = "ResponseSetup";
}

pub mod func {
    // PrepareData
    pub const IF_REQUEST_HEADER: &str = "IfRequestHeader";
    pub const IF_REQUEST_JSON_BODY: &str = "IfRequestJsonBody";
    pub const IF_REQUEST_PATH: &str = "IfRequestPath";
    pub const IF_REQUEST_QUERY: &str = "IfRequestQuery";
    pub const IF_DYNAMIC_VARIABLE: &str = "IfDynamicVariable";
    pub const IF_REQUEST_JSON_ARRAY_LENGTH: &str = "IfRequestJsonArrayLength";
    pub const IF_REQUEST_JSON_OBJECT_LENGTH: &str = "IfRequestJsonObjectLength";
    pub const IF_REQUEST_JSON_TYPE: &str = "IfRequestJsonType";
    pub const IF_REQUEST_HEADER_SET_CASE: &str = "IfRequestHeaderSetCase";
    pub const IF_REQUEST_JSON_BODY_SET_CASE: &str = "IfRequestJsonBodySetCase";
    pub const IF_REQUEST_PATH_SET_CASE: &str = "IfRequestPathSetCase";
    pub const IF_REQUEST_QUERY_SET_CASE: &str = "IfRequestQuerySetCase";
    pub const IF_DYNAMIC_VARIABLE_SET_CASE: &str = "IfDynamicVariableSetCase";
    pub const IF_REQUEST_JSON_ARRAY_LENGTH_SET_CASE: &str = "IfRequestJsonArrayLengthSetCase";
    pub const IF_REQUEST_JSON_OBJECT_LENGTH_SET_CASE: &str = "IfRequestJsonObjectLengthSetCase";
    pub const IF_REQUEST_JSON_TYPE_SET_CASE: &str = "IfRequestJsonTypeSetCase";
    pub const EXTRACT_REQUEST_HEADER: &str = "ExtractRequestHeader";
    pub const EXTRACT_REQUEST_JSON_BODY: &str = "ExtractRequestJsonBody";
    pub const EXTRACT_REQUEST_PATH: &str = "ExtractRequestPath";
    pub const EXTRACT_REQUEST_QUERY: &str = "ExtractRequestQuery";

    // Generator
    pub const GENERATE_RANDOM_STRING: &str = "GenerateRandomString";
    pub const GENERATE_RANDOM_INT: &str = "GenerateRandomInt";
    pub const GENERATE_RANDOM_INT_FIX_LENGTH: &str = "GenerateRandomIntFixLength";
    pub const GENERATE_RANDOM_DECIMAL: &str = "GenerateRandomDecimal";
    pub const HASHED_STRING: &str = "HashedString";

    // DynamicVariable
    pub const CONVERT_TO_STRING: &str = "ConvertToString";
    pub const CONVERT_TO_INT: &str = "ConvertToInt";
    pub const DELETE: &str = "Delete";
    pub const DYNAMIC_VAR_SUBSTRING: &str = "DynamicVarSubstring";
    pub const DYNAMIC_VAR_JOIN: &str = "DynamicVarJoin";

    // SetupResponse
    pub const SET_JSON_BODY: &str = "SetJsonBody";
    pub const SET_STATUS_CODE: &str = "SetStatusCode";
    pub const SET_WAIT: &str = "SetWait";
    pub const SET_RANDOM_WAIT: &str = "SetRandomWait";
    pub const SET_HEADER: &str = "SetHeader";
    pub const COPY_HEADER_FROM_REQUEST: &str = "CopyHeaderFromRequest";
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "SHA256")]
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha256 => "SHA256",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("MD5") {
            Some(HashAlgorithm::Md5)
        } else if name.eq_ignore_ascii_case("SHA256") || name.eq_ignore_ascii_case("SHA-256") {
            Some(HashAlgorithm::Sha256)
        } else {
            None
        }
    }
}

/// JSON value kinds tested by `IfRequestJsonType`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Null,
}

impl JsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Null => "null",
        }
    }

    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => JsonType::String,
            Value::Number(_) => JsonType::Number,
            Value::Bool(_) => JsonType::Boolean,
            Value::Object(_) => JsonType::Object,
            Value::Array(_) => JsonType::Array,
            Value::Null => JsonType::Null,
        }
    }
}
