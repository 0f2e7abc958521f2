//! Request and reply shapes exchanged with handler modules.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The request object a handler receives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub method: String,
    /// Full request path, including the API prefix.
    pub path: String,
    pub body: Value,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
}

/// How a handler's return value maps onto an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerReply {
    /// `{ statusCode, body }` passed through verbatim.
    Explicit { status: u16, body: Value },
    /// Any other value, sent as JSON with status 200.
    Plain(Value),
}

impl HandlerReply {
    /// Interpret a handler's return value.
    ///
    /// An object carrying both `statusCode` and `body` is explicit; a
    /// missing or zero status code means 200. Falsy values (`null`, `false`,
    /// `0`, `""`) become `{}`.
    pub fn from_value(value: Value) -> Self {
        if is_falsy(&value) {
            return HandlerReply::Plain(Value::Object(Default::default()));
        }

        match value {
            Value::Object(mut object)
                if object.contains_key("statusCode") && object.contains_key("body") =>
            {
                let status = object
                    .get("statusCode")
                    .and_then(Value::as_u64)
                    .and_then(|code| u16::try_from(code).ok())
                    .filter(|code| *code != 0)
                    .unwrap_or(200);
                let body = object.remove("body").unwrap_or(Value::Null);
                HandlerReply::Explicit { status, body }
            }
            value => HandlerReply::Plain(value),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            HandlerReply::Explicit { status, .. } => *status,
            HandlerReply::Plain(_) => 200,
        }
    }

    /// Response body bytes: explicit string bodies are sent as-is, a null
    /// explicit body is empty, everything else is JSON-encoded.
    pub fn body_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            HandlerReply::Explicit {
                body: Value::String(text),
                ..
            } => Ok(text.clone().into_bytes()),
            HandlerReply::Explicit {
                body: Value::Null, ..
            } => Ok(Vec::new()),
            HandlerReply::Explicit { body, .. } | HandlerReply::Plain(body) => {
                serde_json::to_vec(body)
            }
        }
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
