//! Wire messages exchanged with the memory agent.
//!
//! Every message is a JSON object. Requests carry `type` and `request_id`;
//! responses echo `request_id` together with `success` and either the
//! payload fields or `error`.

use serde::Deserialize;
use serde_json::{Map, Value};
use strum::{Display, IntoStaticStr};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum RequestKind {
    #[strum(serialize = "get_modules")]
    GetModules,
    #[strum(serialize = "ref_process")]
    RefProcess,
    #[strum(serialize = "rvm")]
    ReadMemory,
    #[strum(serialize = "wvm")]
    WriteMemory,
    #[strum(serialize = "find_pattern")]
    FindPattern,
    #[strum(serialize = "query_memory")]
    QueryMemory,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Outbound request under construction.
#[derive(Debug, Clone)]
pub struct Request {
    kind: RequestKind,
    fields: Map<String, Value>,
}

impl Request {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            fields: Map::new(),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Numbers travel as decimal strings.
    pub fn decimal(self, name: &str, value: u64) -> Self {
        self.field(name, value.to_string())
    }

    /// Serialize with the given request id.
    pub fn encode(&self, request_id: &str) -> Result<String> {
        let mut message = self.fields.clone();
        message.insert("type".to_string(), Value::from(self.kind.as_str()));
        message.insert("request_id".to_string(), Value::from(request_id));
        Ok(serde_json::to_string(&Value::Object(message))?)
    }
}

/// Only the correlation id of an inbound message.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub request_id: Option<Value>,
}

impl Envelope {
    /// The request id as text; agents may echo it as a string or a number.
    pub fn request_id(&self) -> Option<String> {
        match self.request_id.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A parsed response to one request.
#[derive(Debug, Clone)]
pub struct Response {
    kind: RequestKind,
    fields: Map<String, Value>,
}

impl Response {
    /// Parse a raw response and turn `success: false` into an error.
    pub fn parse(raw: &str, kind: RequestKind) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|e| Error::MalformedResponse {
            kind: kind.as_str(),
            message: e.to_string(),
        })?;
        let Value::Object(fields) = value else {
            return Err(Error::MalformedResponse {
                kind: kind.as_str(),
                message: "response is not an object".to_string(),
            });
        };

        let response = Self { kind, fields };
        if response.flag("success").unwrap_or(false) {
            return Ok(response);
        }

        let message = response
            .fields
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string();
        Err(Error::Remote {
            kind: kind.as_str(),
            message,
        })
    }

    fn malformed(&self, message: String) -> Error {
        Error::MalformedResponse {
            kind: self.kind.as_str(),
            message,
        }
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.malformed(format!("missing string field '{}'", name)))
    }

    /// A number sent as hex text (`"7FF6A000"`, `"0x7FF6A000"`) or a JSON number.
    pub fn hex(&self, name: &str) -> Result<u64> {
        match self.fields.get(name) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => crate::memory::parse_hex(s),
            _ => None,
        }
        .ok_or_else(|| self.malformed(format!("field '{}' is not a hex number", name)))
    }

    /// A number sent as decimal text or a JSON number.
    pub fn decimal(&self, name: &str) -> Result<u64> {
        match self.fields.get(name) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| self.malformed(format!("field '{}' is not a decimal number", name)))
    }

    /// A boolean sent as a JSON bool or as `"true"`/`"false"`.
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.fields.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim() {
                s if s.eq_ignore_ascii_case("true") || s == "1" => Some(true),
                s if s.eq_ignore_ascii_case("false") || s == "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_u64().map(|v| v != 0),
            _ => None,
        }
    }
}
