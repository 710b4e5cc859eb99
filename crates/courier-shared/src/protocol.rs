use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A textual, list-structured command as it travels on the wire.
///
/// Client traffic only uses `name`, `args` and `request_id`. Routed traffic
/// between nodes nests the forwarded command in `inner`, and carries values
/// that are not plain strings (e.g. a topic's destination list) in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<Frame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Frame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            request_id: None,
            inner: None,
            data: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_inner(mut self, inner: Frame) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Fail with `MissingArguments` when fewer than `expected` args are present.
    pub fn require_args(&self, expected: usize) -> Result<(), ProtocolError> {
        if self.args.len() < expected {
            return Err(ProtocolError::MissingArguments {
                command: self.name.clone(),
                expected,
                got: self.args.len(),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// What a node sends back to a client: replies to requests as well as
/// unsolicited pushes (deliveries, forced logout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Response {
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request_id: None,
            ok: true,
            message: None,
            args: Vec::new(),
        }
    }

    pub fn failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request_id: None,
            ok: false,
            message: Some(message.into()),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Echo the request identifier of the frame being answered.
    pub fn reply_to(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}
