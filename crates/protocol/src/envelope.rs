use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::constants::{ErrorKind, Method};

/// A structured call sent over a control connection.
///
/// `parameters` is kept as a raw JSON value so the responder can route on
/// `method` before committing to a payload type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Box<RawValue>>,
    /// Asks the responder to turn the connection into a raw byte pipe
    /// after its reply.
    #[serde(default, skip_serializing_if = "is_false")]
    pub upgrade: bool,
}

impl Call {
    /// Creates a call for `method` carrying `parameters`.
    pub fn new<T: Serialize>(method: Method, parameters: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            method: method.as_str().to_string(),
            parameters: Some(to_raw(parameters)?),
            upgrade: false,
        })
    }

    /// Creates a call without parameters.
    pub fn bare(method: Method) -> Self {
        Self {
            method: method.as_str().to_string(),
            parameters: None,
            upgrade: false,
        }
    }

    /// Sets the upgrade flag.
    pub fn with_upgrade(mut self) -> Self {
        self.upgrade = true;
        self
    }

    /// Resolves the method name, if it is one this build serves.
    pub fn method(&self) -> Option<Method> {
        Method::from_name(&self.method)
    }

    /// Deserializes the parameters. Missing parameters decode as `{}`.
    pub fn parse_parameters<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        parse_raw(self.parameters.as_deref())
    }
}

/// Parameters attached to an error reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// A reply to a [`Call`]: either success parameters or an error kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Box<RawValue>>,
}

impl Reply {
    /// Creates a success reply.
    pub fn ok<T: Serialize>(parameters: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            error: None,
            parameters: Some(to_raw(parameters)?),
        })
    }

    /// Creates an error reply. An empty `message` is omitted on the wire.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        let detail = ErrorDetail {
            message: message.into(),
        };
        Self {
            error: Some(kind),
            parameters: to_raw(&detail).ok(),
        }
    }

    /// Returns `true` if this is an error reply.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the error kind and its detail, if this is an error reply.
    pub fn error_detail(&self) -> Option<(ErrorKind, ErrorDetail)> {
        let kind = self.error?;
        let detail = parse_raw(self.parameters.as_deref()).unwrap_or_default();
        Some((kind, detail))
    }

    /// Deserializes the success parameters. Missing parameters decode as `{}`.
    pub fn parse_parameters<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        parse_raw(self.parameters.as_deref())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn to_raw<T: Serialize>(value: &T) -> Result<Box<RawValue>, serde_json::Error> {
    RawValue::from_string(serde_json::to_string(value)?)
}

fn parse_raw<T: for<'de> Deserialize<'de>>(raw: Option<&RawValue>) -> Result<T, serde_json::Error> {
    serde_json::from_str(raw.map_or("{}", RawValue::get))
}
