//! Call, Response and Event message types.
//!
//! Defines the JSON message format exchanged with the DevTools endpoint.
//!
//! # Format
//!
//! | Direction | Shape |
//! |-----------|-------|
//! | Outbound call | `{"id": 1, "method": "Page.enable", "params": {}}` |
//! | Inbound result | `{"id": 1, "result": {...}}` |
//! | Inbound error | `{"id": 1, "error": {"code": -32000, "message": "...", "data": ...}}` |
//! | Inbound event | `{"method": "Page.frameStoppedLoading", "params": {...}}` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, to_string};

use crate::error::{Error, Result};
use crate::identifiers::CallId;

// ============================================================================
// Call
// ============================================================================

/// An outbound method call.
#[derive(Debug, Clone, Serialize)]
pub struct Call {
    /// Correlation id, unique within the session.
    pub id: CallId,

    /// Remote method in `Domain.method` format.
    pub method: String,

    /// Method arguments (always an object on the wire).
    pub params: Value,
}

impl Call {
    /// Creates a call. `Null` params are sent as an empty object.
    #[inline]
    #[must_use]
    pub fn new(id: CallId, method: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Serializes the call to its wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the params cannot be serialized.
    pub fn to_json(&self) -> Result<String> {
        Ok(to_string(self)?)
    }
}

// ============================================================================
// RemoteFault
// ============================================================================

/// Error payload of a failed call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteFault {
    /// JSON-RPC style error code.
    pub code: i64,

    /// Human readable message.
    #[serde(default)]
    pub message: String,

    /// Optional detail.
    #[serde(default)]
    pub data: Option<Value>,
}

// ============================================================================
// Response
// ============================================================================

/// An inbound message correlated to a call by id.
#[derive(Debug, Clone)]
pub struct Response {
    /// Matches the call `id`.
    pub id: CallId,

    /// Result payload (if success).
    pub result: Option<Value>,

    /// Error payload (if failure).
    pub error: Option<RemoteFault>,
}

impl Response {
    /// Returns `true` if the remote side reported an error.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result, failing if the response carries an error.
    ///
    /// # Arguments
    ///
    /// * `method` - Method of the originating call, for error context
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the response carries an `error` field.
    pub fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            Some(fault) => Err(Error::remote(method, fault.code, fault.message, fault.data)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// An asynchronous notification from the browser.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    pub params: Value,
}

impl Event {
    /// Returns the domain part of the method.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Wire shape shared by every inbound message.
#[derive(Deserialize)]
struct RawInbound {
    #[serde(default)]
    id: Option<CallId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteFault>,
}

/// A decoded inbound message.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Reply to a call.
    Response(Response),
    /// Notification without an id.
    Event(Event),
}

impl Inbound {
    /// Decodes one inbound text message.
    ///
    /// Messages carrying an `id` are responses; messages with only a
    /// `method` are events.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not valid JSON
    /// - [`Error::Protocol`] if it has neither `id` nor `method`
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawInbound = from_str(text)?;

        match (raw.id, raw.method) {
            (Some(id), _) => Ok(Self::Response(Response {
                id,
                result: raw.result,
                error: raw.error,
            })),
            (None, Some(method)) => Ok(Self::Event(Event {
                method,
                params: raw.params.unwrap_or(Value::Null),
            })),
            (None, None) => Err(Error::protocol(
                "Inbound message has neither id nor method",
            )),
        }
    }

    /// Returns the correlation id for responses.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<CallId> {
        match self {
            Self::Response(response) => Some(response.id),
            Self::Event(_) => None,
        }
    }

    /// Returns the method name for events.
    #[inline]
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Response(_) => None,
            Self::Event(event) => Some(&event.method),
        }
    }

    /// Returns `true` if this is the response to `id`.
    #[inline]
    #[must_use]
    pub fn is_response_to(&self, id: CallId) -> bool {
        self.id() == Some(id)
    }

    /// Returns `true` if this is an event named `name`.
    #[inline]
    #[must_use]
    pub fn is_event(&self, name: &str) -> bool {
        self.method() == Some(name)
    }
}

// ============================================================================
// Tests
// ============================================================================
