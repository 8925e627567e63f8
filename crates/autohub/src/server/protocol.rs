//! RPC Protocol Frames
//!
//! A call is a JSON object `{method, arguments?, sequence?}`. The server
//! answers with a `response` frame and pushes `message` frames for topics a
//! session subscribed to.

use hub_bus::BusError;
use hub_types::{Uuid, Value, ValueMap};
use serde::{Deserialize, Serialize};

use crate::registry::RegistryError;

/// Errors reported back to the caller as the `result` text
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Method name not specified in call.")]
    MissingMethod,

    #[error("Method parameters must be provided as a dictionary.")]
    InvalidArguments,

    #[error("Method not implemented.")]
    NotImplemented,

    #[error("Authentication required.")]
    AuthenticationRequired,

    #[error("Missing required parameter '{0}'.")]
    MissingParameter(&'static str),

    #[error("Parameter '{name}' {reason}.")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Frames sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Outcome of a method call; `result` is the error text on failure
    Response {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence: Option<Value>,
        result: Value,
    },

    /// A message delivered to one of the session's subscriptions
    Message {
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<Uuid>,
        payload: ValueMap,
    },
}

impl ServerFrame {
    pub fn success(sequence: Option<Value>, result: impl Into<Value>) -> Self {
        Self::Response {
            success: true,
            sequence,
            result: result.into(),
        }
    }

    pub fn failure(sequence: Option<Value>, error: &RpcError) -> Self {
        Self::Response {
            success: false,
            sequence,
            result: Value::String(error.to_string()),
        }
    }

    pub fn to_json(&self) -> RpcResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Typed access to call arguments
pub struct Arguments<'a> {
    values: &'a ValueMap,
}

impl<'a> Arguments<'a> {
    pub fn new(values: &'a ValueMap) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &'static str) -> RpcResult<&'a Value> {
        self.values
            .get(name)
            .filter(|value| !value.is_null())
            .ok_or(RpcError::MissingParameter(name))
    }

    pub fn str(&self, name: &'static str) -> RpcResult<&'a str> {
        self.get(name)?
            .as_str()
            .ok_or_else(|| RpcError::InvalidParameter {
                name,
                reason: "must be a string".into(),
            })
    }

    pub fn map(&self, name: &'static str) -> RpcResult<&'a ValueMap> {
        self.get(name)?
            .as_map()
            .ok_or_else(|| RpcError::InvalidParameter {
                name,
                reason: "must be a dictionary".into(),
            })
    }

    pub fn uuid(&self, name: &'static str) -> RpcResult<Uuid> {
        let text = self.str(name)?;
        Uuid::parse_str(text).map_err(|e| RpcError::InvalidParameter {
            name,
            reason: format!("is not a UUID ({e})"),
        })
    }

    /// `None` when the argument is absent
    pub fn optional_uuid(&self, name: &'static str) -> RpcResult<Option<Uuid>> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.uuid(name).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serialize() {
        let frame = ServerFrame::success(Some(Value::Int(7)), true);
        let json = frame.to_json().unwrap();
        assert!(json.contains("\"type\":\"response\""));
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"sequence\":7"));

        let frame = ServerFrame::failure(None, &RpcError::NotImplemented);
        let json = frame.to_json().unwrap();
        assert!(!json.contains("sequence"));
        assert!(json.contains("Method not implemented."));
    }

    #[test]
    fn test_message_frame_serialize() {
        let frame = ServerFrame::Message {
            topic: "public/lights".into(),
            source: None,
            payload: Value::map_from_pairs([("on", true)])
                .as_map()
                .cloned()
                .unwrap(),
        };
        let json = frame.to_json().unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"topic\":\"public/lights\""));
        assert!(!json.contains("source"));
    }

    #[test]
    fn test_arguments() {
        let uuid = Uuid::new_v4();
        let values = Value::map_from_pairs([
            ("topic", Value::from("public/a")),
            ("uuid", Value::from(uuid)),
            ("bad", Value::from("not-a-uuid")),
            ("nothing", Value::Null),
        ]);
        let args = Arguments::new(values.as_map().unwrap());
        assert_eq!(args.str("topic").unwrap(), "public/a");
        assert_eq!(args.uuid("uuid").unwrap(), uuid);
        assert!(matches!(args.uuid("bad"), Err(RpcError::InvalidParameter { .. })));
        assert!(matches!(args.map("topic"), Err(RpcError::InvalidParameter { .. })));
        assert!(matches!(args.get("nothing"), Err(RpcError::MissingParameter(_))));
        assert_eq!(args.optional_uuid("missing").unwrap(), None);
    }
}
