use std::time::{
  SystemTime,
  UNIX_EPOCH,
};

use serde::{
  Deserialize,
  Serialize,
};
use serde_json::Value;

use crate::{
  BridgeError,
  DecodeError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
  Request,
  Response,
  Notification,
}

/// Unit of cross-runtime traffic, serialized as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
  pub id:             String,
  #[serde(rename = "type")]
  pub kind:           MessageType,
  pub action:         String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payload:        Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timestamp:      Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub correlation_id: Option<String>,
}

impl Envelope {
  pub fn request(id: impl Into<String>, action: impl Into<String>, payload: Option<Value>) -> Self {
    Self::new(id.into(), MessageType::Request, action.into(), payload)
  }

  pub fn notification(
    id: impl Into<String>,
    action: impl Into<String>,
    payload: Option<Value>,
  ) -> Self {
    Self::new(id.into(), MessageType::Notification, action.into(), payload)
  }

  /// Build the response to `request`; the request id is echoed both as the
  /// envelope id and as the correlation id.
  pub fn response_to(request: &Envelope, action: impl Into<String>, payload: Option<Value>) -> Self {
    let mut response = Self::new(
      request.id.clone(),
      MessageType::Response,
      action.into(),
      payload,
    );
    response.correlation_id = Some(request.id.clone());
    response
  }

  fn new(id: String, kind: MessageType, action: String, payload: Option<Value>) -> Self {
    Self {
      id,
      kind,
      action,
      payload,
      timestamp: Some(now_millis()),
      correlation_id: None,
    }
  }

  pub fn is_request(&self) -> bool {
    self.kind == MessageType::Request
  }

  pub fn is_response(&self) -> bool {
    self.kind == MessageType::Response
  }

  /// Id of the request this envelope answers.
  pub fn correlation_key(&self) -> &str {
    self.correlation_id.as_deref().unwrap_or(&self.id)
  }

  pub fn encode(&self) -> Result<String, BridgeError> {
    serde_json::to_string(self).map_err(BridgeError::Encode)
  }

  pub fn decode(serialized: &str) -> Result<Self, DecodeError> {
    serde_json::from_str(serialized).map_err(DecodeError::from)
  }
}

pub(crate) fn now_millis() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn encode_decode_round_trip() {
    let mut request = Envelope::request("host-1", "ping", Some(json!({ "n": 1, "tags": ["a"] })));
    request.correlation_id = Some("outer".into());
    let decoded = Envelope::decode(&request.encode().unwrap()).unwrap();
    assert_eq!(decoded, request);
  }

  #[test]
  fn wire_shape_uses_type_tag_and_camel_case() {
    let request = Envelope::request("7", "ping", None);
    let response = Envelope::response_to(&request, "pong", None);
    let value: Value = serde_json::from_str(&response.encode().unwrap()).unwrap();
    assert_eq!(value["type"], "RESPONSE");
    assert_eq!(value["correlationId"], "7");
    assert!(value.get("payload").is_none());
  }

  #[test]
  fn null_payload_normalizes_to_absent() {
    let decoded =
      Envelope::decode(r#"{"id":"1","type":"NOTIFICATION","action":"x","payload":null}"#).unwrap();
    assert_eq!(decoded.payload, None);
    assert_eq!(decoded.timestamp, None);
  }

  #[test]
  fn malformed_input_is_a_decode_error() {
    assert!(Envelope::decode("{not json").is_err());
    assert!(Envelope::decode(r#"{"id":"1","type":"SHOUT","action":"x"}"#).is_err());
    assert!(Envelope::decode(r#"{"type":"REQUEST","action":"x"}"#).is_err());
  }

  #[test]
  fn correlation_key_prefers_correlation_id() {
    let request = Envelope::request("a", "ping", None);
    let mut response = Envelope::response_to(&request, "pong", None);
    assert_eq!(response.correlation_key(), "a");
    response.correlation_id = None;
    response.id = "b".into();
    assert_eq!(response.correlation_key(), "b");
  }
}
