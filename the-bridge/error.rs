use std::time::Duration;

use thiserror::Error;

/// A serialized envelope that could not be decoded.
#[derive(Debug, Error)]
#[error("malformed envelope: {source}")]
pub struct DecodeError {
  #[from]
  source: serde_json::Error,
}

/// Failure of a call across the process boundary.
#[derive(Debug, Error)]
pub enum PeerCallError {
  #[error("peer channel is closed")]
  Closed,
  #[error("peer raised an error: {0}")]
  Remote(String),
  #[error("unexpected reply from peer: {0}")]
  Reply(String),
}

#[derive(Debug, Error)]
pub enum BridgeError {
  #[error(transparent)]
  Decode(#[from] DecodeError),
  #[error("failed to encode envelope: {0}")]
  Encode(#[source] serde_json::Error),
  #[error("handler for `{action}` failed: {message}")]
  Handler { action: String, message: String },
  #[error(transparent)]
  PeerCall(#[from] PeerCallError),
  #[error("request `{action}` ({id}) timed out after {timeout:?}")]
  Timeout {
    action:  String,
    id:      String,
    timeout: Duration,
  },
  #[error("{kind} `{id}` not found")]
  NotFound { kind: &'static str, id: String },
  #[error("bridge has been disposed")]
  Disposed,
}

impl BridgeError {
  pub fn is_timeout(&self) -> bool {
    matches!(self, Self::Timeout { .. })
  }

  pub fn is_disposed(&self) -> bool {
    matches!(self, Self::Disposed)
  }
}
