//! Host-side functions the peer can invoke by token.
//!
//! Functions cannot cross the process boundary, so each one is parked here
//! under an opaque token; the peer sends `executeCallback` with
//! `{ callbackId, args }` to run it.

use std::{
  collections::HashMap,
  fmt,
  sync::{
    Arc,
    atomic::{
      AtomicU64,
      Ordering,
    },
  },
};

use anyhow::Context as _;
use parking_lot::Mutex;
use serde::{
  Deserialize,
  Serialize,
};
use serde_json::{
  Value,
  json,
};
use tracing::{
  debug,
  warn,
};

use crate::{
  Bridge,
  BridgeError,
  HandlerRegistration,
};

pub const EXECUTE_CALLBACK_ACTION: &str = "executeCallback";

pub type Callback = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackToken(String);

impl CallbackToken {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Shape the peer receives in place of the function.
  pub fn to_peer_value(&self) -> Value {
    json!({ "callbackId": self.0 })
  }
}

impl fmt::Display for CallbackToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteCallbackPayload {
  callback_id: String,
  #[serde(default)]
  args:        Vec<Value>,
}

pub struct CallbackRegistry {
  callbacks: Mutex<HashMap<String, Callback>>,
  next_id:   AtomicU64,
}

impl Default for CallbackRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl CallbackRegistry {
  pub fn new() -> Self {
    Self {
      callbacks: Mutex::new(HashMap::new()),
      next_id:   AtomicU64::new(1),
    }
  }

  pub fn register<F>(&self, callback: F) -> CallbackToken
  where
    F: Fn(Vec<Value>) + Send + Sync + 'static,
  {
    self.register_arc(Arc::new(callback))
  }

  pub fn register_arc(&self, callback: Callback) -> CallbackToken {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let token = CallbackToken(format!("cb-{id}"));
    self.callbacks.lock().insert(token.0.clone(), callback);
    token
  }

  pub fn unregister(&self, token: &CallbackToken) -> bool {
    self.callbacks.lock().remove(&token.0).is_some()
  }

  pub fn contains(&self, token: &CallbackToken) -> bool {
    self.callbacks.lock().contains_key(&token.0)
  }

  pub fn len(&self) -> usize {
    self.callbacks.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Run the callback registered under `callback_id`.
  pub fn execute(&self, callback_id: &str, args: Vec<Value>) -> Result<(), BridgeError> {
    let callback = self.callbacks.lock().get(callback_id).cloned();
    let Some(callback) = callback else {
      return Err(BridgeError::NotFound {
        kind: "callback",
        id:   callback_id.to_string(),
      });
    };
    debug!(callback_id, args = args.len(), "executing callback");
    callback(args);
    Ok(())
  }

  /// Serve `executeCallback` messages arriving on `bridge`.
  pub fn attach(self: &Arc<Self>, bridge: &Bridge) -> HandlerRegistration {
    let registry = Arc::downgrade(self);
    bridge.register_handler(EXECUTE_CALLBACK_ACTION, move |envelope| {
      let registry = registry.clone();
      async move {
        let Some(registry) = registry.upgrade() else {
          return Ok(());
        };
        let payload: ExecuteCallbackPayload =
          serde_json::from_value(envelope.payload.unwrap_or(Value::Null))
            .context("invalid executeCallback payload")?;
        // Stale ids are expected after a buffer is deleted.
        if let Err(err) = registry.execute(&payload.callback_id, payload.args) {
          warn!(%err, "ignoring executeCallback");
        }
        Ok(())
      }
    })
  }

  pub fn clear(&self) {
    self.callbacks.lock().clear();
  }
}

impl fmt::Debug for CallbackRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CallbackRegistry")
      .field("len", &self.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn execute_runs_registered_callback_with_args() {
    let registry = CallbackRegistry::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let token = registry.register(move |args| sink.lock().push(args));

    registry.execute(token.as_str(), vec![json!("saved")]).unwrap();
    assert_eq!(*seen.lock(), vec![vec![json!("saved")]]);
  }

  #[test]
  fn unknown_and_unregistered_ids_are_ignored() {
    let registry = CallbackRegistry::new();
    let err = registry.execute("cb-404", vec![]).unwrap_err();
    assert!(matches!(err, BridgeError::NotFound { kind: "callback", ref id } if id == "cb-404"));

    let token = registry.register(|_| {});
    assert!(registry.unregister(&token));
    assert!(!registry.unregister(&token));
    assert!(registry.execute(token.as_str(), vec![]).is_err());
  }

  #[test]
  fn token_peer_value_carries_callback_id() {
    let registry = CallbackRegistry::new();
    let token = registry.register(|_| {});
    assert_eq!(token.to_peer_value(), json!({ "callbackId": "cb-1" }));
  }
}
