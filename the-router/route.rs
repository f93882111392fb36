use std::{
  collections::BTreeMap,
  fmt,
  sync::Arc,
};

use serde::{
  Deserialize,
  Deserializer,
  Serialize,
  de::Error as _,
};
use serde_json::{
  Map,
  Value,
};
use the_bridge::{
  Callback,
  CallbackRegistry,
  CallbackToken,
};
use tracing::warn;

/// A peer-managed buffer as the peer describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferRoute {
  #[serde(deserialize_with = "deserialize_id")]
  pub id:             String,
  pub path:           String,
  #[serde(default, deserialize_with = "deserialize_query")]
  pub query:          Map<String, Value>,
  #[serde(default, alias = "created_at", deserialize_with = "deserialize_timestamp")]
  pub created_at:     u64,
  #[serde(default, alias = "nvim_buffer_id", skip_serializing_if = "Option::is_none")]
  pub nvim_buffer_id: Option<i64>,
}

impl BufferRoute {
  /// Route built on the host side when the peer only reported an id.
  pub fn new(id: impl Into<String>, path: impl Into<String>, query: Map<String, Value>) -> Self {
    Self {
      id:             id.into(),
      path:           path.into(),
      query,
      created_at:     0,
      nvim_buffer_id: None,
    }
  }

  /// Decode a route from a peer reply. `nil` and `false` mean "no buffer".
  pub fn from_peer(value: Value) -> Result<Option<Self>, serde_json::Error> {
    match value {
      Value::Null | Value::Bool(false) => Ok(None),
      value => serde_json::from_value(value).map(Some),
    }
  }
}

/// Whether the current-buffer shadow moved from `old` to `new`.
///
/// Identity is id, path and query; timestamps and the numeric buffer handle
/// are ignored.
pub fn has_buffer_changed(old: Option<&BufferRoute>, new: Option<&BufferRoute>) -> bool {
  match (old, new) {
    (None, None) => false,
    (Some(old), Some(new)) => {
      old.id != new.id || old.path != new.path || old.query != new.query
    },
    _ => true,
  }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(id) => Ok(id),
    Value::Number(id) => Ok(id.to_string()),
    other => Err(D::Error::custom(format!("expected buffer id, got {other}"))),
  }
}

// An empty Lua table has no way to say it is a map.
fn deserialize_query<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::Object(map) => Ok(map),
    Value::Null => Ok(Map::new()),
    Value::Array(items) if items.is_empty() => Ok(Map::new()),
    other => Err(D::Error::custom(format!("expected query table, got {other}"))),
  }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::Null => Ok(0),
    Value::Number(number) => {
      number
        .as_u64()
        .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .ok_or_else(|| D::Error::custom(format!("invalid timestamp {number}")))
    },
    other => Err(D::Error::custom(format!("expected timestamp, got {other}"))),
  }
}

/// Parameters of a buffer: plain props sent as-is, plus host functions the
/// peer can call back.
#[derive(Clone, Default)]
pub struct BufferQuery {
  pub static_props:   Map<String, Value>,
  pub event_handlers: BTreeMap<String, Callback>,
}

impl BufferQuery {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_props(static_props: Map<String, Value>) -> Self {
    Self {
      static_props,
      event_handlers: BTreeMap::new(),
    }
  }

  pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.static_props.insert(key.into(), value.into());
    self
  }

  pub fn on<F>(mut self, name: impl Into<String>, handler: F) -> Self
  where
    F: Fn(Vec<Value>) + Send + Sync + 'static,
  {
    self.event_handlers.insert(name.into(), Arc::new(handler));
    self
  }

  pub fn is_empty(&self) -> bool {
    self.static_props.is_empty() && self.event_handlers.is_empty()
  }

  /// Register every handler in `registry` and build the table the peer
  /// receives. Returns the tokens so the caller can release them later.
  pub fn into_peer_value(self, registry: &CallbackRegistry) -> (Value, Vec<CallbackToken>) {
    let mut table = self.static_props;
    let mut tokens = Vec::with_capacity(self.event_handlers.len());
    for (name, handler) in self.event_handlers {
      let token = registry.register_arc(handler);
      if table.insert(name.clone(), token.to_peer_value()).is_some() {
        warn!(key = %name, "event handler shadows a static prop of the same name");
      }
      tokens.push(token);
    }
    (Value::Object(table), tokens)
  }
}

impl fmt::Debug for BufferQuery {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BufferQuery")
      .field("static_props", &self.static_props)
      .field("event_handlers", &self.event_handlers.keys().collect::<Vec<_>>())
      .finish()
  }
}
