use serde_json::{
  Value,
  json,
};

/// What happens to one line index of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePatch {
  Keep,
  Delete,
  Replace(String),
}

impl LinePatch {
  pub fn is_keep(&self) -> bool {
    matches!(self, Self::Keep)
  }

  /// Peer encoding: `false` keeps, `{ delete = true }` deletes, a string
  /// replaces.
  pub fn to_peer_value(&self) -> Value {
    match self {
      Self::Keep => Value::Bool(false),
      Self::Delete => json!({ "delete": true }),
      Self::Replace(text) => Value::String(text.clone()),
    }
  }
}

pub fn changed_lines(patches: &[LinePatch]) -> usize {
  patches.iter().filter(|patch| !patch.is_keep()).count()
}
