//! In-memory stand-in for the peer's buffer-manager module.
//!
//! Replies are shaped the way the Lua side would send them over msgpack:
//! routes are tables, missing buffers are `nil`, confirmations are booleans.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{
  Value,
  json,
};
use the_bridge::{
  PeerCall,
  PeerCallError,
  PeerRpc,
};

#[derive(Debug, Clone, PartialEq)]
pub struct FakeBuffer {
  pub id:             String,
  pub path:           String,
  pub query:          Value,
  pub created_at:     u64,
  pub nvim_buffer_id: i64,
  pub lines:          Vec<String>,
}

impl FakeBuffer {
  fn to_route(&self) -> Value {
    json!({
      "id": self.id,
      "path": self.path,
      "query": self.query,
      "createdAt": self.created_at,
      "nvimBufferId": self.nvim_buffer_id,
    })
  }
}

#[derive(Debug, Default)]
struct State {
  buffers:  Vec<FakeBuffer>,
  current:  Option<String>,
  next_id:  u64,
  calls:    Vec<PeerCall>,
  failing:  HashSet<String>,
  refusing: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct FakeBufferManager {
  state: Mutex<State>,
}

impl FakeBufferManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every call to `function` fails with a remote error.
  pub fn fail(&self, function: &str) {
    self.state.lock().failing.insert(function.to_string());
  }

  /// Every call to `function` answers `false`.
  pub fn refuse(&self, function: &str) {
    self.state.lock().refusing.insert(function.to_string());
  }

  pub fn heal(&self) {
    let mut state = self.state.lock();
    state.failing.clear();
    state.refusing.clear();
  }

  pub fn calls(&self) -> Vec<PeerCall> {
    self.state.lock().calls.clone()
  }

  pub fn calls_to(&self, function: &str) -> usize {
    self
      .state
      .lock()
      .calls
      .iter()
      .filter(|call| call.function == function)
      .count()
  }

  pub fn buffer(&self, id: &str) -> Option<FakeBuffer> {
    self
      .state
      .lock()
      .buffers
      .iter()
      .find(|buffer| buffer.id == id)
      .cloned()
  }

  pub fn lines(&self, id: &str) -> Vec<String> {
    self.buffer(id).map(|buffer| buffer.lines).unwrap_or_default()
  }

  pub fn current(&self) -> Option<String> {
    self.state.lock().current.clone()
  }

  /// Move focus as if the user had entered another window.
  pub fn focus(&self, id: Option<&str>) {
    self.state.lock().current = id.map(str::to_string);
  }

  fn dispatch(state: &mut State, call: &PeerCall) -> Result<Value, PeerCallError> {
    let arg = |idx: usize| call.args.get(idx).cloned().unwrap_or(Value::Null);
    let text = |idx: usize| -> Result<String, PeerCallError> {
      match arg(idx) {
        Value::String(text) => Ok(text),
        other => Err(PeerCallError::Remote(format!("bad argument #{}: {other}", idx + 1))),
      }
    };

    match call.function.as_str() {
      "create_buffer" => {
        let path = text(0)?;
        let query = match arg(1) {
          Value::Null => json!([]),
          query => query,
        };
        state.next_id += 1;
        let buffer = FakeBuffer {
          id: format!("B{}", state.next_id),
          path,
          query,
          created_at: 1_700_000_000_000 + state.next_id,
          nvim_buffer_id: state.next_id as i64 + 100,
          lines: Vec::new(),
        };
        let route = buffer.to_route();
        state.current = Some(buffer.id.clone());
        state.buffers.push(buffer);
        Ok(route)
      },
      "delete_buffer" => {
        let id = text(0)?;
        let before = state.buffers.len();
        state.buffers.retain(|buffer| buffer.id != id);
        if state.buffers.len() == before {
          return Ok(Value::Bool(false));
        }
        if state.current.as_deref() == Some(id.as_str()) {
          state.current = state.buffers.last().map(|buffer| buffer.id.clone());
        }
        Ok(Value::Bool(true))
      },
      "switch_buffer" => {
        let identifier = text(0)?;
        let found = state
          .buffers
          .iter()
          .find(|buffer| buffer.id == identifier || buffer.path == identifier)
          .map(|buffer| buffer.id.clone());
        match found {
          Some(id) => {
            state.current = Some(id);
            Ok(Value::Bool(true))
          },
          None => Ok(Value::Bool(false)),
        }
      },
      "get_current_buffer" => {
        Ok(
          state
            .current
            .as_ref()
            .and_then(|id| state.buffers.iter().find(|buffer| &buffer.id == id))
            .map(FakeBuffer::to_route)
            .unwrap_or(Value::Null),
        )
      },
      "get_buffer_info" => {
        let id = text(0)?;
        Ok(
          state
            .buffers
            .iter()
            .find(|buffer| buffer.id == id)
            .map(FakeBuffer::to_route)
            .unwrap_or(Value::Null),
        )
      },
      "update_buffer_content" => {
        let id = text(0)?;
        let Value::Array(patches) = arg(1) else {
          return Err(PeerCallError::Remote("bad argument #2: expected lines".into()));
        };
        let Some(buffer) = state.buffers.iter_mut().find(|buffer| buffer.id == id) else {
          return Ok(Value::Bool(false));
        };
        apply_patches(&mut buffer.lines, &patches);
        Ok(Value::Bool(true))
      },
      other => Err(PeerCallError::Remote(format!("attempt to call a nil value (field '{other}')"))),
    }
  }
}

fn apply_patches(lines: &mut Vec<String>, patches: &[Value]) {
  let mut deleted = Vec::new();
  for (idx, patch) in patches.iter().enumerate() {
    match patch {
      Value::String(text) if idx < lines.len() => lines[idx] = text.clone(),
      Value::String(text) => lines.push(text.clone()),
      Value::Object(map) if map.get("delete") == Some(&Value::Bool(true)) => deleted.push(idx),
      _ => {},
    }
  }
  for idx in deleted.into_iter().rev() {
    if idx < lines.len() {
      lines.remove(idx);
    }
  }
}

#[async_trait]
impl PeerRpc for FakeBufferManager {
  async fn call(&self, call: PeerCall) -> Result<Value, PeerCallError> {
    let mut state = self.state.lock();
    state.calls.push(call.clone());
    if state.failing.contains(&call.function) {
      return Err(PeerCallError::Remote(format!("{} failed", call.function)));
    }
    if state.refusing.contains(&call.function) {
      return Ok(Value::Bool(false));
    }
    Self::dispatch(&mut state, &call)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn patches_replace_append_and_delete() {
    let peer = FakeBufferManager::new();
    let route = peer
      .call(PeerCall::new("m", "create_buffer").arg("/p").arg(json!({})))
      .await
      .unwrap();
    let id = route["id"].as_str().unwrap().to_string();

    let update = |lines: Value| PeerCall::new("m", "update_buffer_content").arg(id.clone()).arg(lines);
    peer.call(update(json!(["a", "b", "c"]))).await.unwrap();
    peer
      .call(update(json!([false, { "delete": true }, "C", "d"])))
      .await
      .unwrap();

    assert_eq!(peer.lines(&id), vec!["a", "C", "d"]);
  }
}
