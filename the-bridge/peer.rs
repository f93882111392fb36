use async_trait::async_trait;
use serde_json::Value;

use crate::{
  PeerCallError,
  is_lua_identifier,
  serialize_for_peer,
};

/// A call into a Lua module function on the peer side.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerCall {
  pub module:   String,
  pub function: String,
  pub args:     Vec<Value>,
}

impl PeerCall {
  pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
    Self {
      module:   module.into(),
      function: function.into(),
      args:     Vec::new(),
    }
  }

  pub fn arg(mut self, value: impl Into<Value>) -> Self {
    self.args.push(value.into());
    self
  }

  /// Lua chunk evaluating the call and returning its result.
  pub fn to_lua(&self) -> String {
    let module = serialize_for_peer(&Value::String(self.module.clone()));
    let function = if is_lua_identifier(&self.function) {
      format!(".{}", self.function)
    } else {
      format!("[{}]", serialize_for_peer(&Value::String(self.function.clone())))
    };
    let args = self
      .args
      .iter()
      .map(serialize_for_peer)
      .collect::<Vec<_>>()
      .join(", ");
    format!("return require({module}){function}({args})")
  }
}

/// Direct RPC channel to the embedded interpreter.
#[async_trait]
pub trait PeerRpc: Send + Sync {
  async fn call(&self, call: PeerCall) -> Result<Value, PeerCallError>;
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn renders_require_call_with_serialized_args() {
    let call = PeerCall::new("nvim_ui.buffer_manager", "create_buffer")
      .arg("/p")
      .arg(json!({ "q": 1 }));
    assert_eq!(
      call.to_lua(),
      r#"return require("nvim_ui.buffer_manager").create_buffer("/p", {q = 1})"#
    );
  }

  #[test]
  fn non_identifier_function_uses_index_syntax() {
    let call = PeerCall::new("m", "do-thing");
    assert_eq!(call.to_lua(), r#"return require("m")["do-thing"]()"#);
  }
}
