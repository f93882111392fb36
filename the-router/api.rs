use serde_json::Value;
use the_bridge::PeerCall;

use crate::LinePatch;

pub const DEFAULT_BUFFER_MODULE: &str = "nvim_ui.buffer_manager";

/// Builds calls into the peer's buffer-manager module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferManagerApi {
  module: String,
}

impl Default for BufferManagerApi {
  fn default() -> Self {
    Self::new(DEFAULT_BUFFER_MODULE)
  }
}

impl BufferManagerApi {
  pub fn new(module: impl Into<String>) -> Self {
    Self {
      module: module.into(),
    }
  }

  pub fn module(&self) -> &str {
    &self.module
  }

  fn call(&self, function: &str) -> PeerCall {
    PeerCall::new(self.module.clone(), function)
  }

  pub fn create_buffer(&self, path: &str, query: Value) -> PeerCall {
    self.call("create_buffer").arg(path).arg(query)
  }

  pub fn delete_buffer(&self, id: &str) -> PeerCall {
    self.call("delete_buffer").arg(id)
  }

  pub fn switch_buffer(&self, identifier: &str) -> PeerCall {
    self.call("switch_buffer").arg(identifier)
  }

  pub fn get_current_buffer(&self) -> PeerCall {
    self.call("get_current_buffer")
  }

  pub fn get_buffer_info(&self, id: &str) -> PeerCall {
    self.call("get_buffer_info").arg(id)
  }

  pub fn update_buffer_content(&self, id: &str, patches: &[LinePatch]) -> PeerCall {
    let lines: Vec<Value> = patches.iter().map(LinePatch::to_peer_value).collect();
    self.call("update_buffer_content").arg(id).arg(lines)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn update_call_encodes_patches() {
    let api = BufferManagerApi::default();
    let call = api.update_buffer_content("B1", &[LinePatch::Keep, LinePatch::Delete]);
    assert_eq!(
      call.to_lua(),
      r#"return require("nvim_ui.buffer_manager").update_buffer_content("B1", {false, {delete = true}})"#
    );
  }
}
