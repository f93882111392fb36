use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;
use the_router::{
  BufferRouter,
  LinePatch,
  RouterError,
  changed_lines,
};
use thiserror::Error;
use tracing::{
  debug,
  warn,
};

use crate::{
  VNode,
  compute_diff,
  render_vnode,
};

#[derive(Debug, Error)]
pub enum RenderError {
  #[error(transparent)]
  Router(#[from] RouterError),
}

/// Where rendered patches are written.
#[async_trait]
pub trait ContentSink: Send + Sync {
  /// Apply `patches` to buffer `id`. `Ok(false)` means the write did not
  /// happen.
  async fn update_content(&self, id: &str, patches: &[LinePatch]) -> Result<bool, RenderError>;
}

#[async_trait]
impl ContentSink for BufferRouter {
  async fn update_content(&self, id: &str, patches: &[LinePatch]) -> Result<bool, RenderError> {
    Ok(self.update_buffer_content(id, patches).await?)
  }
}

/// Writes rendered lines through a [`ContentSink`], touching only the lines
/// that differ from the last successful write to the same buffer.
pub struct DiffRenderer {
  sink:  Arc<dyn ContentSink>,
  cache: Mutex<HashMap<String, Vec<String>>>,
}

impl DiffRenderer {
  pub fn new(sink: Arc<dyn ContentSink>) -> Self {
    Self {
      sink,
      cache: Mutex::new(HashMap::new()),
    }
  }

  /// Bring buffer `id` to `new_lines`.
  ///
  /// Returns `Ok(true)` when the buffer already matched or the update was
  /// written. The cache only moves forward after a successful write, so a
  /// failed update is retried in full by the next call.
  pub async fn apply_diff(&self, id: &str, new_lines: Vec<String>) -> Result<bool, RenderError> {
    let patches = {
      let cache = self.cache.lock();
      let old = cache.get(id).map(Vec::as_slice).unwrap_or_default();
      compute_diff(old, &new_lines)
    };

    let changed = changed_lines(&patches);
    if changed == 0 {
      debug!(id, "render produced no changes");
      return Ok(true);
    }

    if !self.sink.update_content(id, &patches).await? {
      warn!(id, changed, "buffer update failed; keeping previous render cache");
      return Ok(false);
    }

    debug!(id, changed, lines = new_lines.len(), "buffer updated");
    self.cache.lock().insert(id.to_string(), new_lines);
    Ok(true)
  }

  pub async fn render(&self, id: &str, node: &VNode) -> Result<bool, RenderError> {
    self.apply_diff(id, render_vnode(node)).await
  }

  /// Drop the cache for `id`, e.g. after the buffer was deleted. The next
  /// render rewrites every line.
  pub fn forget(&self, id: &str) -> bool {
    self.cache.lock().remove(id).is_some()
  }

  pub fn cached_lines(&self, id: &str) -> Option<Vec<String>> {
    self.cache.lock().get(id).cloned()
  }

  pub fn clear(&self) {
    self.cache.lock().clear();
  }
}
