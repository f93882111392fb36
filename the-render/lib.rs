//! Virtual node trees rendered to buffer lines, and line-level patches
//! against what was last written.

mod diff;
mod renderer;
mod vnode;

pub use diff::compute_diff;
pub use renderer::{
  ContentSink,
  DiffRenderer,
  RenderError,
};
pub use vnode::{
  VNode,
  render_vnode,
};
