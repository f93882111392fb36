//! Reactive controller over the lifecycle of peer-managed buffers.

mod api;
mod change_source;
mod event;
mod patch;
mod route;
mod router;

pub use api::{
  BufferManagerApi,
  DEFAULT_BUFFER_MODULE,
};
pub use change_source::{
  ChangeSource,
  DEFAULT_POLL_INTERVAL,
  HostEventSource,
  HostFocusEvent,
  PollingSource,
  change_source_for,
};
pub use event::{
  RouterEvent,
  RouterEventKind,
};
pub use patch::{
  LinePatch,
  changed_lines,
};
pub use route::{
  BufferQuery,
  BufferRoute,
  has_buffer_changed,
};
pub use router::{
  BufferRouter,
  RouterError,
};
