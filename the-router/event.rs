use std::fmt;

use the_event::Event;

use crate::BufferRoute;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterEventKind {
  BufferCreated,
  BufferDeleted,
  BufferSwitched,
  BufferUpdated,
  CurrentBufferChanged,
}

impl RouterEventKind {
  pub const ALL: [Self; 5] = [
    Self::BufferCreated,
    Self::BufferDeleted,
    Self::BufferSwitched,
    Self::BufferUpdated,
    Self::CurrentBufferChanged,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::BufferCreated => "BUFFER_CREATED",
      Self::BufferDeleted => "BUFFER_DELETED",
      Self::BufferSwitched => "BUFFER_SWITCHED",
      Self::BufferUpdated => "BUFFER_UPDATED",
      Self::CurrentBufferChanged => "CURRENT_BUFFER_CHANGED",
    }
  }
}

impl fmt::Display for RouterEventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
  BufferCreated(BufferRoute),
  BufferDeleted {
    id:          String,
    /// Snapshot taken before deletion; `None` when neither the peer nor the
    /// local cache knew the buffer.
    buffer_info: Option<BufferRoute>,
  },
  BufferSwitched {
    identifier: String,
  },
  BufferUpdated {
    id:            String,
    changed_lines: usize,
  },
  CurrentBufferChanged {
    old_buffer: Option<BufferRoute>,
    new_buffer: Option<BufferRoute>,
  },
}

impl Event for RouterEvent {
  type Kind = RouterEventKind;

  fn kind(&self) -> RouterEventKind {
    match self {
      Self::BufferCreated(_) => RouterEventKind::BufferCreated,
      Self::BufferDeleted { .. } => RouterEventKind::BufferDeleted,
      Self::BufferSwitched { .. } => RouterEventKind::BufferSwitched,
      Self::BufferUpdated { .. } => RouterEventKind::BufferUpdated,
      Self::CurrentBufferChanged { .. } => RouterEventKind::CurrentBufferChanged,
    }
  }
}
