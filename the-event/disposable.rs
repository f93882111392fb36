use std::fmt;

use parking_lot::Mutex;

type Teardown = Box<dyn FnOnce() + Send>;

/// Handle that undoes a registration (a listener, a handler, a background
/// task) when disposed.
///
/// Dropping a `Disposable` does *not* run the teardown; registrations live
/// until they are disposed explicitly or their owner goes away.
#[derive(Default)]
pub struct Disposable {
  teardown: Option<Teardown>,
}

impl Disposable {
  pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
    Self {
      teardown: Some(Box::new(teardown)),
    }
  }

  /// A handle with nothing to undo.
  pub fn empty() -> Self {
    Self { teardown: None }
  }

  /// Combine several handles into one that disposes all of them in order.
  pub fn from_many(disposables: Vec<Disposable>) -> Self {
    Self::new(move || {
      for mut disposable in disposables {
        disposable.dispose();
      }
    })
  }

  /// Run the teardown. Calling this more than once is a no-op.
  pub fn dispose(&mut self) {
    if let Some(teardown) = self.teardown.take() {
      teardown();
    }
  }

  pub fn is_disposed(&self) -> bool {
    self.teardown.is_none()
  }
}

impl fmt::Debug for Disposable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Disposable")
      .field("disposed", &self.is_disposed())
      .finish()
  }
}

#[derive(Default)]
struct StoreState {
  items:    Vec<Disposable>,
  disposed: bool,
}

/// Collection of handles torn down together.
///
/// Handles added after the store was disposed are disposed immediately.
#[derive(Default)]
pub struct DisposableStore {
  state: Mutex<StoreState>,
}

impl DisposableStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&self, mut disposable: Disposable) {
    {
      let mut state = self.state.lock();
      if !state.disposed {
        state.items.push(disposable);
        return;
      }
    }
    disposable.dispose();
  }

  pub fn len(&self) -> usize {
    self.state.lock().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_disposed(&self) -> bool {
    self.state.lock().disposed
  }

  pub fn dispose(&self) {
    let items = {
      let mut state = self.state.lock();
      state.disposed = true;
      std::mem::take(&mut state.items)
    };
    // Teardowns may touch other locks; run them outside ours.
    for mut item in items {
      item.dispose();
    }
  }
}

impl fmt::Debug for DisposableStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("DisposableStore")
      .field("len", &state.items.len())
      .field("disposed", &state.disposed)
      .finish()
  }
}
