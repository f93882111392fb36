use std::{
  fmt::Debug,
  hash::Hash,
  panic::{
    AssertUnwindSafe,
    catch_unwind,
  },
  sync::{
    Arc,
    Weak,
  },
};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::Disposable;

/// An event that listeners subscribe to by kind.
pub trait Event: Send + Sync + 'static {
  type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

  fn kind(&self) -> Self::Kind;
}

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Slots<E: Event> {
  next_id:   u64,
  listeners: HashMap<E::Kind, Vec<(u64, Listener<E>)>>,
}

impl<E: Event> Slots<E> {
  fn remove(&mut self, kind: E::Kind, id: u64) {
    if let Some(listeners) = self.listeners.get_mut(&kind) {
      listeners.retain(|(listener_id, _)| *listener_id != id);
      if listeners.is_empty() {
        self.listeners.remove(&kind);
      }
    }
  }
}

/// Synchronous fan-out of events to listeners registered per event kind.
///
/// Listeners run on the emitting task, in subscription order. A panicking
/// listener is logged and skipped; the remaining listeners still run.
pub struct Emitter<E: Event> {
  slots: Arc<Mutex<Slots<E>>>,
}

impl<E: Event> Default for Emitter<E> {
  fn default() -> Self {
    Self::new()
  }
}

impl<E: Event> Emitter<E> {
  pub fn new() -> Self {
    Self {
      slots: Arc::new(Mutex::new(Slots {
        next_id:   1,
        listeners: HashMap::new(),
      })),
    }
  }

  pub fn on<F>(&self, kind: E::Kind, listener: F) -> Disposable
  where
    F: Fn(&E) + Send + Sync + 'static,
  {
    let id = {
      let mut slots = self.slots.lock();
      let id = slots.next_id;
      slots.next_id = slots.next_id.saturating_add(1);
      slots
        .listeners
        .entry(kind)
        .or_default()
        .push((id, Arc::new(listener)));
      id
    };

    let slots: Weak<Mutex<Slots<E>>> = Arc::downgrade(&self.slots);
    Disposable::new(move || {
      if let Some(slots) = slots.upgrade() {
        slots.lock().remove(kind, id);
      }
    })
  }

  /// Deliver `event` to every listener of its kind. Returns how many
  /// listeners were invoked.
  pub fn emit(&self, event: &E) -> usize {
    let kind = event.kind();
    let listeners: Vec<Listener<E>> = {
      let slots = self.slots.lock();
      slots
        .listeners
        .get(&kind)
        .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
        .unwrap_or_default()
    };

    for listener in &listeners {
      if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
        tracing::error!(?kind, "event listener panicked");
      }
    }
    listeners.len()
  }

  pub fn listener_count(&self, kind: E::Kind) -> usize {
    self
      .slots
      .lock()
      .listeners
      .get(&kind)
      .map(Vec::len)
      .unwrap_or(0)
  }

  pub fn clear(&self) {
    self.slots.lock().listeners.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  enum Kind {
    Ping,
    Pong,
  }

  #[derive(Debug)]
  struct TestEvent(Kind, u32);

  impl Event for TestEvent {
    type Kind = Kind;

    fn kind(&self) -> Kind {
      self.0
    }
  }

  #[test]
  fn emit_reaches_only_matching_kind_in_order() {
    let emitter = Emitter::<TestEvent>::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = log.clone();
    let _a = emitter.on(Kind::Ping, move |event| first.lock().push(("a", event.1)));
    let second = log.clone();
    let _b = emitter.on(Kind::Ping, move |event| second.lock().push(("b", event.1)));
    let third = log.clone();
    let _c = emitter.on(Kind::Pong, move |event| third.lock().push(("c", event.1)));

    assert_eq!(emitter.emit(&TestEvent(Kind::Ping, 7)), 2);
    assert_eq!(*log.lock(), vec![("a", 7), ("b", 7)]);
  }

  #[test]
  fn disposing_removes_exactly_one_listener() {
    let emitter = Emitter::<TestEvent>::new();
    let mut a = emitter.on(Kind::Ping, |_| {});
    let _b = emitter.on(Kind::Ping, |_| {});
    assert_eq!(emitter.listener_count(Kind::Ping), 2);

    a.dispose();
    assert_eq!(emitter.listener_count(Kind::Ping), 1);
  }

  #[test]
  fn panicking_listener_does_not_stop_others() {
    let emitter = Emitter::<TestEvent>::new();
    let hits = Arc::new(Mutex::new(0));
    let _bad = emitter.on(Kind::Pong, |_| panic!("listener failure"));
    let counter = hits.clone();
    let _good = emitter.on(Kind::Pong, move |_| *counter.lock() += 1);

    emitter.emit(&TestEvent(Kind::Pong, 0));
    assert_eq!(*hits.lock(), 1);
  }

  #[test]
  fn dispose_after_emitter_dropped_is_harmless() {
    let emitter = Emitter::<TestEvent>::new();
    let mut handle = emitter.on(Kind::Ping, |_| {});
    drop(emitter);
    handle.dispose();
    assert!(handle.is_disposed());
  }

  #[test]
  fn clear_drops_all_listeners() {
    let emitter = Emitter::<TestEvent>::new();
    let _a = emitter.on(Kind::Ping, |_| {});
    let _b = emitter.on(Kind::Pong, |_| {});
    emitter.clear();
    assert_eq!(emitter.emit(&TestEvent(Kind::Ping, 1)), 0);
    assert_eq!(emitter.listener_count(Kind::Pong), 0);
  }
}
