//! Ways to notice that the focused buffer changed outside of the router.

use std::{
  future::Future,
  sync::Weak,
  time::Duration,
};

use the_event::Disposable;
use tokio::{
  runtime::Handle,
  sync::broadcast::{
    self,
    error::RecvError,
  },
  time::MissedTickBehavior,
};
use tracing::{
  debug,
  warn,
};

use crate::BufferRouter;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Focus change reported by the host editor, e.g. from a `BufEnter` autocmd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostFocusEvent {
  pub nvim_buffer_id: Option<i64>,
}

/// Drives [`BufferRouter::refresh_current_buffer`] from some signal.
pub trait ChangeSource: Send {
  fn name(&self) -> &'static str;

  /// Begin delivering refreshes to `router`. The returned handle stops the
  /// source.
  fn start(self: Box<Self>, router: Weak<BufferRouter>) -> Disposable;
}

/// Fixed-period polling, used when the host has no focus events.
#[derive(Debug, Clone, Copy)]
pub struct PollingSource {
  interval: Duration,
}

impl Default for PollingSource {
  fn default() -> Self {
    Self::new(DEFAULT_POLL_INTERVAL)
  }
}

impl PollingSource {
  pub fn new(interval: Duration) -> Self {
    Self { interval }
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }
}

impl ChangeSource for PollingSource {
  fn name(&self) -> &'static str {
    "polling"
  }

  fn start(self: Box<Self>, router: Weak<BufferRouter>) -> Disposable {
    let period = self.interval;
    spawn_source(self.name(), async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      // The first tick completes immediately.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let Some(router) = router.upgrade() else {
          break;
        };
        if router.refresh_current_buffer().await.is_err() {
          break;
        }
      }
    })
  }
}

/// Refresh whenever the host reports a focus change.
#[derive(Debug)]
pub struct HostEventSource {
  events: broadcast::Receiver<HostFocusEvent>,
}

impl HostEventSource {
  pub fn new(events: broadcast::Receiver<HostFocusEvent>) -> Self {
    Self { events }
  }
}

impl ChangeSource for HostEventSource {
  fn name(&self) -> &'static str {
    "host-events"
  }

  fn start(self: Box<Self>, router: Weak<BufferRouter>) -> Disposable {
    let name = self.name();
    let mut events = self.events;
    spawn_source(name, async move {
      loop {
        match events.recv().await {
          Ok(event) => debug!(nvim_buffer_id = ?event.nvim_buffer_id, "host focus event"),
          // Missed events collapse into a single refresh.
          Err(RecvError::Lagged(skipped)) => debug!(skipped, "focus events lagged"),
          Err(RecvError::Closed) => break,
        }
        let Some(router) = router.upgrade() else {
          break;
        };
        if router.refresh_current_buffer().await.is_err() {
          break;
        }
      }
    })
  }
}

/// Host events when the host provides them, polling otherwise.
pub fn change_source_for(
  host_events: Option<broadcast::Receiver<HostFocusEvent>>,
  poll_interval: Duration,
) -> Box<dyn ChangeSource> {
  match host_events {
    Some(events) => Box::new(HostEventSource::new(events)),
    None => Box::new(PollingSource::new(poll_interval)),
  }
}

fn spawn_source<F>(name: &'static str, task: F) -> Disposable
where
  F: Future<Output = ()> + Send + 'static,
{
  if Handle::try_current().is_err() {
    warn!(source = name, "no tokio runtime; current buffer tracking disabled");
    return Disposable::empty();
  }
  let handle = tokio::spawn(task);
  Disposable::new(move || handle.abort())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn host_events_are_preferred_over_polling() {
    let (_tx, rx) = broadcast::channel(4);
    let source = change_source_for(Some(rx), DEFAULT_POLL_INTERVAL);
    assert_eq!(source.name(), "host-events");

    let source = change_source_for(None, DEFAULT_POLL_INTERVAL);
    assert_eq!(source.name(), "polling");
  }
}
