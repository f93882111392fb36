//! Correlation-tracked messaging between the host and the peer runtime.
//!
//! Outbound requests park a oneshot sender in the pending table until the
//! matching response arrives or the request times out. Inbound envelopes are
//! queued and dispatched one at a time, in arrival order, to the handlers
//! registered for their action.

use std::{
  collections::{
    HashMap,
    VecDeque,
  },
  future::Future,
  panic::{
    AssertUnwindSafe,
    catch_unwind,
  },
  sync::{
    Arc,
    atomic::{
      AtomicBool,
      AtomicU64,
      Ordering,
    },
  },
  time::Duration,
};

use futures_util::{
  FutureExt,
  future::BoxFuture,
};
use parking_lot::Mutex;
use serde_json::Value;
use the_event::Disposable;
use tokio::{
  runtime::Handle,
  sync::oneshot,
};
use tracing::{
  debug,
  error,
  warn,
};

use crate::{
  BridgeError,
  Envelope,
  Transport,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;
pub type Handler = Arc<dyn Fn(Envelope) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
  pub request_timeout: Duration,
  /// Prefix for ids of envelopes created by this side.
  pub id_prefix:       String,
}

impl Default for BridgeConfig {
  fn default() -> Self {
    Self {
      request_timeout: DEFAULT_REQUEST_TIMEOUT,
      id_prefix:       "host".to_string(),
    }
  }
}

#[derive(Default)]
struct InboundQueue {
  messages: VecDeque<Envelope>,
  draining: bool,
}

struct Inner {
  config:          BridgeConfig,
  transport:       Arc<dyn Transport>,
  handlers:        Mutex<HashMap<String, Vec<(HandlerId, Handler)>>>,
  pending:         Mutex<HashMap<String, oneshot::Sender<Envelope>>>,
  queue:           Mutex<InboundQueue>,
  next_handler_id: AtomicU64,
  next_message_id: AtomicU64,
  disposed:        AtomicBool,
}

impl Inner {
  fn remove_handler(&self, action: &str, id: HandlerId) -> bool {
    let mut handlers = self.handlers.lock();
    let Some(registered) = handlers.get_mut(action) else {
      return false;
    };
    let before = registered.len();
    registered.retain(|(handler_id, _)| *handler_id != id);
    let removed = registered.len() != before;
    if registered.is_empty() {
      handlers.remove(action);
    }
    removed
  }
}

/// Keeps the inbound queue moving when a drain loop is dropped half way,
/// e.g. because the caller's `receive_message` future was cancelled. Queued
/// messages are handed to a fresh drain task; an empty queue just clears the
/// flag.
struct DrainGuard<'a> {
  bridge: &'a Bridge,
  armed:  bool,
}

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    let mut queue = self.bridge.inner.queue.lock();
    let resume = !queue.messages.is_empty()
      && !self.bridge.is_disposed()
      && Handle::try_current().is_ok();
    if !resume {
      queue.draining = false;
      return;
    }
    drop(queue);
    debug!("inbound drain interrupted; resuming on a new task");
    let bridge = self.bridge.clone();
    tokio::spawn(async move { bridge.drain().await });
  }
}

/// Handle returned by [`Bridge::register_handler`].
#[derive(Debug)]
pub struct HandlerRegistration {
  id:         HandlerId,
  action:     String,
  disposable: Disposable,
}

impl HandlerRegistration {
  pub fn id(&self) -> HandlerId {
    self.id
  }

  pub fn action(&self) -> &str {
    &self.action
  }

  /// Remove exactly this handler instance.
  pub fn dispose(&mut self) {
    self.disposable.dispose();
  }

  pub fn into_disposable(self) -> Disposable {
    self.disposable
  }
}

#[derive(Clone)]
pub struct Bridge {
  inner: Arc<Inner>,
}

impl Bridge {
  pub fn new(transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
    let bridge = Self {
      inner: Arc::new(Inner {
        config,
        transport,
        handlers: Mutex::new(HashMap::new()),
        pending: Mutex::new(HashMap::new()),
        queue: Mutex::new(InboundQueue::default()),
        next_handler_id: AtomicU64::new(1),
        next_message_id: AtomicU64::new(1),
        disposed: AtomicBool::new(false),
      }),
    };
    bridge.install_ping();
    bridge
  }

  pub fn config(&self) -> &BridgeConfig {
    &self.inner.config
  }

  fn install_ping(&self) {
    let weak = Arc::downgrade(&self.inner);
    // Lives as long as the bridge; dispose() clears it with everything else.
    let _ = self.register_handler("ping", move |envelope| {
      let weak = weak.clone();
      async move {
        if !envelope.is_request() {
          return Ok(());
        }
        let Some(inner) = weak.upgrade() else {
          return Ok(());
        };
        let bridge = Bridge { inner };
        bridge
          .respond(&envelope, "pong", envelope.payload.clone())
          .await?;
        Ok(())
      }
    });
  }

  pub fn register_handler<F, Fut>(&self, action: impl Into<String>, handler: F) -> HandlerRegistration
  where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    let action = action.into();
    let id = HandlerId(self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed));
    let handler: Handler = Arc::new(move |envelope| handler(envelope).boxed());
    self
      .inner
      .handlers
      .lock()
      .entry(action.clone())
      .or_default()
      .push((id, handler));

    let weak = Arc::downgrade(&self.inner);
    let key = action.clone();
    let disposable = Disposable::new(move || {
      if let Some(inner) = weak.upgrade() {
        inner.remove_handler(&key, id);
      }
    });

    HandlerRegistration {
      id,
      action,
      disposable,
    }
  }

  /// Remove one handler. Unknown actions or ids are ignored.
  pub fn unregister_handler(&self, action: &str, id: HandlerId) -> bool {
    self.inner.remove_handler(action, id)
  }

  pub fn handler_count(&self, action: &str) -> usize {
    self
      .inner
      .handlers
      .lock()
      .get(action)
      .map(Vec::len)
      .unwrap_or(0)
  }

  pub fn pending_requests(&self) -> usize {
    self.inner.pending.lock().len()
  }

  pub fn is_disposed(&self) -> bool {
    self.inner.disposed.load(Ordering::SeqCst)
  }

  pub fn next_message_id(&self) -> String {
    let n = self.inner.next_message_id.fetch_add(1, Ordering::Relaxed);
    format!("{}-{n}", self.inner.config.id_prefix)
  }

  /// Send an envelope to the peer.
  ///
  /// Requests resolve with the matching response; notifications and
  /// responses resolve with `None` once the transport accepted them.
  pub async fn send_message(&self, envelope: Envelope) -> Result<Option<Envelope>, BridgeError> {
    if envelope.is_request() {
      self.send_request(envelope).await.map(Some)
    } else {
      self.transmit(&envelope).await.map(|()| None)
    }
  }

  pub async fn request(
    &self,
    action: impl Into<String>,
    payload: Option<Value>,
  ) -> Result<Envelope, BridgeError> {
    let envelope = Envelope::request(self.next_message_id(), action, payload);
    self.send_request(envelope).await
  }

  pub async fn notify(
    &self,
    action: impl Into<String>,
    payload: Option<Value>,
  ) -> Result<(), BridgeError> {
    let envelope = Envelope::notification(self.next_message_id(), action, payload);
    self.transmit(&envelope).await
  }

  pub async fn respond(
    &self,
    request: &Envelope,
    action: impl Into<String>,
    payload: Option<Value>,
  ) -> Result<(), BridgeError> {
    self
      .transmit(&Envelope::response_to(request, action, payload))
      .await
  }

  async fn transmit(&self, envelope: &Envelope) -> Result<(), BridgeError> {
    self.ensure_live()?;
    let serialized = envelope.encode()?;
    self.inner.transport.transmit(serialized).await?;
    Ok(())
  }

  async fn send_request(&self, envelope: Envelope) -> Result<Envelope, BridgeError> {
    self.ensure_live()?;
    let serialized = envelope.encode()?;

    let (tx, rx) = oneshot::channel();
    if self
      .inner
      .pending
      .lock()
      .insert(envelope.id.clone(), tx)
      .is_some()
    {
      warn!(id = %envelope.id, "replaced an outstanding request with the same id");
    }
    // dispose() may have drained the table between the check and the insert.
    if self.is_disposed() {
      self.inner.pending.lock().remove(&envelope.id);
      return Err(BridgeError::Disposed);
    }

    if let Err(err) = self.inner.transport.transmit(serialized).await {
      self.inner.pending.lock().remove(&envelope.id);
      return Err(err.into());
    }

    let timeout = self.inner.config.request_timeout;
    match tokio::time::timeout(timeout, rx).await {
      Ok(Ok(response)) => Ok(response),
      Ok(Err(_)) => Err(BridgeError::Disposed),
      Err(_) => {
        self.inner.pending.lock().remove(&envelope.id);
        warn!(id = %envelope.id, action = %envelope.action, ?timeout, "bridge request timed out");
        Err(BridgeError::Timeout {
          action: envelope.action,
          id: envelope.id,
          timeout,
        })
      },
    }
  }

  fn ensure_live(&self) -> Result<(), BridgeError> {
    if self.is_disposed() {
      Err(BridgeError::Disposed)
    } else {
      Ok(())
    }
  }

  /// Entry point for data pushed by the peer. Never fails: malformed input
  /// is logged and dropped.
  pub async fn receive_message(&self, serialized: &str) {
    if self.is_disposed() {
      debug!("dropping inbound bridge message after dispose");
      return;
    }

    let envelope = match Envelope::decode(serialized) {
      Ok(envelope) => envelope,
      Err(err) => {
        let err = BridgeError::from(err);
        warn!(%err, "dropping bridge message");
        return;
      },
    };

    // Responses only complete a parked future; settle them on receipt so a
    // handler awaiting its own request cannot wait behind itself.
    if envelope.is_response() && self.resolve_pending(&envelope) {
      return;
    }

    self.enqueue(envelope).await;
  }

  fn resolve_pending(&self, response: &Envelope) -> bool {
    let Some(tx) = self.inner.pending.lock().remove(response.correlation_key()) else {
      return false;
    };
    if tx.send(response.clone()).is_err() {
      debug!(id = %response.correlation_key(), "requester went away before its response");
    }
    true
  }

  async fn enqueue(&self, envelope: Envelope) {
    {
      let mut queue = self.inner.queue.lock();
      queue.messages.push_back(envelope);
      if queue.draining {
        return;
      }
      queue.draining = true;
    }
    self.drain().await;
  }

  async fn drain(&self) {
    let mut guard = DrainGuard {
      bridge: self,
      armed:  true,
    };
    loop {
      let next = {
        let mut queue = self.inner.queue.lock();
        match queue.messages.pop_front() {
          Some(envelope) => envelope,
          None => {
            queue.draining = false;
            guard.armed = false;
            return;
          },
        }
      };
      self.dispatch(next).await;
    }
  }

  async fn dispatch(&self, envelope: Envelope) {
    let handlers = self
      .inner
      .handlers
      .lock()
      .get(&envelope.action)
      .cloned()
      .unwrap_or_default();
    if handlers.is_empty() {
      debug!(action = %envelope.action, id = %envelope.id, "no handler for bridge message");
      return;
    }

    for (id, handler) in handlers {
      let outcome = match catch_unwind(AssertUnwindSafe(|| handler(envelope.clone()))) {
        Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
        Err(panic) => Err(panic),
      };
      match outcome {
        Ok(Ok(())) => {},
        Ok(Err(err)) => {
          let err = BridgeError::Handler {
            action:  envelope.action.clone(),
            message: format!("{err:#}"),
          };
          warn!(handler = ?id, %err, "bridge handler failed");
        },
        Err(_) => {
          error!(handler = ?id, action = %envelope.action, "bridge handler panicked");
        },
      }
    }
  }

  /// Tear the bridge down. Pending requests fail with `Disposed`, later
  /// sends fail fast. Idempotent.
  pub fn dispose(&self) {
    if self.inner.disposed.swap(true, Ordering::SeqCst) {
      return;
    }
    self.inner.handlers.lock().clear();
    self.inner.queue.lock().messages.clear();
    let pending: Vec<_> = self.inner.pending.lock().drain().collect();
    debug!(pending = pending.len(), "bridge disposed");
    // Dropping the senders wakes every waiter with a cancellation.
    drop(pending);
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::ChannelTransport;

  fn bridge() -> (Bridge, tokio::sync::mpsc::UnboundedReceiver<String>) {
    let (transport, rx) = ChannelTransport::new();
    (Bridge::new(Arc::new(transport), BridgeConfig::default()), rx)
  }

  #[test]
  fn message_ids_use_prefix_and_increase() {
    let (bridge, _rx) = bridge();
    assert_eq!(bridge.next_message_id(), "host-1");
    assert_eq!(bridge.next_message_id(), "host-2");
  }

  #[test]
  fn unregister_unknown_action_is_a_no_op() {
    let (bridge, _rx) = bridge();
    let registration = bridge.register_handler("x", |_| async { Ok(()) });
    assert!(!bridge.unregister_handler("nonexistent-action", registration.id()));
    assert!(bridge.unregister_handler("x", registration.id()));
    assert!(!bridge.unregister_handler("x", registration.id()));
  }

  #[test]
  fn registration_dispose_removes_only_its_handler() {
    let (bridge, _rx) = bridge();
    let mut first = bridge.register_handler("x", |_| async { Ok(()) });
    let _second = bridge.register_handler("x", |_| async { Ok(()) });
    assert_eq!(bridge.handler_count("x"), 2);
    first.dispose();
    first.dispose();
    assert_eq!(bridge.handler_count("x"), 1);
  }

  #[tokio::test]
  async fn notification_resolves_once_transmitted() {
    let (bridge, mut rx) = bridge();
    let sent = bridge
      .send_message(Envelope::notification("n-1", "render", Some(json!([1]))))
      .await
      .unwrap();
    assert!(sent.is_none());
    let wire = Envelope::decode(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(wire.action, "render");
    assert_eq!(bridge.pending_requests(), 0);
  }

  #[tokio::test]
  async fn ping_request_is_answered_with_pong() {
    let (bridge, mut rx) = bridge();
    let ping = Envelope::request("peer-1", "ping", Some(json!("hi")));
    bridge.receive_message(&ping.encode().unwrap()).await;

    let pong = Envelope::decode(&rx.recv().await.unwrap()).unwrap();
    assert!(pong.is_response());
    assert_eq!(pong.action, "pong");
    assert_eq!(pong.correlation_id.as_deref(), Some("peer-1"));
    assert_eq!(pong.payload, Some(json!("hi")));
  }

  #[tokio::test]
  async fn dispose_fails_sends_fast_and_is_idempotent() {
    let (bridge, _rx) = bridge();
    bridge.dispose();
    bridge.dispose();
    let err = bridge.request("ping", None).await.unwrap_err();
    assert!(err.is_disposed());
    assert_eq!(bridge.handler_count("ping"), 0);
  }
}
