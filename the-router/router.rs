use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{
      AtomicBool,
      Ordering,
    },
  },
};

use parking_lot::Mutex;
use serde_json::Value;
use the_bridge::{
  CallbackRegistry,
  CallbackToken,
  PeerCall,
  PeerCallError,
  PeerRpc,
};
use the_event::{
  Disposable,
  DisposableStore,
  Emitter,
  Event as _,
};
use thiserror::Error;
use tracing::{
  debug,
  info,
  warn,
};

use crate::{
  BufferManagerApi,
  BufferQuery,
  BufferRoute,
  ChangeSource,
  LinePatch,
  RouterEvent,
  RouterEventKind,
  changed_lines,
  has_buffer_changed,
};

#[derive(Debug, Error)]
pub enum RouterError {
  #[error("buffer router has been disposed")]
  Disposed,
}

/// Reply of `create_buffer`: either the full route or just its id.
enum Created {
  Route(BufferRoute),
  Id(String),
}

/// Host-side controller for peer-managed buffers.
///
/// Every operation is a peer call followed by a cache update and an event.
/// Peer failures are logged and reported as `None`/`false`; only use after
/// [`BufferRouter::dispose`] is an error.
pub struct BufferRouter {
  peer:             Arc<dyn PeerRpc>,
  callbacks:        Arc<CallbackRegistry>,
  api:              BufferManagerApi,
  events:           Emitter<RouterEvent>,
  routes:           Mutex<HashMap<String, BufferRoute>>,
  buffer_callbacks: Mutex<HashMap<String, Vec<CallbackToken>>>,
  current:          Mutex<Option<BufferRoute>>,
  subscriptions:    DisposableStore,
  disposed:         AtomicBool,
}

impl BufferRouter {
  pub fn new(
    peer: Arc<dyn PeerRpc>,
    callbacks: Arc<CallbackRegistry>,
    api: BufferManagerApi,
  ) -> Self {
    Self {
      peer,
      callbacks,
      api,
      events:           Emitter::new(),
      routes:           Mutex::new(HashMap::new()),
      buffer_callbacks: Mutex::new(HashMap::new()),
      current:          Mutex::new(None),
      subscriptions:    DisposableStore::new(),
      disposed:         AtomicBool::new(false),
    }
  }

  pub fn api(&self) -> &BufferManagerApi {
    &self.api
  }

  pub fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::Acquire)
  }

  fn ensure_live(&self) -> Result<(), RouterError> {
    if self.is_disposed() {
      Err(RouterError::Disposed)
    } else {
      Ok(())
    }
  }

  pub fn on<F>(&self, kind: RouterEventKind, listener: F) -> Disposable
  where
    F: Fn(&RouterEvent) + Send + Sync + 'static,
  {
    self.events.on(kind, listener)
  }

  fn emit(&self, event: RouterEvent) {
    let delivered = self.events.emit(&event);
    debug!(kind = %event.kind(), delivered, "router event");
  }

  async fn call(&self, call: PeerCall) -> Result<Value, PeerCallError> {
    let function = call.function.clone();
    self.peer.call(call).await.inspect_err(|err| {
      warn!(module = self.api.module(), %function, %err, "buffer manager call failed");
    })
  }

  async fn call_flag(&self, call: PeerCall) -> Option<bool> {
    match self.call(call).await.ok()? {
      Value::Bool(flag) => Some(flag),
      Value::Null => Some(false),
      other => {
        warn!(reply = %other, "expected a boolean from the buffer manager");
        None
      },
    }
  }

  async fn call_route(&self, call: PeerCall) -> Option<Option<BufferRoute>> {
    let reply = self.call(call).await.ok()?;
    match BufferRoute::from_peer(reply) {
      Ok(route) => Some(route),
      Err(err) => {
        warn!(%err, "buffer manager returned a malformed buffer route");
        None
      },
    }
  }

  /// Create a buffer at `path`. Returns the peer-assigned id.
  pub async fn create_buffer(
    &self,
    path: &str,
    query: BufferQuery,
  ) -> Result<Option<String>, RouterError> {
    self.ensure_live()?;

    let static_props = query.static_props.clone();
    let (query_value, tokens) = query.into_peer_value(&self.callbacks);
    let created = match self.call(self.api.create_buffer(path, query_value)).await {
      Ok(reply) => decode_created(reply),
      Err(_) => None,
    };

    let route = match created {
      Some(Created::Route(route)) => Some(route),
      Some(Created::Id(id)) => {
        let fetched = self
          .call_route(self.api.get_buffer_info(&id))
          .await
          .flatten();
        Some(fetched.unwrap_or_else(|| BufferRoute::new(id, path, static_props)))
      },
      None => None,
    };

    let Some(route) = route else {
      warn!(path, "buffer creation failed");
      self.release(&tokens);
      return Ok(None);
    };

    if self.is_disposed() {
      self.release(&tokens);
      return Err(RouterError::Disposed);
    }

    let id = route.id.clone();
    info!(id = %id, path, "buffer created");
    self.routes.lock().insert(id.clone(), route.clone());
    if !tokens.is_empty() {
      self
        .buffer_callbacks
        .lock()
        .entry(id.clone())
        .or_default()
        .extend(tokens);
    }
    self.emit(RouterEvent::BufferCreated(route));
    self.refresh_after_mutation().await;
    Ok(Some(id))
  }

  pub async fn delete_buffer(&self, id: &str) -> Result<bool, RouterError> {
    self.ensure_live()?;

    // Best effort: the peer may already have lost track of the buffer.
    let buffer_info = match self.call_route(self.api.get_buffer_info(id)).await.flatten() {
      Some(route) => Some(route),
      None => self.routes.lock().get(id).cloned(),
    };

    match self.call_flag(self.api.delete_buffer(id)).await {
      Some(true) => {},
      Some(false) => {
        warn!(id, "buffer manager refused to delete buffer");
        return Ok(false);
      },
      None => return Ok(false),
    }

    self.routes.lock().remove(id);
    let tokens = self.buffer_callbacks.lock().remove(id).unwrap_or_default();
    self.release(&tokens);

    info!(id, "buffer deleted");
    self.emit(RouterEvent::BufferDeleted {
      id: id.to_string(),
      buffer_info,
    });
    self.refresh_after_mutation().await;
    Ok(true)
  }

  /// Focus a buffer by id or path.
  pub async fn switch_buffer(&self, identifier: &str) -> Result<bool, RouterError> {
    self.ensure_live()?;

    match self.call_flag(self.api.switch_buffer(identifier)).await {
      Some(true) => {},
      Some(false) => {
        warn!(identifier, "buffer manager refused to switch buffer");
        return Ok(false);
      },
      None => return Ok(false),
    }

    self.emit(RouterEvent::BufferSwitched {
      identifier: identifier.to_string(),
    });
    self.refresh_after_mutation().await;
    Ok(true)
  }

  pub async fn get_current_buffer(&self) -> Result<Option<BufferRoute>, RouterError> {
    self.ensure_live()?;
    Ok(self.call_route(self.api.get_current_buffer()).await.flatten())
  }

  /// Last known current buffer, without a round trip.
  pub fn get_current_buffer_sync(&self) -> Option<BufferRoute> {
    self.current.lock().clone()
  }

  pub async fn get_buffer_info(&self, id: &str) -> Result<Option<BufferRoute>, RouterError> {
    self.ensure_live()?;
    let Some(route) = self.call_route(self.api.get_buffer_info(id)).await else {
      return Ok(None);
    };
    match route {
      Some(route) => {
        if let Some(cached) = self.routes.lock().get_mut(id) {
          *cached = route.clone();
        }
        Ok(Some(route))
      },
      None => {
        warn!(id, "buffer not found");
        Ok(None)
      },
    }
  }

  pub async fn update_buffer_content(
    &self,
    id: &str,
    patches: &[LinePatch],
  ) -> Result<bool, RouterError> {
    self.ensure_live()?;

    match self
      .call_flag(self.api.update_buffer_content(id, patches))
      .await
    {
      Some(true) => {},
      Some(false) => {
        warn!(id, "buffer manager refused content update");
        return Ok(false);
      },
      None => return Ok(false),
    }

    self.emit(RouterEvent::BufferUpdated {
      id:            id.to_string(),
      changed_lines: changed_lines(patches),
    });
    Ok(true)
  }

  /// Re-read the current buffer from the peer and emit
  /// `CURRENT_BUFFER_CHANGED` if it moved. Returns whether it did.
  pub async fn refresh_current_buffer(&self) -> Result<bool, RouterError> {
    self.ensure_live()?;

    let Some(fresh) = self.call_route(self.api.get_current_buffer()).await else {
      return Ok(false);
    };

    let old = {
      let mut current = self.current.lock();
      if !has_buffer_changed(current.as_ref(), fresh.as_ref()) {
        *current = fresh;
        return Ok(false);
      }
      std::mem::replace(&mut *current, fresh.clone())
    };

    debug!(
      old = ?old.as_ref().map(|route| &route.id),
      new = ?fresh.as_ref().map(|route| &route.id),
      "current buffer changed"
    );
    self.emit(RouterEvent::CurrentBufferChanged {
      old_buffer: old,
      new_buffer: fresh,
    });
    Ok(true)
  }

  async fn refresh_after_mutation(&self) {
    // Disposal racing the mutation is the only possible error here.
    let _ = self.refresh_current_buffer().await;
  }

  /// Routes created through this router and not yet deleted.
  pub fn routes(&self) -> Vec<BufferRoute> {
    let mut routes: Vec<_> = self.routes.lock().values().cloned().collect();
    routes.sort_by_key(|route| (route.created_at, route.id.clone()));
    routes
  }

  pub fn cached_route(&self, id: &str) -> Option<BufferRoute> {
    self.routes.lock().get(id).cloned()
  }

  /// Start feeding `source` into [`BufferRouter::refresh_current_buffer`]
  /// until the router is disposed.
  pub fn track(self: &Arc<Self>, source: Box<dyn ChangeSource>) -> Result<(), RouterError> {
    self.ensure_live()?;
    let name = source.name();
    let subscription = source.start(Arc::downgrade(self));
    debug!(source = name, "tracking current buffer");
    self.subscriptions.add(subscription);
    Ok(())
  }

  fn release(&self, tokens: &[CallbackToken]) {
    for token in tokens {
      self.callbacks.unregister(token);
    }
  }

  pub fn dispose(&self) {
    if self.disposed.swap(true, Ordering::AcqRel) {
      return;
    }
    self.subscriptions.dispose();
    self.events.clear();
    let tokens: Vec<CallbackToken> = self
      .buffer_callbacks
      .lock()
      .drain()
      .flat_map(|(_, tokens)| tokens)
      .collect();
    self.release(&tokens);
    self.routes.lock().clear();
    self.current.lock().take();
    info!("buffer router disposed");
  }
}

fn decode_created(reply: Value) -> Option<Created> {
  match reply {
    Value::String(id) => Some(Created::Id(id)),
    Value::Number(id) => Some(Created::Id(id.to_string())),
    Value::Null | Value::Bool(false) => None,
    reply => {
      match BufferRoute::from_peer(reply) {
        Ok(route) => route.map(Created::Route),
        Err(err) => {
          warn!(%err, "buffer manager returned a malformed buffer route");
          None
        },
      }
    },
  }
}

impl Drop for BufferRouter {
  fn drop(&mut self) {
    self.dispose();
  }
}
