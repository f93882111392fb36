use std::{
  sync::Arc,
  time::Duration,
};

use the_bridge::{
  Bridge,
  CallbackRegistry,
  PeerRpc,
  Transport,
};
use the_event::DisposableStore;
use the_render::DiffRenderer;
use the_router::{
  BufferManagerApi,
  BufferRouter,
  HostFocusEvent,
  RouterError,
  RouterEvent,
  RouterEventKind,
  change_source_for,
};
use tokio::sync::broadcast;
use tracing::info;

use crate::{
  config::HostConfig,
  notify::Notifier,
};

/// Everything the command surface and the rpc handler operate on.
pub struct HostContext {
  pub bridge:    Bridge,
  pub callbacks: Arc<CallbackRegistry>,
  pub router:    Arc<BufferRouter>,
  pub renderer:  Arc<DiffRenderer>,
  pub notifier:  Arc<dyn Notifier>,
  poll_interval: Duration,
  subscriptions: DisposableStore,
}

impl HostContext {
  pub fn new(
    peer: Arc<dyn PeerRpc>,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    config: &HostConfig,
  ) -> Self {
    let bridge = Bridge::new(transport, config.bridge_config());
    let callbacks = Arc::new(CallbackRegistry::new());
    let router = Arc::new(BufferRouter::new(
      peer,
      callbacks.clone(),
      BufferManagerApi::new(config.router.buffer_module.clone()),
    ));
    let renderer = Arc::new(DiffRenderer::new(router.clone()));

    let subscriptions = DisposableStore::new();
    subscriptions.add(callbacks.attach(&bridge).into_disposable());

    // A deleted buffer's render cache is stale the moment it goes away.
    let weak_renderer = Arc::downgrade(&renderer);
    subscriptions.add(router.on(RouterEventKind::BufferDeleted, move |event| {
      if let (Some(renderer), RouterEvent::BufferDeleted { id, .. }) =
        (weak_renderer.upgrade(), event)
      {
        renderer.forget(id);
      }
    }));

    Self {
      bridge,
      callbacks,
      router,
      renderer,
      notifier,
      poll_interval: config.poll_interval(),
      subscriptions,
    }
  }

  /// Follow the focused buffer: host focus events when `host_events` is
  /// given, polling otherwise.
  pub fn track_current_buffer(
    &self,
    host_events: Option<broadcast::Receiver<HostFocusEvent>>,
  ) -> Result<(), RouterError> {
    let source = change_source_for(host_events, self.poll_interval);
    info!(source = source.name(), "tracking current buffer");
    self.router.track(source)
  }

  pub fn dispose(&self) {
    self.subscriptions.dispose();
    self.router.dispose();
    self.bridge.dispose();
    self.renderer.clear();
    self.callbacks.clear();
  }
}
