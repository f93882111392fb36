//! The Neovim side of the host: msgpack-rpc peer, bridge transport and the
//! handler for requests and notifications Neovim sends us.

use std::sync::{
  Arc,
  OnceLock,
};

use async_trait::async_trait;
use nvim_rs::{
  Handler,
  Neovim,
  compat::tokio::Compat,
};
use rmpv::Value as MsgValue;
use serde_json::Value;
use the_bridge::{
  PeerCall,
  PeerCallError,
  PeerRpc,
  Transport,
  serialize_for_peer,
};
use the_router::HostFocusEvent;
use tokio::{
  io::WriteHalf,
  net::UnixStream,
  sync::broadcast,
};
use tracing::{
  debug,
  warn,
};

use crate::{
  commands,
  context::HostContext,
  notify::{
    Level,
    Notifier,
  },
};

pub type Writer = Compat<WriteHalf<UnixStream>>;

pub const BRIDGE_MESSAGE_NOTIFICATION: &str = "bridge_message";
pub const BUFFER_FOCUS_NOTIFICATION: &str = "buffer_focus";

pub fn to_json(value: MsgValue) -> Result<Value, PeerCallError> {
  rmpv::ext::from_value(value).map_err(|err| PeerCallError::Reply(err.to_string()))
}

pub fn to_msgpack(value: &Value) -> MsgValue {
  rmpv::ext::to_value(value).unwrap_or_else(|err| {
    warn!(%err, "reply has no msgpack form");
    MsgValue::Nil
  })
}

/// Evaluates [`PeerCall`]s with `nvim_exec_lua`.
#[derive(Clone)]
pub struct NvimPeer {
  nvim: Neovim<Writer>,
}

impl NvimPeer {
  pub fn new(nvim: Neovim<Writer>) -> Self {
    Self { nvim }
  }

  pub async fn exec(&self, code: &str, args: Vec<MsgValue>) -> Result<MsgValue, PeerCallError> {
    self
      .nvim
      .exec_lua(code, args)
      .await
      .map_err(|err| PeerCallError::Remote(err.to_string()))
  }

  pub async fn channel_id(&self) -> Result<i64, PeerCallError> {
    let api_info = self
      .nvim
      .get_api_info()
      .await
      .map_err(|err| PeerCallError::Remote(err.to_string()))?;
    api_info
      .first()
      .and_then(MsgValue::as_i64)
      .ok_or_else(|| PeerCallError::Reply("api info carries no channel id".into()))
  }

  /// Install the `BufEnter` autocmd reporting focus changes to `channel`.
  pub async fn install_focus_autocmd(&self, channel: i64) -> Result<(), PeerCallError> {
    let code = format!(
      r#"
local channel = ...
local group = vim.api.nvim_create_augroup("NvimUiHostFocus", {{ clear = true }})
vim.api.nvim_create_autocmd("BufEnter", {{
  group = group,
  callback = function(ev)
    pcall(vim.rpcnotify, channel, {event}, ev.buf)
  end,
}})
"#,
      event = serialize_for_peer(&Value::from(BUFFER_FOCUS_NOTIFICATION)),
    );
    self.exec(&code, vec![MsgValue::from(channel)]).await.map(drop)
  }
}

#[async_trait]
impl PeerRpc for NvimPeer {
  async fn call(&self, call: PeerCall) -> Result<Value, PeerCallError> {
    let code = call.to_lua();
    debug!(module = %call.module, function = %call.function, "peer call");
    to_json(self.exec(&code, Vec::new()).await?)
  }
}

#[async_trait]
impl Notifier for NvimPeer {
  async fn notify(&self, level: Level, message: &str) {
    let code = format!(
      "vim.notify({}, vim.log.levels.{})",
      serialize_for_peer(&Value::from(message)),
      level.vim_level()
    );
    if let Err(err) = self.exec(&code, Vec::new()).await {
      warn!(%err, "failed to show notification");
    }
  }
}

/// Pushes outbound envelopes into `require(<module>).receive(json)`.
pub struct NvimTransport {
  peer:   NvimPeer,
  module: String,
}

impl NvimTransport {
  pub fn new(peer: NvimPeer, module: impl Into<String>) -> Self {
    Self {
      peer,
      module: module.into(),
    }
  }
}

#[async_trait]
impl Transport for NvimTransport {
  async fn transmit(&self, message: String) -> Result<(), PeerCallError> {
    let call = PeerCall::new(self.module.clone(), "receive").arg(message);
    self.peer.exec(&call.to_lua(), Vec::new()).await.map(drop)
  }
}

/// Serves rpc requests (commands) and notifications from Neovim.
///
/// The context is filled in once activation has built it; until then
/// commands answer with a failure.
#[derive(Clone)]
pub struct HostHandler {
  context: Arc<OnceLock<Arc<HostContext>>>,
  focus:   broadcast::Sender<HostFocusEvent>,
}

impl HostHandler {
  pub fn new(focus: broadcast::Sender<HostFocusEvent>) -> Self {
    Self {
      context: Arc::new(OnceLock::new()),
      focus,
    }
  }

  pub fn install(&self, context: Arc<HostContext>) -> bool {
    self.context.set(context).is_ok()
  }

  fn context(&self) -> Option<&Arc<HostContext>> {
    self.context.get()
  }
}

#[async_trait]
impl Handler for HostHandler {
  type Writer = Writer;

  async fn handle_request(
    &self,
    name: String,
    args: Vec<MsgValue>,
    _neovim: Neovim<Self::Writer>,
  ) -> Result<MsgValue, MsgValue> {
    let Some(context) = self.context() else {
      return Ok(to_msgpack(&commands::failure("host is still starting")));
    };
    let args = match args.into_iter().map(to_json).collect::<Result<Vec<_>, _>>() {
      Ok(args) => args,
      Err(err) => return Ok(to_msgpack(&commands::failure(err))),
    };
    Ok(to_msgpack(&commands::dispatch(context, &name, args).await))
  }

  async fn handle_notify(&self, name: String, args: Vec<MsgValue>, _neovim: Neovim<Self::Writer>) {
    match name.as_str() {
      BRIDGE_MESSAGE_NOTIFICATION => {
        let Some(context) = self.context() else {
          warn!("dropping bridge message received before activation");
          return;
        };
        match args.into_iter().next() {
          Some(MsgValue::String(message)) => {
            match message.as_str() {
              Some(message) => context.bridge.receive_message(message).await,
              None => warn!("bridge message is not valid utf-8"),
            }
          },
          other => warn!(?other, "bridge message must be a serialized envelope"),
        }
      },
      BUFFER_FOCUS_NOTIFICATION => {
        let nvim_buffer_id = args.first().and_then(MsgValue::as_i64);
        // No receiver just means tracking is not running (yet).
        let _ = self.focus.send(HostFocusEvent { nvim_buffer_id });
      },
      other => debug!(notification = other, "ignoring unknown notification"),
    }
  }
}
