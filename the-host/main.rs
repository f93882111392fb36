mod cli;
mod commands;
mod config;
mod context;
mod logging;
mod notify;
mod nvim;

use std::sync::Arc;

use anyhow::{
  Context as _,
  Result,
};
use clap::Parser;
use the_bridge::{
  PeerCall,
  PeerRpc,
};
use the_router::HostFocusEvent;
use tokio::sync::broadcast;
use tracing::{
  error,
  info,
  warn,
};

use crate::{
  cli::Cli,
  config::HostConfig,
  context::HostContext,
  nvim::{
    HostHandler,
    NvimPeer,
    NvimTransport,
  },
};

// Single-threaded so spawned rpc notifications run in arrival order.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  the_loader::initialize_config_file(cli.config_file.clone());
  the_loader::initialize_log_file(cli.log_file.clone());
  logging::setup_logging(cli.verbosity).context("failed to initialize logging")?;

  let config = match HostConfig::load(&the_loader::config_file()) {
    Ok(config) => config,
    Err(err) => {
      error!("{err:#}; continuing with built-in defaults");
      HostConfig::default()
    },
  };

  let (focus_tx, _) = broadcast::channel(16);
  let handler = HostHandler::new(focus_tx.clone());
  let (nvim, io_handle) = nvim_rs::create::tokio::new_path(&cli.socket, handler.clone())
    .await
    .with_context(|| format!("failed to connect to neovim at {}", cli.socket.display()))?;
  info!(socket = %cli.socket.display(), "connected to neovim");

  let peer = NvimPeer::new(nvim);
  let transport = Arc::new(NvimTransport::new(peer.clone(), config.bridge.peer_module.clone()));
  let context = Arc::new(HostContext::new(
    Arc::new(peer.clone()),
    transport,
    Arc::new(peer.clone()),
    &config,
  ));
  handler.install(context.clone());

  activate(&peer, &context, &config, &focus_tx).await;
  info!(commands = ?commands::COMMANDS, "host ready");

  match io_handle.await {
    Ok(Ok(())) => info!("neovim closed the connection"),
    Ok(Err(err)) => warn!(%err, "rpc loop ended"),
    Err(err) => error!(%err, "rpc loop task failed"),
  }

  context.dispose();
  Ok(())
}

/// Activation steps after the context exists. A failing step is logged and
/// the remaining steps still run.
async fn activate(
  peer: &NvimPeer,
  context: &HostContext,
  config: &HostConfig,
  focus: &broadcast::Sender<HostFocusEvent>,
) {
  let channel = match peer.channel_id().await {
    Ok(channel) => Some(channel),
    Err(err) => {
      error!(%err, "could not determine rpc channel");
      None
    },
  };

  if let Some(channel) = channel {
    let attach = PeerCall::new(config.bridge.peer_module.clone(), "attach").arg(channel);
    if let Err(err) = peer.call(attach).await {
      warn!(%err, module = %config.bridge.peer_module, "peer bridge module did not accept the channel");
    }
  }

  let host_events = match channel {
    Some(channel) if config.router.host_events => {
      match peer.install_focus_autocmd(channel).await {
        Ok(()) => Some(focus.subscribe()),
        Err(err) => {
          warn!(%err, "focus autocmd unavailable; falling back to polling");
          None
        },
      }
    },
    _ => None,
  };

  if let Err(err) = context.track_current_buffer(host_events) {
    error!(%err, "current buffer tracking not started");
  }
}
