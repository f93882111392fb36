use std::{
  path::Path,
  time::Duration,
};

use anyhow::{
  Context,
  Result,
};
use serde::Deserialize;
use the_bridge::BridgeConfig;
use the_router::{
  DEFAULT_BUFFER_MODULE,
  DEFAULT_POLL_INTERVAL,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct HostConfig {
  pub bridge: BridgeSection,
  pub router: RouterSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct BridgeSection {
  pub request_timeout_ms: u64,
  /// Lua module exposing `receive(json)` for outbound envelopes.
  pub peer_module:        String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RouterSection {
  pub buffer_module:    String,
  pub poll_interval_ms: u64,
  /// Prefer `BufEnter` notifications over polling.
  pub host_events:      bool,
}

impl Default for BridgeSection {
  fn default() -> Self {
    Self {
      request_timeout_ms: 10_000,
      peer_module:        "nvim_ui.bridge".to_string(),
    }
  }
}

impl Default for RouterSection {
  fn default() -> Self {
    Self {
      buffer_module:    DEFAULT_BUFFER_MODULE.to_string(),
      poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
      host_events:      true,
    }
  }
}

impl HostConfig {
  /// Built-in defaults merged with the user file at `path` and the
  /// workspace overrides.
  pub fn load(path: &Path) -> Result<Self> {
    let merged = the_loader::config::user_host_config(path)?;
    merged
      .try_into()
      .with_context(|| format!("invalid configuration in {}", path.display()))
  }

  pub fn bridge_config(&self) -> BridgeConfig {
    BridgeConfig {
      request_timeout: Duration::from_millis(self.bridge.request_timeout_ms),
      ..BridgeConfig::default()
    }
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.router.poll_interval_ms.max(1))
  }
}
