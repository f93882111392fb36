use std::{
  path::Path,
  str::from_utf8,
};

use anyhow::{
  Context,
  Result,
};

/// Built-in host.toml.
pub fn default_host_config() -> Result<toml::Value> {
  let default_config = include_bytes!("../host.toml");
  let config_str =
    from_utf8(default_config).context("built-in host.toml contains invalid UTF-8")?;
  toml::from_str(config_str).context("failed to parse built-in host.toml")
}

/// Defaults, then the user file, then workspace overrides. Missing files are
/// skipped; files that exist but do not parse are errors.
pub fn user_host_config(user_file: &Path) -> Result<toml::Value> {
  let default = default_host_config()?;

  [user_file.to_path_buf(), crate::workspace_config_file()]
    .into_iter()
    .filter_map(|file| {
      std::fs::read_to_string(&file)
        .ok()
        .map(|config| (file, config))
    })
    .map(|(file, config)| {
      tracing::debug!(file = %file.display(), "loading host config");
      toml::from_str::<toml::Value>(&config)
        .with_context(|| format!("failed to parse {}", file.display()))
    })
    .collect::<Result<Vec<_>>>()
    .map(|layers| {
      layers
        .into_iter()
        .fold(default, |a, b| crate::merge_toml_values(a, b, 3))
    })
}
