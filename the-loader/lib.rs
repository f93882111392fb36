pub mod config;

use std::{
  path::{
    Path,
    PathBuf,
  },
  sync::OnceLock,
};

use etcetera::base_strategy::{
  BaseStrategy,
  choose_base_strategy,
};

const APP_DIR: &str = "nvim-ui";

static CONFIG_FILE: OnceLock<PathBuf> = OnceLock::new();

static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();

pub fn initialize_config_file(specified_file: Option<PathBuf>) {
  let config_file = specified_file.unwrap_or_else(default_config_file);
  ensure_parent_dir(&config_file);
  CONFIG_FILE.set(config_file).ok();
}

pub fn initialize_log_file(specified_file: Option<PathBuf>) {
  let log_file = specified_file.unwrap_or_else(default_log_file);
  ensure_parent_dir(&log_file);
  LOG_FILE.set(log_file).ok();
}

/// User configuration directory. `NVIM_UI_CONFIG_DIR` wins over the
/// platform default.
pub fn config_dir() -> PathBuf {
  if let Some(dir) = env_dir("NVIM_UI_CONFIG_DIR") {
    return dir;
  }
  match choose_base_strategy() {
    Ok(strategy) => strategy.config_dir().join(APP_DIR),
    Err(err) => fallback_dir(err),
  }
}

pub fn cache_dir() -> PathBuf {
  if let Some(dir) = env_dir("NVIM_UI_CACHE_DIR") {
    return dir;
  }
  match choose_base_strategy() {
    Ok(strategy) => strategy.cache_dir().join(APP_DIR),
    Err(err) => fallback_dir(err),
  }
}

fn env_dir(var: &str) -> Option<PathBuf> {
  std::env::var_os(var)
    .filter(|dir| !dir.is_empty())
    .map(PathBuf::from)
}

fn fallback_dir(err: impl std::fmt::Display) -> PathBuf {
  tracing::warn!(%err, "unable to find base directories; using the working directory");
  PathBuf::from(".").join(APP_DIR)
}

pub fn config_file() -> PathBuf {
  CONFIG_FILE
    .get_or_init(|| {
      let path = default_config_file();
      ensure_parent_dir(&path);
      path
    })
    .clone()
}

pub fn log_file() -> PathBuf {
  LOG_FILE
    .get_or_init(|| {
      let path = default_log_file();
      ensure_parent_dir(&path);
      path
    })
    .clone()
}

/// Project-local overrides, looked up from the workspace root.
pub fn workspace_config_file() -> PathBuf {
  find_workspace().0.join(".nvim-ui").join("host.toml")
}

pub fn default_log_file() -> PathBuf {
  cache_dir().join("host.log")
}

fn default_config_file() -> PathBuf {
  config_dir().join("host.toml")
}

/// Merge two TOML documents, merging values from `right` onto `left`
///
/// `merge_depth` sets the nesting depth up to which values are merged instead
/// of overridden. Tables present on both sides are unioned key by key;
/// anything else takes the value from `right`.
///
/// `merge_toml_values(defaults, user, 3)` with
///
/// defaults:
/// ```toml
/// [router]
/// buffer-module = "nvim_ui.buffer_manager"
/// poll-interval-ms = 1000
/// ```
/// user:
/// ```toml
/// [router]
/// poll-interval-ms = 250
/// ```
///
/// yields a `[router]` table keeping `buffer-module` and taking the user's
/// `poll-interval-ms`.
pub fn merge_toml_values(left: toml::Value, right: toml::Value, merge_depth: usize) -> toml::Value {
  use toml::Value;

  match (left, right) {
    (Value::Table(mut left_map), Value::Table(right_map)) if merge_depth > 0 => {
      for (rname, rvalue) in right_map {
        let merged = match left_map.remove(&rname) {
          Some(lvalue) => merge_toml_values(lvalue, rvalue, merge_depth - 1),
          None => rvalue,
        };
        left_map.insert(rname, merged);
      }
      Value::Table(left_map)
    },
    (_, value) => value,
  }
}

/// Finds the current workspace folder.
///
/// Searches upward from the working directory for a directory containing
/// `.git` or `.nvim-ui`. If none is found returns (CWD, true), otherwise
/// (workspace, false).
pub fn find_workspace() -> (PathBuf, bool) {
  match std::env::current_dir() {
    Ok(current_dir) => find_workspace_in(current_dir),
    Err(_) => (PathBuf::new(), true),
  }
}

pub fn find_workspace_in(dir: impl AsRef<Path>) -> (PathBuf, bool) {
  let dir = dir.as_ref();
  for ancestor in dir.ancestors() {
    if ancestor.join(".git").exists() || ancestor.join(".nvim-ui").exists() {
      return (ancestor.to_owned(), false);
    }
  }

  (dir.to_owned(), true)
}

fn ensure_parent_dir(path: &Path) {
  if let Some(parent) = path.parent()
    && !parent.exists()
  {
    std::fs::create_dir_all(parent).ok();
  }
}
