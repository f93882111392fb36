use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Info,
  Warn,
  Error,
}

impl Level {
  /// Name of the matching `vim.log.levels` entry.
  pub fn vim_level(self) -> &'static str {
    match self {
      Self::Info => "INFO",
      Self::Warn => "WARN",
      Self::Error => "ERROR",
    }
  }
}

/// User-visible messages in the editor.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, level: Level, message: &str);
}
