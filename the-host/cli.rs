use std::path::PathBuf;

use clap::{
  ArgAction,
  Parser,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "nvim-ui-host", about, long_about = None, version)]
pub struct Cli {
  /// Neovim RPC socket to attach to
  #[arg(long = "socket", env = "NVIM", value_name = "PATH")]
  pub socket: PathBuf,

  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count)]
  pub verbosity: u8,

  /// Save logs to a specific file
  #[arg(long = "log-file", value_name = "FILE")]
  pub log_file: Option<PathBuf>,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE")]
  pub config_file: Option<PathBuf>,
}
