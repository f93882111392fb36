use anyhow::Result;

/// Route `log` records (and `tracing` events, through its `log` feature)
/// into the log file.
pub fn setup_logging(verbosity: u8) -> Result<()> {
  let mut base_config = fern::Dispatch::new();

  base_config = match verbosity {
    0 => base_config.level(log::LevelFilter::Warn),
    1 => base_config.level(log::LevelFilter::Info),
    2 => base_config.level(log::LevelFilter::Debug),
    _3_or_more => base_config.level(log::LevelFilter::Trace),
  };

  // nvim-rs logs every rpc frame at debug.
  if verbosity < 3 {
    base_config = base_config.level_for("nvim_rs", log::LevelFilter::Warn);
  }

  let file_config = fern::Dispatch::new()
    .format(|out, message, record| {
      out.finish(format_args!(
        "{} {} [{}] {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
        record.target(),
        record.level(),
        message
      ))
    })
    .chain(fern::log_file(the_loader::log_file())?);

  base_config.chain(file_config).apply()?;

  Ok(())
}
