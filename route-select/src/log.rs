pub use tracing::{debug, error, info, warn};

use std::{fs, path::Path, str::FromStr, sync::Arc};
use tracing_subscriber::{fmt, prelude::*};

/// File name of the log written under the log directory
const LOG_FILE_NAME: &str = "route-select.log";

pub fn init_logger(log_dir_path: Option<&str>) -> Result<(), anyhow::Error> {
  let level_string = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
  let level = tracing::Level::from_str(level_string.as_str()).unwrap_or(tracing::Level::INFO);

  let passed_pkg_names = [
    env!("CARGO_PKG_NAME").replace('-', "_"),
    "route_select_lib".to_string(),
  ];

  // Emits this crate and the engine at any level, other crates at INFO or above
  let filter = tracing_subscriber::filter::filter_fn(move |metadata| {
    (passed_pkg_names
      .iter()
      .any(|pkg_name| metadata.target().starts_with(pkg_name))
      && metadata.level() <= &level)
      || metadata.level() <= &tracing::Level::INFO.min(level)
  });

  let reg = tracing_subscriber::registry();
  match log_dir_path {
    None => {
      let stdio_layer = fmt::layer()
        .with_line_number(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_target(true)
        .with_level(true)
        .compact()
        .with_filter(filter);
      reg.with(stdio_layer).try_init()?;
    }
    Some(log_dir_path) => {
      fs::create_dir_all(log_dir_path)?;
      let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(log_dir_path).join(LOG_FILE_NAME))?;
      let file_layer = fmt::layer()
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .compact()
        .with_writer(Arc::new(file))
        .with_filter(filter);
      reg.with(file_layer).try_init()?;
    }
  }
  Ok(())
}
