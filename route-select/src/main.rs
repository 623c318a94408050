#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod log;

use crate::{
  config::{ConfigToml, parse_opts},
  log::*,
};
use anyhow::anyhow;
use route_select_lib::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() -> Result<(), anyhow::Error> {
  let opts = parse_opts()?;
  init_logger(opts.log_dir_path.as_deref())?;

  let config_toml = ConfigToml::new(&opts.config_file_path)
    .map_err(|e| anyhow!("Failed to load configuration file {}: {}", opts.config_file_path, e))?;
  let mut config = Config::try_from(config_toml)?;
  config.options = opts.override_options(&config.options)?;

  let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
  runtime_builder.enable_all();
  runtime_builder.thread_name("route-select");
  let runtime = runtime_builder.build()?;

  runtime.block_on(async move {
    info!("Connecting to {} destination(s)", config.destinations.len());

    let cancel_token = CancellationToken::new();
    tokio::spawn({
      let cancel_token = cancel_token.clone();
      async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          warn!("Interrupted, canceling pending connection attempts");
          cancel_token.cancel();
        }
      }
    });

    connect_all(config, cancel_token).await
  })
}

/// Connect to every destination concurrently. Destinations share the route ledger, so a failed route is postponed for
/// later attempts to the same address. Proxies failing for one destination are ranked last for the others.
async fn connect_all(config: Config, cancel_token: CancellationToken) -> Result<(), anyhow::Error> {
  let ledger = Arc::new(RouteDatabase::new());
  let transport = Arc::new(TokioTransport::new());
  let events: Arc<dyn EventListener> = Arc::new(TracingEventListener);
  let addresses = config
    .addresses(SystemResolver::shared())
    .map_err(|e| anyhow!("Invalid destination: {}", e))?;

  let mut attempts = Vec::with_capacity(addresses.len());
  for (destination, address) in config.destinations.iter().zip(addresses) {
    let finder = ConnectionFinder::new(
      address,
      transport.clone(),
      ledger.clone(),
      events.clone(),
      config.options.clone(),
    )
    .with_cancel_token(cancel_token.child_token());
    attempts.push(connect_destination(destination.name.as_str(), finder));
  }

  let results = futures::future::join_all(attempts).await;
  let failed = results.iter().filter(|ok| !**ok).count();
  debug!("{} route(s) marked as failed", ledger.len());
  if failed > 0 {
    return Err(anyhow!("{failed} of {} destination(s) unreachable", results.len()));
  }
  info!("All destinations reachable");
  Ok(())
}

async fn connect_destination(name: &str, mut finder: ConnectionFinder<TokioTransport>) -> bool {
  match finder.connect().await {
    Ok(established) => {
      info!(
        "[{name}] connected via {} with {} ({})",
        established.route(),
        established.connection_spec().name(),
        if established.is_tls() { "tls" } else { "cleartext" }
      );
      true
    }
    Err(ConnectError::Route(e)) => {
      error!("[{name}] all routes failed after {} attempt(s): {e}", e.attempts());
      for failure in e.suppressed() {
        debug!("[{name}] suppressed: {failure}");
      }
      false
    }
    Err(e) => {
      error!("[{name}] {e}");
      false
    }
  }
}
