use anyhow::anyhow;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use route_select_lib::{ConnectOptions, ConnectOptionsBuilder};
use std::time::Duration;

/// Parsed options
#[derive(Debug)]
pub struct Opts {
  /// Configuration file listing the destinations
  pub config_file_path: String,
  /// Directory for `route-select.log`, stdout if absent
  pub log_dir_path: Option<String>,
  /// Connect timeout in milliseconds overriding the configured one, 0 disables it
  pub connect_timeout_msec: Option<u64>,
  /// Stop at the first failed attempt of each destination
  pub no_retry: bool,
}

impl Opts {
  /// Apply the command line overrides on top of the configured connect options
  pub fn override_options(&self, options: &ConnectOptions) -> Result<ConnectOptions, anyhow::Error> {
    let connect_timeout = match self.connect_timeout_msec {
      Some(0) => None,
      Some(msec) => Some(Duration::from_millis(msec)),
      None => options.connect_timeout(),
    };
    let retry = options.retry_on_connection_failure() && !self.no_retry;
    ConnectOptionsBuilder::default()
      .connect_timeout(connect_timeout)
      .retry_on_connection_failure(retry)
      .build()
      .map_err(|e| anyhow!("Invalid command line options: {e}"))
  }
}

fn command() -> Command {
  let _ = include_str!("../../Cargo.toml");
  clap::command!()
    .about("Connects to every configured destination, failing over across proxies, addresses and TLS connection specs")
    .arg(
      Arg::new("config_file")
        .long("config")
        .short('c')
        .value_name("FILE")
        .required(true)
        .help("TOML file with [destinations.<name>] tables (host, port, scheme, proxies, connection_specs)"),
    )
    .arg(
      Arg::new("log_dir")
        .long("log-dir")
        .short('l')
        .value_name("LOG_DIR")
        .help("Directory to write route-select.log into. If not specified, logs are printed to stdout."),
    )
    .arg(
      Arg::new("connect_timeout")
        .long("connect-timeout")
        .short('t')
        .value_name("MSEC")
        .value_parser(value_parser!(u64))
        .help("Per-step connect timeout in milliseconds, overriding the configuration file. 0 disables the timeout."),
    )
    .arg(
      Arg::new("no_retry")
        .long("no-retry")
        .action(ArgAction::SetTrue)
        .help("Give up on a destination after its first failed attempt instead of falling back"),
    )
}

fn opts_from_matches(matches: &ArgMatches) -> Result<Opts, anyhow::Error> {
  let config_file_path = matches
    .get_one::<String>("config_file")
    .ok_or_else(|| anyhow!("config_file is required"))?
    .to_owned();

  Ok(Opts {
    config_file_path,
    log_dir_path: matches.get_one::<String>("log_dir").cloned(),
    connect_timeout_msec: matches.get_one::<u64>("connect_timeout").copied(),
    no_retry: matches.get_flag("no_retry"),
  })
}

/// Parse arg values passed from cli
pub fn parse_opts() -> Result<Opts, anyhow::Error> {
  opts_from_matches(&command().get_matches())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(args: &[&str]) -> Result<Opts, anyhow::Error> {
    let matches = command().try_get_matches_from(std::iter::once("route-select").chain(args.iter().copied()))?;
    opts_from_matches(&matches)
  }

  #[test]
  fn test_parse_opts() {
    let opts = parse(&["-c", "config.toml"]).unwrap();
    assert_eq!(opts.config_file_path, "config.toml");
    assert!(opts.log_dir_path.is_none());
    assert!(opts.connect_timeout_msec.is_none());
    assert!(!opts.no_retry);

    let opts = parse(&["--config", "config.toml", "--log-dir", "/tmp/logs", "-t", "250", "--no-retry"]).unwrap();
    assert_eq!(opts.log_dir_path.as_deref(), Some("/tmp/logs"));
    assert_eq!(opts.connect_timeout_msec, Some(250));
    assert!(opts.no_retry);

    assert!(parse(&[]).is_err());
    assert!(parse(&["-c", "config.toml", "-t", "soon"]).is_err());
  }

  #[test]
  fn test_override_options() {
    let configured = ConnectOptionsBuilder::default()
      .connect_timeout(Some(Duration::from_secs(3)))
      .build()
      .unwrap();

    let untouched = parse(&["-c", "config.toml"]).unwrap().override_options(&configured).unwrap();
    assert_eq!(untouched, configured);

    let options = parse(&["-c", "config.toml", "-t", "500", "--no-retry"])
      .unwrap()
      .override_options(&configured)
      .unwrap();
    assert_eq!(options.connect_timeout(), Some(Duration::from_millis(500)));
    assert!(!options.retry_on_connection_failure());

    let options = parse(&["-c", "config.toml", "-t", "0"]).unwrap().override_options(&configured).unwrap();
    assert_eq!(options.connect_timeout(), None);
  }
}
