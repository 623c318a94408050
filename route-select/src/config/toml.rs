use crate::log::warn;
use anyhow::anyhow;
use route_select_lib::{Config, ConfigBuilder, DestinationConfigBuilder};
use serde::Deserialize;
use std::{
  collections::{BTreeMap, HashSet},
  fs,
  time::Duration,
};

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct ConfigToml {
  /// Per-step connect timeout like "10s". "0s" disables the timeout.
  pub connect_timeout: Option<String>,
  pub retry_on_connection_failure: Option<bool>,
  pub destinations: Option<DestinationsToml>,
}

/// Destinations keyed by name, kept in name order
#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct DestinationsToml(pub BTreeMap<String, DestinationToml>);

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct DestinationToml {
  pub host: Option<String>,
  /// Defaults to the port of the scheme
  pub port: Option<u16>,
  /// "http" or "https", defaults to "https"
  pub scheme: Option<String>,
  /// "direct", "http://host:port" or "socks5://host:port"
  pub proxies: Option<Vec<String>>,
  /// Names of connection specs: "modern", "compatible", "restricted", "cleartext"
  pub connection_specs: Option<Vec<String>>,
}

impl ConfigToml {
  pub fn new(config_file: &str) -> Result<Self, anyhow::Error> {
    let config_str = fs::read_to_string(config_file)?;
    Self::from_toml_str(&config_str)
  }

  fn from_toml_str(config_str: &str) -> Result<Self, anyhow::Error> {
    // Check unused fields during deserialization
    let t = toml::de::Deserializer::new(config_str);
    let mut unused = HashSet::new();

    let res = serde_ignored::deserialize(t, |path| {
      unused.insert(path.to_string());
    })
    .map_err(|e| anyhow::anyhow!(e));

    if !unused.is_empty() {
      let str = unused.iter().fold(String::new(), |acc, x| acc + x + "\n");
      warn!("Configuration file contains unsupported fields. Check typos:\n{}", str);
    }

    res
  }
}

impl TryFrom<ConfigToml> for Config {
  type Error = anyhow::Error;

  fn try_from(config_toml: ConfigToml) -> Result<Self, Self::Error> {
    let mut builder = ConfigBuilder::new();

    if let Some(timeout) = config_toml.connect_timeout.as_ref() {
      let timeout = parse_duration(timeout)?;
      builder = if timeout.is_zero() {
        builder.without_connect_timeout()
      } else {
        builder
          .with_connect_timeout(timeout)
          .map_err(|e| anyhow!("Invalid connect timeout: {}", e))?
      };
    }
    if let Some(retry) = config_toml.retry_on_connection_failure {
      builder = builder.with_retry_on_connection_failure(retry);
    }

    let Some(destinations) = config_toml.destinations else {
      return Err(anyhow!("At least one destination is required"));
    };
    for (name, destination_toml) in destinations.0 {
      let Some(host) = destination_toml.host.as_ref() else {
        return Err(anyhow!("host is required for destination: {name}"));
      };

      let mut destination_builder = DestinationConfigBuilder::new(&name)
        .with_host(host)
        .map_err(|e| anyhow!("Invalid host for destination '{}': {}", name, e))?;

      if let Some(scheme) = destination_toml.scheme.as_ref() {
        destination_builder = destination_builder
          .with_scheme(scheme)
          .map_err(|e| anyhow!("Invalid scheme for destination '{}': {}", name, e))?;
      }
      if let Some(port) = destination_toml.port {
        destination_builder = destination_builder
          .with_port(port)
          .map_err(|e| anyhow!("Invalid port for destination '{}': {}", name, e))?;
      }
      if let Some(proxies) = destination_toml.proxies.as_ref() {
        let proxy_strs: Vec<&str> = proxies.iter().map(|s| s.as_str()).collect();
        destination_builder = destination_builder
          .with_proxies(proxy_strs)
          .map_err(|e| anyhow!("Invalid proxies for destination '{}': {}", name, e))?;
      }
      if let Some(specs) = destination_toml.connection_specs.as_ref() {
        let spec_strs: Vec<&str> = specs.iter().map(|s| s.as_str()).collect();
        destination_builder = destination_builder
          .with_connection_specs(spec_strs)
          .map_err(|e| anyhow!("Invalid connection specs for destination '{}': {}", name, e))?;
      }

      let destination = destination_builder
        .build()
        .map_err(|e| anyhow!("Failed to build destination '{}': {}", name, e))?;
      builder = builder
        .with_destination(destination)
        .map_err(|e| anyhow!("Failed to add destination: {}", e))?;
    }

    // Build the final configuration with validation
    builder.build().map_err(|e| anyhow!("Configuration validation failed: {}", e))
  }
}

/// Parse duration string like "500ms", "30s", "5m", "1h" into Duration
fn parse_duration(s: &str) -> Result<Duration, anyhow::Error> {
  let s = s.trim();
  if s.is_empty() {
    return Err(anyhow!("Empty duration string"));
  }

  let (num_part, unit_part) = if let Some(pos) = s.find(|c: char| c.is_alphabetic()) {
    (&s[..pos], &s[pos..])
  } else {
    return Err(anyhow!("Duration must include a unit (ms, s, m, h)"));
  };

  let num: u64 = num_part
    .trim()
    .parse()
    .map_err(|_| anyhow!("Invalid number in duration: {}", num_part))?;

  let duration = match unit_part.to_lowercase().as_str() {
    "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => Duration::from_millis(num),
    "s" | "sec" | "secs" | "second" | "seconds" => Duration::from_secs(num),
    "m" | "min" | "mins" | "minute" | "minutes" => Duration::from_secs(num * 60),
    "h" | "hr" | "hrs" | "hour" | "hours" => Duration::from_secs(num * 3600),
    _ => return Err(anyhow!("Invalid duration unit: {}. Use ms, s, m, or h", unit_part)),
  };

  Ok(duration)
}

#[cfg(test)]
mod tests {
  use super::*;

  const EXAMPLE: &str = r#"
connect_timeout = "500ms"
retry_on_connection_failure = false

[destinations.secure]
host = "example.com"
proxies = ["direct", "http://127.0.0.1:3128"]
connection_specs = ["modern", "compatible"]

[destinations.plain]
host = "192.0.2.1"
scheme = "http"
port = 8080
"#;

  #[test]
  fn test_parse_duration() {
    assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
    assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("10d").is_err());
    assert!(parse_duration("xs").is_err());
  }

  #[test]
  fn test_config_from_toml() {
    let config_toml = ConfigToml::from_toml_str(EXAMPLE).unwrap();
    let config = Config::try_from(config_toml).unwrap();

    assert_eq!(config.options.connect_timeout(), Some(Duration::from_millis(500)));
    assert!(!config.options.retry_on_connection_failure());
    assert_eq!(config.destinations.len(), 2);

    let plain = config.destinations.iter().find(|d| d.name == "plain").unwrap();
    assert_eq!(plain.port, 8080);
    let secure = config.destinations.iter().find(|d| d.name == "secure").unwrap();
    assert_eq!(secure.port, 443);
    assert_eq!(secure.proxies.len(), 2);
    assert_eq!(secure.connection_specs.len(), 2);
  }

  #[test]
  fn test_zero_timeout_disables_timeout() {
    let config_toml = ConfigToml::from_toml_str(
      r#"
connect_timeout = "0s"
[destinations.a]
host = "example.com"
"#,
    )
    .unwrap();
    let config = Config::try_from(config_toml).unwrap();
    assert_eq!(config.options.connect_timeout(), None);
  }

  #[test]
  fn test_invalid_configs() {
    let missing_destinations = ConfigToml::from_toml_str(r#"connect_timeout = "1s""#).unwrap();
    assert!(Config::try_from(missing_destinations).is_err());

    let missing_host = ConfigToml::from_toml_str("[destinations.a]\nport = 443\n").unwrap();
    assert!(Config::try_from(missing_host).is_err());

    let bad_scheme = ConfigToml::from_toml_str("[destinations.a]\nhost = \"example.com\"\nscheme = \"ftp\"\n").unwrap();
    assert!(Config::try_from(bad_scheme).is_err());
  }

  #[test]
  fn test_unknown_fields_are_ignored() {
    let config_toml =
      ConfigToml::from_toml_str("listen_port = 8080\n[destinations.a]\nhost = \"example.com\"\n").unwrap();
    assert!(Config::try_from(config_toml).is_ok());
  }
}
