use crate::{
  address::Scheme,
  config::{Config, ConnectOptions, DestinationConfig, validation::*},
  proxy::Proxy,
  tls::ConnectionSpec,
};
use std::time::Duration;

/// Builder for creating configurations with validation
#[derive(Debug, Default)]
pub struct ConfigBuilder {
  connect_timeout: Option<Option<Duration>>,
  retry_on_connection_failure: Option<bool>,
  destinations: Vec<DestinationConfig>,
}

impl ConfigBuilder {
  /// Create a new configuration builder
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the per-step connect timeout
  pub fn with_connect_timeout(mut self, timeout: Duration) -> Result<Self, ConfigValidationError> {
    BasicConfigValidator::validate_connect_timeout(timeout)?;
    self.connect_timeout = Some(Some(timeout));
    Ok(self)
  }

  /// Wait for each connect step without a time limit
  pub fn without_connect_timeout(mut self) -> Self {
    self.connect_timeout = Some(None);
    self
  }

  /// Enable or disable retries on other connection specs and routes
  pub fn with_retry_on_connection_failure(mut self, enabled: bool) -> Self {
    self.retry_on_connection_failure = Some(enabled);
    self
  }

  /// Add a destination configuration
  pub fn with_destination(mut self, destination: DestinationConfig) -> Result<Self, ConfigValidationError> {
    if self.destinations.iter().any(|d| d.name == destination.name) {
      return Err(ConfigValidationError::ConflictingConfiguration {
        reason: format!("Destination '{}' is defined twice", destination.name),
      });
    }
    DestinationValidator::validate_host(&destination.name, &destination.host)?;
    DestinationValidator::validate_port(&destination.name, destination.port)?;
    DestinationValidator::validate_proxies(&destination.name, &destination.proxies)?;
    DestinationValidator::validate_connection_specs(
      &destination.name,
      destination.scheme,
      &destination.connection_specs,
    )?;

    self.destinations.push(destination);
    Ok(self)
  }

  /// Build the final configuration
  pub fn build(self) -> Result<Config, ConfigValidationError> {
    if self.destinations.is_empty() {
      return Err(ConfigValidationError::MissingRequiredField {
        field: "destinations".to_string(),
      });
    }

    let defaults = ConnectOptions::default();
    let options = ConnectOptions {
      connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
      retry_on_connection_failure: self
        .retry_on_connection_failure
        .unwrap_or(defaults.retry_on_connection_failure),
    };

    Ok(Config {
      options,
      destinations: self.destinations,
    })
  }
}

/// Builder for creating destination configurations with validation
#[derive(Debug)]
pub struct DestinationConfigBuilder {
  name: String,
  host: Option<String>,
  port: Option<u16>,
  scheme: Scheme,
  proxies: Vec<Proxy>,
  connection_specs: Option<Vec<ConnectionSpec>>,
}

impl DestinationConfigBuilder {
  /// Create a new destination configuration builder
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      host: None,
      port: None,
      scheme: Scheme::default(),
      proxies: Vec::new(),
      connection_specs: None,
    }
  }

  /// Set the host (required)
  pub fn with_host(mut self, host: &str) -> Result<Self, ConfigValidationError> {
    DestinationValidator::validate_host(&self.name, host)?;
    self.host = Some(host.to_string());
    Ok(self)
  }

  /// Set the port, defaults to the scheme's default port
  pub fn with_port(mut self, port: u16) -> Result<Self, ConfigValidationError> {
    DestinationValidator::validate_port(&self.name, port)?;
    self.port = Some(port);
    Ok(self)
  }

  /// Set the scheme, `http` or `https`
  pub fn with_scheme(mut self, scheme: &str) -> Result<Self, ConfigValidationError> {
    self.scheme = Scheme::try_from(scheme).map_err(|e| ConfigValidationError::DestinationValidationError {
      destination: self.name.clone(),
      reason: e.to_string(),
    })?;
    Ok(self)
  }

  /// Set proxies from their string forms, e.g. `http://proxy.example:3128`
  pub fn with_proxies(mut self, proxies: Vec<&str>) -> Result<Self, ConfigValidationError> {
    let proxies: Result<Vec<Proxy>, _> = proxies
      .iter()
      .map(|s| {
        s.parse::<Proxy>()
          .map_err(|e| ConfigValidationError::DestinationValidationError {
            destination: self.name.clone(),
            reason: format!("Invalid proxy '{}': {}", s, e),
          })
      })
      .collect();
    let proxies = proxies?;
    DestinationValidator::validate_proxies(&self.name, &proxies)?;
    self.proxies = proxies;
    Ok(self)
  }

  /// Set connection specs by name: `restricted`, `modern`, `compatible` or `cleartext`
  pub fn with_connection_specs(mut self, names: Vec<&str>) -> Result<Self, ConfigValidationError> {
    let specs: Result<Vec<ConnectionSpec>, _> = names
      .iter()
      .map(|name| {
        ConnectionSpec::try_from(*name).map_err(|e| ConfigValidationError::DestinationValidationError {
          destination: self.name.clone(),
          reason: e.to_string(),
        })
      })
      .collect();
    self.connection_specs = Some(specs?);
    Ok(self)
  }

  /// Build the destination configuration
  pub fn build(self) -> Result<DestinationConfig, ConfigValidationError> {
    let host = self.host.ok_or(ConfigValidationError::MissingRequiredField {
      field: format!("destinations.{}.host", self.name),
    })?;
    let port = self.port.unwrap_or(self.scheme.default_port());
    let connection_specs = match self.connection_specs {
      Some(specs) => specs,
      None => match self.scheme {
        Scheme::Https => vec![ConnectionSpec::modern_tls(), ConnectionSpec::compatible_tls()],
        Scheme::Http => vec![ConnectionSpec::cleartext()],
      },
    };
    DestinationValidator::validate_connection_specs(&self.name, self.scheme, &connection_specs)?;

    Ok(DestinationConfig {
      name: self.name,
      host,
      port,
      scheme: self.scheme,
      proxies: self.proxies,
      connection_specs,
    })
  }
}
