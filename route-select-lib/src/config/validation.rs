use crate::{
  address::Scheme,
  proxy::Proxy,
  target::TargetAddr,
  tls::ConnectionSpec,
};
use std::{net::IpAddr, time::Duration};

/// Validation errors specific to configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
  #[error("Missing required field: {field}")]
  MissingRequiredField { field: String },

  #[error("Invalid value for field {field}: {value}. {reason}")]
  InvalidFieldValue { field: String, value: String, reason: String },

  #[error("Destination validation error for '{destination}': {reason}")]
  DestinationValidationError { destination: String, reason: String },

  #[error("Conflicting configuration: {reason}")]
  ConflictingConfiguration { reason: String },
}

/// Result type for configuration validation
pub type ValidationResult<T> = Result<T, ConfigValidationError>;

/// Validator for options shared by every destination
pub struct BasicConfigValidator;

impl BasicConfigValidator {
  /// Validate the per-step connect timeout
  pub fn validate_connect_timeout(timeout: Duration) -> ValidationResult<()> {
    if timeout.is_zero() {
      return Err(ConfigValidationError::InvalidFieldValue {
        field: "connect_timeout".to_string(),
        value: format!("{:?}", timeout),
        reason: "Connect timeout cannot be 0".to_string(),
      });
    }

    if timeout < Duration::from_millis(100) {
      crate::trace::warn!(
        "Connect timeout {:?} is very short - most TLS handshakes will time out",
        timeout
      );
    }

    Ok(())
  }
}

/// Validator for destination configurations
pub struct DestinationValidator;

impl DestinationValidator {
  /// Validate the host of a destination
  pub fn validate_host(name: &str, host: &str) -> ValidationResult<()> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.is_empty() {
      return Err(ConfigValidationError::DestinationValidationError {
        destination: name.to_string(),
        reason: "Host cannot be empty".to_string(),
      });
    }
    if bare.parse::<IpAddr>().is_err() && !TargetAddr::validate_domain(bare) {
      return Err(ConfigValidationError::DestinationValidationError {
        destination: name.to_string(),
        reason: format!("Invalid host '{}'", host),
      });
    }
    Ok(())
  }

  /// Validate the destination port
  pub fn validate_port(name: &str, port: u16) -> ValidationResult<()> {
    if port == 0 {
      return Err(ConfigValidationError::DestinationValidationError {
        destination: name.to_string(),
        reason: "Port cannot be 0".to_string(),
      });
    }
    Ok(())
  }

  /// Validate the proxy list of a destination
  pub fn validate_proxies(name: &str, proxies: &[Proxy]) -> ValidationResult<()> {
    for (i, proxy) in proxies.iter().enumerate() {
      if proxies[..i].contains(proxy) {
        crate::trace::warn!("Proxy {} is listed twice for destination '{}'", proxy, name);
      }
    }
    if proxies.len() > 1 && proxies.iter().any(|p| p.is_direct()) && !proxies[proxies.len() - 1].is_direct() {
      crate::trace::warn!(
        "Destination '{}' tries a direct connection before some proxies - ensure this order is intended",
        name
      );
    }
    Ok(())
  }

  /// Validate connection specs against the scheme
  pub fn validate_connection_specs(name: &str, scheme: Scheme, specs: &[ConnectionSpec]) -> ValidationResult<()> {
    if specs.is_empty() {
      return Err(ConfigValidationError::DestinationValidationError {
        destination: name.to_string(),
        reason: "At least one connection spec is required".to_string(),
      });
    }

    match scheme {
      Scheme::Http => {
        if !specs.iter().any(|s| !s.is_tls()) {
          return Err(ConfigValidationError::DestinationValidationError {
            destination: name.to_string(),
            reason: "An http destination requires the cleartext connection spec".to_string(),
          });
        }
      }
      Scheme::Https => {
        if !specs.iter().any(|s| s.is_tls()) {
          return Err(ConfigValidationError::DestinationValidationError {
            destination: name.to_string(),
            reason: "An https destination requires at least one TLS connection spec".to_string(),
          });
        }
        if specs.first().is_some_and(|s| s.is_fallback()) {
          crate::trace::warn!(
            "Destination '{}' starts with the fallback spec '{}' - modern servers may reject it",
            name,
            specs[0].name()
          );
        }
      }
    }
    Ok(())
  }
}
