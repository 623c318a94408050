use crate::error::BuildError;
use std::{fmt, net::SocketAddr, str::FromStr};

/// Socket target of a route or a proxy: either a resolved socket address or a host name with port
/// that is left to someone else (a SOCKS proxy, or the resolver) to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetAddr {
  /// Direct socket address (IP and port)
  Socket(SocketAddr),
  /// Domain name and port combination
  Domain(String, u16),
}

impl TargetAddr {
  /// Validates if the given domain name follows basic DNS naming rules
  /// Allows alphanumeric characters (a-z, A-Z, 0-9), dots (.), hyphens (-) and underscores (_)
  /// Does not allow:
  /// - Empty domains
  /// - Domains longer than 253 characters
  /// - Consecutive dots
  /// - Leading or trailing dots
  pub(crate) fn validate_domain(domain: &str) -> bool {
    !domain.is_empty()
      && domain.len() <= 253
      && domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
      && !domain.starts_with('.')
      && !domain.ends_with('.')
      && !domain.contains("..")
  }

  /// Host part, an IP literal for resolved targets
  pub fn host(&self) -> String {
    match self {
      TargetAddr::Socket(addr) => addr.ip().to_string(),
      TargetAddr::Domain(domain, _) => domain.clone(),
    }
  }

  pub fn port(&self) -> u16 {
    match self {
      TargetAddr::Socket(addr) => addr.port(),
      TargetAddr::Domain(_, port) => *port,
    }
  }

  /// Returns the socket address if the target is already resolved
  pub fn socket_addr(&self) -> Option<SocketAddr> {
    match self {
      TargetAddr::Socket(addr) => Some(*addr),
      TargetAddr::Domain(..) => None,
    }
  }
}

impl From<SocketAddr> for TargetAddr {
  fn from(addr: SocketAddr) -> Self {
    TargetAddr::Socket(addr)
  }
}

impl fmt::Display for TargetAddr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TargetAddr::Socket(addr) => write!(f, "{}", addr),
      TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
    }
  }
}

impl FromStr for TargetAddr {
  type Err = BuildError;

  /// Parses a string into a TargetAddr
  ///
  /// The string should be in one of these formats:
  /// - IP:PORT (e.g., "127.0.0.1:8080", "[::1]:8080")
  /// - DOMAIN:PORT (e.g., "example.com:8080")
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    // First try to parse as a socket address
    if let Ok(socket_addr) = s.parse::<SocketAddr>() {
      return Ok(TargetAddr::Socket(socket_addr));
    }

    // If that fails, try to parse as domain:port
    match s.rsplit_once(':') {
      Some((domain, port)) => {
        if !Self::validate_domain(domain) {
          return Err(BuildError::InvalidAddress(format!("Invalid domain name: {domain}")));
        }

        let port = port
          .parse::<u16>()
          .map_err(|_| BuildError::InvalidAddress(format!("Invalid port number: {port}")))?;
        Ok(TargetAddr::Domain(domain.to_string(), port))
      }
      None => Err(BuildError::InvalidAddress(format!(
        "Invalid address format - missing port number: {s}"
      ))),
    }
  }
}
