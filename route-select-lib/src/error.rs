use crate::tls::TlsVersion;

/// Errors returned by an [crate::AddressResolver]
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
  /// The resolver has no record for the host
  #[error("Unknown host: {0}")]
  UnknownHost(String),

  /// The lookup itself failed
  #[error("DNS lookup for {hostname} failed: {source}")]
  Lookup {
    hostname: String,
    #[source]
    source: std::io::Error,
  },
}

/// Errors that happen while the route selector produces a selection
#[derive(thiserror::Error, Debug)]
pub enum RouteSelectError {
  /// `next()` was called although `has_next()` is false
  #[error("No more routes to attempt")]
  Exhausted,

  /* --------------------------------------- */
  #[error("DNS resolution error: {0}")]
  Resolution(#[from] ResolveError),

  /// The resolver succeeded but returned no address
  #[error("Resolver returned no addresses for {0}")]
  UnresolvableHost(String),

  #[error("No route to {host}:{port}; port is out of range")]
  InvalidPort { host: String, port: u16 },
}

/// None of the remaining connection specs is compatible with the socket
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error(
  "Unable to find acceptable protocols. fallback={fallback}, connection specs={connection_specs:?}, enabled protocols={enabled_protocols:?}"
)]
pub struct UnnegotiableTransport {
  /// Whether the attempt was already a fallback attempt
  pub fallback: bool,
  /// Names of all connection specs of the address
  pub connection_specs: Vec<String>,
  /// Protocols the socket had enabled when inspected
  pub enabled_protocols: Vec<TlsVersion>,
}

/// Errors returned by [crate::ConnectionFinder::connect]
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
  /// Every candidate route failed; carries the first and last failure
  #[error(transparent)]
  Route(#[from] crate::failure::RouteError),

  #[error("Connection attempt canceled")]
  Canceled,

  #[error("CLEARTEXT communication not enabled for client: {0}")]
  CleartextNotPermitted(String),
}

/// Errors that happen while building addresses, proxies, connection specs and options
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
  /* --------------------------------------- */
  #[error("Invalid address: {0}")]
  InvalidAddress(String),

  #[error("Invalid proxy: {0}")]
  InvalidProxy(String),

  #[error("Invalid scheme: {0}")]
  InvalidScheme(String),

  #[error("Invalid connection spec: {0}")]
  InvalidConnectionSpec(String),

  /* --------------------------------------- */
  /// Address builder error
  #[error("Address builder error: {0}")]
  AddressBuilderError(#[from] crate::address::AddressBuilderError),

  /// Connect options builder error
  #[error("Connect options builder error: {0}")]
  ConnectOptionsBuilderError(#[from] crate::config::ConnectOptionsBuilderError),
}
