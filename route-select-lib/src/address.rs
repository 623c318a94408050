use crate::{
  dns::{AddressResolver, SystemResolver},
  error::BuildError,
  proxy::{NoProxySelector, Proxy, ProxySelector},
  target::TargetAddr,
  tls::ConnectionSpec,
};
use std::{
  fmt,
  hash::{Hash, Hasher},
  net::IpAddr,
  sync::Arc,
};

/* ---------------------------------------------------------- */
/// URI scheme of an address, which decides whether the connection is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheme {
  Http,
  #[default]
  Https,
}

impl Scheme {
  pub fn default_port(&self) -> u16 {
    match self {
      Scheme::Http => 80,
      Scheme::Https => 443,
    }
  }
}

impl fmt::Display for Scheme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scheme::Http => write!(f, "http"),
      Scheme::Https => write!(f, "https"),
    }
  }
}

impl TryFrom<&str> for Scheme {
  type Error = BuildError;
  fn try_from(value: &str) -> Result<Self, Self::Error> {
    match value.to_ascii_lowercase().as_str() {
      "http" => Ok(Scheme::Http),
      "https" => Ok(Scheme::Https),
      _ => Err(BuildError::InvalidScheme(value.to_string())),
    }
  }
}

/* ---------------------------------------------------------- */
#[derive(Clone, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
/// Immutable specification of a connection target.
///
/// Two addresses are equal when they agree on host, port, scheme, connection specs and explicit proxy,
/// and share the same resolver and proxy selector instances.
pub struct Address {
  #[builder(setter(into))]
  /// Host name or IP literal of the origin server
  host: String,

  /// Port of the origin server
  port: u16,

  #[builder(default)]
  scheme: Scheme,

  #[builder(default = "ConnectionSpec::default_specs()")]
  /// Connection specs in order of preference
  connection_specs: Vec<ConnectionSpec>,

  #[builder(setter(strip_option), default = "None")]
  /// Explicit proxy, overrides the proxy selector when set
  proxy: Option<Proxy>,

  #[builder(default = "NoProxySelector::shared()")]
  proxy_selector: Arc<dyn ProxySelector>,

  #[builder(default = "SystemResolver::shared()")]
  resolver: Arc<dyn AddressResolver>,
}

impl AddressBuilder {
  fn validate(&self) -> Result<(), String> {
    if let Some(host) = &self.host {
      let host = host.trim_start_matches('[').trim_end_matches(']');
      if host.is_empty() {
        return Err("Host must not be empty".to_string());
      }
      if host.parse::<IpAddr>().is_err() && !TargetAddr::validate_domain(host) {
        return Err(format!("Invalid host: {host}"));
      }
    }
    if self.port == Some(0) {
      return Err("Port must not be zero".to_string());
    }
    if let Some(specs) = &self.connection_specs {
      if specs.is_empty() {
        return Err("At least one connection spec is required".to_string());
      }
    }
    Ok(())
  }
}

impl Address {
  /// Shorthand for an address with default connection specs, no proxy and the system resolver
  pub fn try_new(host: &str, port: u16, scheme: Scheme) -> Result<Self, BuildError> {
    let address = AddressBuilder::default().host(host).port(port).scheme(scheme).build()?;
    Ok(address)
  }

  /// Host name, IPv6 literals without brackets
  pub fn host(&self) -> &str {
    self.host.trim_start_matches('[').trim_end_matches(']')
  }

  pub fn port(&self) -> u16 {
    self.port
  }

  pub fn scheme(&self) -> Scheme {
    self.scheme
  }

  pub fn is_tls(&self) -> bool {
    self.scheme == Scheme::Https
  }

  pub fn connection_specs(&self) -> &[ConnectionSpec] {
    &self.connection_specs
  }

  pub fn proxy(&self) -> Option<&Proxy> {
    self.proxy.as_ref()
  }

  pub fn proxy_selector(&self) -> &Arc<dyn ProxySelector> {
    &self.proxy_selector
  }

  pub fn resolver(&self) -> &Arc<dyn AddressResolver> {
    &self.resolver
  }

  /// `scheme://host:port/`, the key handed to the proxy selector
  pub fn uri(&self) -> String {
    let host = self.host();
    if host.contains(':') {
      format!("{}://[{}]:{}/", self.scheme, host, self.port)
    } else {
      format!("{}://{}:{}/", self.scheme, host, self.port)
    }
  }
}

/// Thin pointer of a shared trait object, for identity comparison
fn identity<T: ?Sized>(ptr: &Arc<T>) -> *const () {
  Arc::as_ptr(ptr) as *const ()
}

impl PartialEq for Address {
  fn eq(&self, other: &Self) -> bool {
    self.host() == other.host()
      && self.port == other.port
      && self.scheme == other.scheme
      && self.connection_specs == other.connection_specs
      && self.proxy == other.proxy
      && identity(&self.proxy_selector) == identity(&other.proxy_selector)
      && identity(&self.resolver) == identity(&other.resolver)
  }
}

impl Eq for Address {}

impl Hash for Address {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.host().hash(state);
    self.port.hash(state);
    self.scheme.hash(state);
    self.connection_specs.hash(state);
    self.proxy.hash(state);
    identity(&self.proxy_selector).hash(state);
    identity(&self.resolver).hash(state);
  }
}

impl fmt::Debug for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Address")
      .field("uri", &self.uri())
      .field(
        "connection_specs",
        &self.connection_specs.iter().map(|s| s.name()).collect::<Vec<_>>(),
      )
      .field("proxy", &self.proxy)
      .finish_non_exhaustive()
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let host = self.host();
    if host.contains(':') {
      write!(f, "[{}]:{}", host, self.port)
    } else {
      write!(f, "{}:{}", host, self.port)
    }
  }
}
