use super::version::{CipherSuite, TlsVersion};
use crate::{error::BuildError, trace::*};
use std::fmt;

/* ---------------------------------------------------------- */
/// Capability query and configuration surface of a not yet handshaked secure socket.
///
/// Transports hand an implementation of this trait to the [super::ConnectionSpecSelector], which reads what the
/// socket can do and narrows its enabled protocols and cipher suites to the chosen [ConnectionSpec].
pub trait SecureSocket {
  /// Protocol versions currently enabled on the socket
  fn enabled_protocols(&self) -> &[TlsVersion];
  /// Cipher suites currently enabled on the socket
  fn enabled_cipher_suites(&self) -> &[CipherSuite];
  /// Every cipher suite the TLS implementation could enable
  fn supported_cipher_suites(&self) -> &[CipherSuite];
  fn set_enabled_protocols(&mut self, protocols: &[TlsVersion]);
  fn set_enabled_cipher_suites(&mut self, cipher_suites: &[CipherSuite]);
}

/* ---------------------------------------------------------- */
const RESTRICTED_CIPHER_SUITES: &[CipherSuite] = &[
  CipherSuite::TLS_AES_128_GCM_SHA256,
  CipherSuite::TLS_AES_256_GCM_SHA384,
  CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
  CipherSuite::TLS_AES_128_CCM_SHA256,
  CipherSuite::TLS_AES_128_CCM_8_SHA256,
  CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
  CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
  CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
  CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
  CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
  CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
];

const APPROVED_CIPHER_SUITES: &[CipherSuite] = &[
  CipherSuite::TLS_AES_128_GCM_SHA256,
  CipherSuite::TLS_AES_256_GCM_SHA384,
  CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
  CipherSuite::TLS_AES_128_CCM_SHA256,
  CipherSuite::TLS_AES_128_CCM_8_SHA256,
  CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
  CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
  CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
  CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
  CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
  CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
  CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
  CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA,
  CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
  CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
  CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
  CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA,
  CipherSuite::TLS_RSA_WITH_3DES_EDE_CBC_SHA,
];

/* ---------------------------------------------------------- */
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A named transport-security configuration: which TLS versions and cipher suites to enable on a socket.
///
/// `None` for versions or cipher suites means "whatever the socket already enables".
pub struct ConnectionSpec {
  name: String,
  tls: bool,
  cipher_suites: Option<Vec<CipherSuite>>,
  tls_versions: Option<Vec<TlsVersion>>,
  supports_tls_extensions: bool,
  /// Reduced-compatibility mode for interoperating with obsolete servers
  fallback: bool,
}

impl ConnectionSpec {
  /// Secure configuration assuming a modern client platform and server
  pub fn restricted_tls() -> Self {
    Self {
      name: "restricted".to_string(),
      tls: true,
      cipher_suites: Some(RESTRICTED_CIPHER_SUITES.to_vec()),
      tls_versions: Some(vec![TlsVersion::Tls13, TlsVersion::Tls12]),
      supports_tls_extensions: true,
      fallback: false,
    }
  }

  /// TLS configuration with extensions like SNI and ALPN available
  pub fn modern_tls() -> Self {
    Self {
      name: "modern".to_string(),
      tls: true,
      cipher_suites: Some(APPROVED_CIPHER_SUITES.to_vec()),
      tls_versions: Some(vec![
        TlsVersion::Tls13,
        TlsVersion::Tls12,
        TlsVersion::Tls11,
        TlsVersion::Tls10,
      ]),
      supports_tls_extensions: true,
      fallback: false,
    }
  }

  /// Backwards-compatible fallback configuration for interop with obsolete servers
  pub fn compatible_tls() -> Self {
    Self {
      name: "compatible".to_string(),
      tls: true,
      cipher_suites: Some(APPROVED_CIPHER_SUITES.to_vec()),
      tls_versions: Some(vec![TlsVersion::Tls10]),
      supports_tls_extensions: true,
      fallback: true,
    }
  }

  /// Unencrypted, unauthenticated connections for `http:` addresses
  pub fn cleartext() -> Self {
    Self {
      name: "cleartext".to_string(),
      tls: false,
      cipher_suites: None,
      tls_versions: None,
      supports_tls_extensions: false,
      fallback: false,
    }
  }

  /// Default list for an address: modern first, then the compatible fallback, then cleartext for `http:`
  pub fn default_specs() -> Vec<Self> {
    vec![Self::modern_tls(), Self::compatible_tls(), Self::cleartext()]
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_tls(&self) -> bool {
    self.tls
  }

  pub fn cipher_suites(&self) -> Option<&[CipherSuite]> {
    self.cipher_suites.as_deref()
  }

  pub fn tls_versions(&self) -> Option<&[TlsVersion]> {
    self.tls_versions.as_deref()
  }

  pub fn supports_tls_extensions(&self) -> bool {
    self.supports_tls_extensions
  }

  /// Whether this spec is a reduced-compatibility fallback mode
  pub fn is_fallback(&self) -> bool {
    self.fallback
  }

  /// Returns true if the socket, as currently configured, supports this spec.
  /// The spec's required versions and cipher suites must each intersect what the socket enables.
  pub fn is_compatible<S: SecureSocket + ?Sized>(&self, socket: &S) -> bool {
    if !self.tls {
      return false;
    }
    if let Some(versions) = &self.tls_versions {
      if !versions.iter().any(|v| socket.enabled_protocols().contains(v)) {
        return false;
      }
    }
    if let Some(suites) = &self.cipher_suites {
      if !suites.iter().any(|s| socket.enabled_cipher_suites().contains(s)) {
        return false;
      }
    }
    true
  }

  /// Narrow the socket to the versions and cipher suites of this spec.
  /// On a fallback attempt `TLS_FALLBACK_SCSV` is appended when the socket supports it.
  pub fn apply<S: SecureSocket + ?Sized>(&self, socket: &mut S, is_fallback: bool) {
    let mut cipher_suites: Vec<CipherSuite> = match &self.cipher_suites {
      Some(suites) => intersect(socket.enabled_cipher_suites(), suites),
      None => socket.enabled_cipher_suites().to_vec(),
    };
    let tls_versions: Vec<TlsVersion> = match &self.tls_versions {
      Some(versions) => intersect(socket.enabled_protocols(), versions),
      None => socket.enabled_protocols().to_vec(),
    };

    if is_fallback
      && socket.supported_cipher_suites().contains(&CipherSuite::TLS_FALLBACK_SCSV)
      && !cipher_suites.contains(&CipherSuite::TLS_FALLBACK_SCSV)
    {
      debug!("Signalling fallback with TLS_FALLBACK_SCSV for spec {}", self.name);
      cipher_suites.push(CipherSuite::TLS_FALLBACK_SCSV);
    }

    socket.set_enabled_protocols(&tls_versions);
    socket.set_enabled_cipher_suites(&cipher_suites);
  }
}

/// Elements of `first` that are also in `second`, keeping the order of `first`
fn intersect<T: PartialEq + Copy>(first: &[T], second: &[T]) -> Vec<T> {
  first.iter().filter(|a| second.contains(a)).copied().collect()
}

impl fmt::Display for ConnectionSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if !self.tls {
      return write!(f, "ConnectionSpec({})", self.name);
    }
    let versions = match &self.tls_versions {
      Some(v) => v.iter().map(|v| v.name()).collect::<Vec<_>>().join(", "),
      None => "all enabled".to_string(),
    };
    let suites = match &self.cipher_suites {
      Some(s) => s.len().to_string(),
      None => "all enabled".to_string(),
    };
    write!(
      f,
      "ConnectionSpec({}, tlsVersions=[{}], cipherSuites={}, supportsTlsExtensions={})",
      self.name, versions, suites, self.supports_tls_extensions
    )
  }
}

impl TryFrom<&str> for ConnectionSpec {
  type Error = BuildError;
  fn try_from(value: &str) -> Result<Self, Self::Error> {
    match value {
      "restricted" => Ok(Self::restricted_tls()),
      "modern" => Ok(Self::modern_tls()),
      "compatible" => Ok(Self::compatible_tls()),
      "cleartext" => Ok(Self::cleartext()),
      _ => Err(BuildError::InvalidConnectionSpec(value.to_string())),
    }
  }
}

/* ---------------------------------------------------------- */
/// Builder for custom connection specs
#[derive(Debug, Clone)]
pub struct ConnectionSpecBuilder {
  spec: ConnectionSpec,
}

impl ConnectionSpecBuilder {
  /// Start a TLS spec with every enabled version and cipher suite
  pub fn tls(name: &str) -> Self {
    Self {
      spec: ConnectionSpec {
        name: name.to_string(),
        tls: true,
        cipher_suites: None,
        tls_versions: None,
        supports_tls_extensions: false,
        fallback: false,
      },
    }
  }

  /// Start from an existing spec under a new name
  pub fn from_spec(name: &str, spec: &ConnectionSpec) -> Self {
    let mut spec = spec.clone();
    spec.name = name.to_string();
    Self { spec }
  }

  pub fn with_cipher_suites(mut self, cipher_suites: &[CipherSuite]) -> Result<Self, BuildError> {
    self.ensure_tls("cipher suites")?;
    if cipher_suites.is_empty() {
      return Err(BuildError::InvalidConnectionSpec(
        "At least one cipher suite is required".to_string(),
      ));
    }
    self.spec.cipher_suites = Some(cipher_suites.to_vec());
    Ok(self)
  }

  pub fn with_all_enabled_cipher_suites(mut self) -> Self {
    self.spec.cipher_suites = None;
    self
  }

  pub fn with_tls_versions(mut self, tls_versions: &[TlsVersion]) -> Result<Self, BuildError> {
    self.ensure_tls("TLS versions")?;
    if tls_versions.is_empty() {
      return Err(BuildError::InvalidConnectionSpec(
        "At least one TLS version is required".to_string(),
      ));
    }
    self.spec.tls_versions = Some(tls_versions.to_vec());
    Ok(self)
  }

  pub fn with_all_enabled_tls_versions(mut self) -> Self {
    self.spec.tls_versions = None;
    self
  }

  pub fn with_tls_extensions(mut self, supported: bool) -> Result<Self, BuildError> {
    self.ensure_tls("TLS extensions")?;
    self.spec.supports_tls_extensions = supported;
    Ok(self)
  }

  /// Mark the spec as a reduced-compatibility fallback mode
  pub fn with_fallback(mut self, fallback: bool) -> Self {
    self.spec.fallback = fallback;
    self
  }

  pub fn build(self) -> ConnectionSpec {
    self.spec
  }

  fn ensure_tls(&self, what: &str) -> Result<(), BuildError> {
    if !self.spec.tls {
      return Err(BuildError::InvalidConnectionSpec(format!(
        "No {what} for cleartext connections"
      )));
    }
    Ok(())
  }
}
