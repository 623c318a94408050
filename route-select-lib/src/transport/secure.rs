use crate::{
  failure::{ConnectFailure, FailureCategory},
  tls::{CipherSuite, ConnectionSpec, SecureSocket, TlsVersion},
  trace::*,
};
use rustls::{
  ClientConfig, RootCertStore, SupportedProtocolVersion,
  crypto::{CryptoProvider, ring},
  pki_types::ServerName,
};
use std::{io, sync::Arc};

/// Protocol versions implemented by rustls
const RUSTLS_PROTOCOLS: &[TlsVersion] = &[TlsVersion::Tls13, TlsVersion::Tls12];

/// Secure socket configuration collected before a rustls handshake.
///
/// rustls has no knob for `TLS_FALLBACK_SCSV` and never downgrades below TLS 1.2, so the signalling suite is not
/// reported as supported.
#[derive(Debug, Clone)]
pub struct RustlsSocket {
  server_name: ServerName<'static>,
  supported_cipher_suites: Vec<CipherSuite>,
  enabled_cipher_suites: Vec<CipherSuite>,
  enabled_protocols: Vec<TlsVersion>,
}

impl RustlsSocket {
  pub(super) fn new(server_name: ServerName<'static>) -> Self {
    let supported_cipher_suites: Vec<CipherSuite> = ring::default_provider()
      .cipher_suites
      .iter()
      .filter_map(|suite| CipherSuite::from_code(u16::from(suite.suite())))
      .collect();
    Self {
      server_name,
      enabled_cipher_suites: supported_cipher_suites.clone(),
      supported_cipher_suites,
      enabled_protocols: RUSTLS_PROTOCOLS.to_vec(),
    }
  }

  pub(super) fn server_name(&self) -> &ServerName<'static> {
    &self.server_name
  }

  /// Client config restricted to the enabled protocols and cipher suites
  pub(super) fn client_config(
    &self,
    roots: &Arc<RootCertStore>,
    alpn_protocols: &[Vec<u8>],
    connection_spec: &ConnectionSpec,
  ) -> Result<ClientConfig, ConnectFailure> {
    let base = ring::default_provider();
    let cipher_suites = base
      .cipher_suites
      .iter()
      .filter(|suite| {
        CipherSuite::from_code(u16::from(suite.suite())).is_some_and(|s| self.enabled_cipher_suites.contains(&s))
      })
      .copied()
      .collect::<Vec<_>>();
    let provider = CryptoProvider { cipher_suites, ..base };

    let versions: Vec<&'static SupportedProtocolVersion> = self
      .enabled_protocols
      .iter()
      .filter_map(|version| match version {
        TlsVersion::Tls13 => Some(&rustls::version::TLS13),
        TlsVersion::Tls12 => Some(&rustls::version::TLS12),
        _ => None,
      })
      .collect();
    if versions.is_empty() {
      return Err(ConnectFailure::other(
        FailureCategory::Handshake,
        format!("No protocol version shared with {:?}", self.enabled_protocols),
      ));
    }

    let mut config = ClientConfig::builder_with_provider(Arc::new(provider))
      .with_protocol_versions(&versions)
      .map_err(|e| ConnectFailure::new(FailureCategory::Handshake, io::Error::other(e)))?
      .with_root_certificates(roots.clone())
      .with_no_client_auth();

    // SNI and ALPN are TLS extensions
    config.enable_sni = connection_spec.supports_tls_extensions();
    if connection_spec.supports_tls_extensions() {
      config.alpn_protocols = alpn_protocols.to_vec();
    }
    Ok(config)
  }
}

impl SecureSocket for RustlsSocket {
  fn enabled_protocols(&self) -> &[TlsVersion] {
    &self.enabled_protocols
  }

  fn enabled_cipher_suites(&self) -> &[CipherSuite] {
    &self.enabled_cipher_suites
  }

  fn supported_cipher_suites(&self) -> &[CipherSuite] {
    &self.supported_cipher_suites
  }

  fn set_enabled_protocols(&mut self, protocols: &[TlsVersion]) {
    self.enabled_protocols = protocols
      .iter()
      .filter(|v| RUSTLS_PROTOCOLS.contains(v))
      .copied()
      .collect();
  }

  fn set_enabled_cipher_suites(&mut self, cipher_suites: &[CipherSuite]) {
    self.enabled_cipher_suites = cipher_suites
      .iter()
      .filter(|s| self.supported_cipher_suites.contains(s))
      .copied()
      .collect();
  }
}

/// Classify an error returned by a TLS handshake
pub(super) fn classify_tls_error(err: io::Error) -> ConnectFailure {
  let category = match err.get_ref().and_then(|e| e.downcast_ref::<rustls::Error>()) {
    Some(rustls::Error::InvalidCertificate(_)) => FailureCategory::CertificateRejected,
    Some(rustls::Error::NoCertificatesPresented) => FailureCategory::PeerUnverified,
    Some(
      rustls::Error::InvalidMessage(_)
      | rustls::Error::PeerMisbehaved(_)
      | rustls::Error::InappropriateMessage { .. }
      | rustls::Error::InappropriateHandshakeMessage { .. },
    ) => FailureCategory::Protocol,
    Some(e) => {
      trace!("Generic TLS failure: {e}");
      FailureCategory::Handshake
    }
    // Peer hung up mid handshake, typically rejecting the offered versions or suites
    None if matches!(
      err.kind(),
      io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    ) =>
    {
      FailureCategory::Handshake
    }
    None => FailureCategory::of_io_error(&err),
  };
  ConnectFailure::new(category, err)
}

/// Root store of the Mozilla CA bundle
pub(super) fn webpki_root_store() -> RootCertStore {
  RootCertStore {
    roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
  }
}
