mod secure;
mod socket;
mod tunnel;

use crate::{
  constants::DEFAULT_ALPN_PROTOCOLS,
  failure::{ConnectFailure, FailureCategory},
  finder::Transport,
  proxy::Proxy,
  route::Route,
  tls::ConnectionSpec,
  trace::*,
};
use rustls::{RootCertStore, pki_types::ServerName};
use socket::connect_tcp_target;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::{TlsConnector, client::TlsStream};
use tunnel::{http_tunnel, socks5_connect};

pub use secure::RustlsSocket;

/// [Transport] over tokio TCP sockets with rustls for TLS
#[derive(Debug, Clone)]
pub struct TokioTransport {
  roots: Arc<RootCertStore>,
  alpn_protocols: Vec<Vec<u8>>,
}

impl Default for TokioTransport {
  fn default() -> Self {
    Self::new()
  }
}

impl TokioTransport {
  /// Transport trusting the webpki root certificates
  pub fn new() -> Self {
    Self::with_root_store(secure::webpki_root_store())
  }

  /// Transport trusting the given root certificates
  pub fn with_root_store(roots: RootCertStore) -> Self {
    Self {
      roots: Arc::new(roots),
      alpn_protocols: DEFAULT_ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect(),
    }
  }

  /// Override the ALPN protocols offered when a connection spec supports TLS extensions
  pub fn with_alpn_protocols(mut self, alpn_protocols: Vec<Vec<u8>>) -> Self {
    self.alpn_protocols = alpn_protocols;
    self
  }
}

#[async_trait::async_trait]
impl Transport for TokioTransport {
  type Stream = TcpStream;
  type PendingTls = RustlsSocket;
  type TlsStream = TlsStream<TcpStream>;

  async fn connect(&self, route: &Route) -> Result<Self::Stream, ConnectFailure> {
    let mut stream = connect_tcp_target(route.dial_target()).await?;
    match route.proxy() {
      Proxy::Socks(_) => socks5_connect(&mut stream, route.target()).await?,
      Proxy::Http(_) if route.requires_tunnel() => http_tunnel(&mut stream, route.address()).await?,
      Proxy::Http(_) | Proxy::Direct => {}
    }
    trace!("Socket connected for {route}");
    Ok(stream)
  }

  fn start_tls(&self, route: &Route) -> Result<Self::PendingTls, ConnectFailure> {
    let host = route.address().host().to_string();
    let server_name = ServerName::try_from(host)
      .map_err(|e| ConnectFailure::other(FailureCategory::PeerUnverified, e.to_string()))?;
    Ok(RustlsSocket::new(server_name))
  }

  async fn handshake(
    &self,
    stream: Self::Stream,
    tls: Self::PendingTls,
    route: &Route,
    connection_spec: &ConnectionSpec,
  ) -> Result<Self::TlsStream, ConnectFailure> {
    let config = tls.client_config(&self.roots, &self.alpn_protocols, connection_spec)?;
    let connector = TlsConnector::from(Arc::new(config));
    let tls_stream = connector
      .connect(tls.server_name().clone(), stream)
      .await
      .map_err(secure::classify_tls_error)?;

    let (_, session) = tls_stream.get_ref();
    debug!(
      "TLS established for {route}: {:?} {:?}",
      session.protocol_version(),
      session.negotiated_cipher_suite().map(|s| s.suite())
    );
    Ok(tls_stream)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    address::{Address, AddressBuilder, Scheme},
    target::TargetAddr,
  };
  use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
  };

  fn https_address() -> Arc<Address> {
    Arc::new(Address::try_new("example.com", 443, Scheme::Https).unwrap())
  }

  #[tokio::test]
  async fn test_direct_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let route = Route::new(https_address(), Proxy::Direct, TargetAddr::Socket(addr));

    let transport = TokioTransport::new();
    let stream = transport.connect(&route).await.unwrap();
    assert_eq!(stream.peer_addr().unwrap(), addr);
  }

  #[tokio::test]
  async fn test_connect_through_http_proxy_tunnel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let proxy_task = tokio::spawn(async move {
      let (mut stream, _) = listener.accept().await.unwrap();
      let mut request = Vec::new();
      while !request.ends_with(b"\r\n\r\n") {
        request.push(stream.read_u8().await.unwrap());
      }
      stream
        .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
        .await
        .unwrap();
      String::from_utf8(request).unwrap()
    });

    let proxy = Proxy::Http(TargetAddr::Socket(addr));
    let route = Route::new(https_address(), proxy, TargetAddr::Socket(addr));
    assert!(route.requires_tunnel());
    TokioTransport::new().connect(&route).await.unwrap();
    assert!(proxy_task.await.unwrap().starts_with("CONNECT example.com:443 HTTP/1.1"));
  }

  #[tokio::test]
  async fn test_plain_http_proxy_needs_no_tunnel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let address = Arc::new(Address::try_new("example.com", 80, Scheme::Http).unwrap());
    let route = Route::new(address, Proxy::Http(TargetAddr::Socket(addr)), TargetAddr::Socket(addr));
    let stream = TokioTransport::new().connect(&route).await.unwrap();
    assert_eq!(stream.peer_addr().unwrap(), addr);
  }

  #[tokio::test]
  async fn test_handshake_with_non_tls_server_is_protocol_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut stream, _) = listener.accept().await.unwrap();
      let mut buf = [0u8; 1024];
      let _ = stream.read(&mut buf).await;
      let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
      let _ = stream.read(&mut buf).await;
    });

    let address = Arc::new(
      AddressBuilder::default()
        .host("localhost")
        .port(addr.port())
        .build()
        .unwrap(),
    );
    let route = Route::new(address, Proxy::Direct, TargetAddr::Socket(addr));
    let transport = TokioTransport::new();
    let stream = transport.connect(&route).await.unwrap();
    let mut tls = transport.start_tls(&route).unwrap();
    let spec = ConnectionSpec::modern_tls();
    spec.apply(&mut tls, false);
    let failure = transport.handshake(stream, tls, &route, &spec).await.unwrap_err();
    assert_eq!(failure.category(), FailureCategory::Protocol);
  }
}
