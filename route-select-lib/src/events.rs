use crate::{failure::ConnectFailure, route::Route, tls::ConnectionSpec, trace::*};
use std::net::IpAddr;

/// Sink for connection lifecycle events. Every method defaults to a no-op.
pub trait EventListener: Send + Sync {
  /// Invoked before a host name lookup. Not invoked for IP literals or SOCKS routes.
  fn dns_start(&self, _host: &str) {}

  /// Invoked after a successful lookup with the addresses in the order they will be tried
  fn dns_end(&self, _host: &str, _addresses: &[IpAddr]) {}

  fn connect_start(&self, _route: &Route) {}

  fn secure_connect_start(&self, _route: &Route) {}

  fn secure_connect_end(&self, _route: &Route, _connection_spec: &ConnectionSpec) {}

  fn connect_end(&self, _route: &Route) {}

  fn connect_failed(&self, _route: &Route, _failure: &ConnectFailure) {}
}

/// Discards every event
#[derive(Debug, Default, Clone)]
pub struct NoopEventListener;

impl EventListener for NoopEventListener {}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone)]
pub struct TracingEventListener;

impl EventListener for TracingEventListener {
  fn dns_start(&self, host: &str) {
    trace!("DNS lookup started: {host}");
  }

  fn dns_end(&self, host: &str, addresses: &[IpAddr]) {
    debug!("DNS lookup finished: {host} -> {addresses:?}");
  }

  fn connect_start(&self, route: &Route) {
    debug!("Connecting: {route}");
  }

  fn secure_connect_start(&self, route: &Route) {
    trace!("TLS handshake started: {route}");
  }

  fn secure_connect_end(&self, route: &Route, connection_spec: &ConnectionSpec) {
    debug!("TLS handshake finished with {}: {route}", connection_spec.name());
  }

  fn connect_end(&self, route: &Route) {
    info!("Connected: {route}");
  }

  fn connect_failed(&self, route: &Route, failure: &ConnectFailure) {
    warn!("Connect failed: {route}: {}: {}", failure.category(), failure.io_error());
  }
}
