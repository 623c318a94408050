use crate::{address::Address, proxy::Proxy, target::TargetAddr};
use std::{fmt, sync::Arc};

/// A concrete path to the origin server: the address, the proxy to go through, and the socket target to dial.
///
/// For direct and HTTP proxy routes the target is a resolved socket address (of the origin and of the proxy
/// respectively). For SOCKS routes it is the unresolved origin host, which the proxy resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
  address: Arc<Address>,
  proxy: Proxy,
  target: TargetAddr,
}

impl Route {
  pub fn new(address: Arc<Address>, proxy: Proxy, target: TargetAddr) -> Self {
    Self { address, proxy, target }
  }

  pub fn address(&self) -> &Arc<Address> {
    &self.address
  }

  pub fn proxy(&self) -> &Proxy {
    &self.proxy
  }

  /// Socket target of the route
  pub fn target(&self) -> &TargetAddr {
    &self.target
  }

  /// Where the TCP connection is opened: the proxy server for proxied routes, otherwise the target
  pub fn dial_target(&self) -> &TargetAddr {
    match &self.proxy {
      Proxy::Socks(addr) => addr,
      Proxy::Direct | Proxy::Http(_) => &self.target,
    }
  }

  /// Whether the route tunnels TLS through an HTTP proxy with CONNECT
  pub fn requires_tunnel(&self) -> bool {
    self.address.is_tls() && matches!(self.proxy, Proxy::Http(_))
  }
}

impl fmt::Display for Route {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.proxy {
      Proxy::Direct => write!(f, "{} at {}", self.address, self.target),
      proxy => write!(f, "{} via {} at {}", self.address, proxy, self.target),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::address::Scheme;

  #[test]
  fn test_requires_tunnel() {
    let https = Arc::new(Address::try_new("example.com", 443, Scheme::Https).unwrap());
    let http = Arc::new(Address::try_new("example.com", 80, Scheme::Http).unwrap());
    let proxy: Proxy = "http://127.0.0.1:3128".parse().unwrap();
    let target = TargetAddr::Socket("127.0.0.1:3128".parse().unwrap());

    assert!(Route::new(https.clone(), proxy.clone(), target.clone()).requires_tunnel());
    assert!(!Route::new(http, proxy, target.clone()).requires_tunnel());
    assert!(!Route::new(https, Proxy::Direct, target).requires_tunnel());
  }

  #[test]
  fn test_socks_route_dials_proxy() {
    let address = Arc::new(Address::try_new("example.com", 443, Scheme::Https).unwrap());
    let proxy: Proxy = "socks5://127.0.0.1:1080".parse().unwrap();
    let route = Route::new(address, proxy, TargetAddr::Domain("example.com".to_string(), 443));
    assert_eq!(route.dial_target().to_string(), "127.0.0.1:1080");
    assert_eq!(
      route.to_string(),
      "example.com:443 via socks5://127.0.0.1:1080 at example.com:443"
    );
  }
}
