use crate::{error::BuildError, failure::ConnectFailure, target::TargetAddr, trace::*};
use dashmap::DashMap;
use std::{
  fmt,
  str::FromStr,
  sync::{Arc, LazyLock},
};

/* ---------------------------------------------------------- */
/// How a route reaches its target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Proxy {
  /// Connect to the target directly
  Direct,
  /// HTTP proxy; TLS targets are reached through a CONNECT tunnel
  Http(TargetAddr),
  /// SOCKS5 proxy; the proxy resolves the target host name
  Socks(TargetAddr),
}

impl Proxy {
  pub fn is_direct(&self) -> bool {
    matches!(self, Proxy::Direct)
  }
}

impl fmt::Display for Proxy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Proxy::Direct => write!(f, "direct"),
      Proxy::Http(addr) => write!(f, "http://{addr}"),
      Proxy::Socks(addr) => write!(f, "socks5://{addr}"),
    }
  }
}

impl FromStr for Proxy {
  type Err = BuildError;

  /// Parses `direct`, `http://host:port`, `socks5://host:port` or `socks://host:port`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("direct") {
      return Ok(Proxy::Direct);
    }
    let Some((scheme, rest)) = s.split_once("://") else {
      return Err(BuildError::InvalidProxy(format!("Missing proxy scheme: {s}")));
    };
    let addr = rest
      .trim_end_matches('/')
      .parse::<TargetAddr>()
      .map_err(|e| BuildError::InvalidProxy(format!("{s}: {e}")))?;
    if addr.port() == 0 {
      return Err(BuildError::InvalidProxy(format!("Proxy port must not be zero: {s}")));
    }
    match scheme.to_ascii_lowercase().as_str() {
      "http" => Ok(Proxy::Http(addr)),
      "socks" | "socks5" => Ok(Proxy::Socks(addr)),
      _ => Err(BuildError::InvalidProxy(format!("Unsupported proxy scheme: {scheme}"))),
    }
  }
}

/* ---------------------------------------------------------- */
/// Proxy resolution policy of an address
pub trait ProxySelector: Send + Sync {
  /// Proxies to try for the given address URI, in order. An empty list means a direct connection.
  fn select(&self, uri: &str) -> Vec<Proxy>;

  /// Notification that connecting through `proxy` failed. Never called for [Proxy::Direct].
  fn connect_failed(&self, uri: &str, proxy: &Proxy, failure: &ConnectFailure);
}

/// Always connects directly
#[derive(Debug, Default, Clone)]
pub struct NoProxySelector;

static NO_PROXY_SELECTOR: LazyLock<Arc<dyn ProxySelector>> = LazyLock::new(|| Arc::new(NoProxySelector));

impl NoProxySelector {
  /// Process-wide handle. Addresses compare proxy selectors by identity, so every default address uses this one.
  pub fn shared() -> Arc<dyn ProxySelector> {
    NO_PROXY_SELECTOR.clone()
  }
}

impl ProxySelector for NoProxySelector {
  fn select(&self, _uri: &str) -> Vec<Proxy> {
    vec![Proxy::Direct]
  }

  fn connect_failed(&self, _uri: &str, _proxy: &Proxy, _failure: &ConnectFailure) {}
}

/// Returns the same list of proxies for every address
#[derive(Debug, Clone)]
pub struct StaticProxySelector {
  proxies: Vec<Proxy>,
}

impl StaticProxySelector {
  pub fn new(proxies: Vec<Proxy>) -> Self {
    Self { proxies }
  }
}

impl ProxySelector for StaticProxySelector {
  fn select(&self, _uri: &str) -> Vec<Proxy> {
    self.proxies.clone()
  }

  fn connect_failed(&self, uri: &str, proxy: &Proxy, failure: &ConnectFailure) {
    debug!("Connecting to {uri} through {proxy} failed: {failure}");
  }
}

/// Orders a fixed proxy list by how often each proxy failed, so proxies with fewer failures come first.
/// The sort is stable: proxies with the same failure count keep their configured order.
#[derive(Debug)]
pub struct RankedProxySelector {
  proxies: Vec<Proxy>,
  failures: Arc<DashMap<Proxy, usize, ahash::RandomState>>,
}

impl RankedProxySelector {
  pub fn new(proxies: Vec<Proxy>) -> Self {
    Self {
      proxies,
      failures: Arc::new(DashMap::default()),
    }
  }

  /// Selector over another proxy list that shares failure counts with this one
  pub fn with_proxies(&self, proxies: Vec<Proxy>) -> Self {
    Self {
      proxies,
      failures: self.failures.clone(),
    }
  }

  /// Number of failures recorded for the proxy
  pub fn failure_count(&self, proxy: &Proxy) -> usize {
    self.failures.get(proxy).map(|count| *count).unwrap_or(0)
  }
}

impl ProxySelector for RankedProxySelector {
  fn select(&self, _uri: &str) -> Vec<Proxy> {
    let mut proxies = self.proxies.clone();
    proxies.sort_by_key(|proxy| self.failure_count(proxy));
    proxies
  }

  fn connect_failed(&self, uri: &str, proxy: &Proxy, failure: &ConnectFailure) {
    let mut count = self.failures.entry(proxy.clone()).or_insert(0);
    *count += 1;
    debug!("Connecting to {uri} through {proxy} failed ({} failures): {failure}", *count);
  }
}
