use crate::{
  address::{Address, AddressBuilder, Scheme},
  constants::DEFAULT_CONNECT_TIMEOUT_MSEC,
  dns::AddressResolver,
  error::BuildError,
  proxy::{NoProxySelector, Proxy, ProxySelector, RankedProxySelector},
  tls::ConnectionSpec,
};
use std::{collections::HashMap, sync::Arc, time::Duration};

pub mod builder;
pub mod validation;

pub use builder::{ConfigBuilder, DestinationConfigBuilder};
pub use validation::ConfigValidationError;

/* ---------------------------------------------------------- */
#[derive(Debug, Clone, PartialEq, Eq, derive_builder::Builder)]
/// Options applied to every connection attempt of a finder
pub struct ConnectOptions {
  #[builder(default = "Some(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MSEC))")]
  /// Bound of each connect step (TCP connect, proxy handshake, TLS handshake); `None` waits forever
  connect_timeout: Option<Duration>,

  #[builder(default = "true")]
  /// Whether to try other connection specs and routes after a failure
  retry_on_connection_failure: bool,
}

impl Default for ConnectOptions {
  fn default() -> Self {
    Self {
      connect_timeout: Some(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MSEC)),
      retry_on_connection_failure: true,
    }
  }
}

impl ConnectOptions {
  pub fn connect_timeout(&self) -> Option<Duration> {
    self.connect_timeout
  }

  pub fn retry_on_connection_failure(&self) -> bool {
    self.retry_on_connection_failure
  }
}

/* ---------------------------------------------------------- */
/// Destinations and the options used to connect to them
#[derive(Debug)]
pub struct Config {
  /// Options shared by all destinations
  pub options: ConnectOptions,
  /// Destinations to connect to, in configured order
  pub destinations: Vec<DestinationConfig>,
}

impl Config {
  /// Addresses of all destinations in configured order. Destinations listing several proxies share one
  /// [ProxySelectors] ranking.
  pub fn addresses(&self, resolver: Arc<dyn AddressResolver>) -> Result<Vec<Arc<Address>>, BuildError> {
    let mut proxy_selectors = ProxySelectors::new();
    self
      .destinations
      .iter()
      .map(|destination| {
        let address = destination.to_address(resolver.clone(), &mut proxy_selectors)?;
        Ok(Arc::new(address))
      })
      .collect()
  }
}

/// Proxy selectors handed out to the destinations of a config.
///
/// Every multi-proxy list gets a [RankedProxySelector] sharing failure counts with the others, so a proxy that failed
/// for one destination is tried last by the rest. Equal lists get the same selector.
pub struct ProxySelectors {
  ranking: RankedProxySelector,
  by_proxies: HashMap<Vec<Proxy>, Arc<dyn ProxySelector>>,
}

impl Default for ProxySelectors {
  fn default() -> Self {
    Self {
      ranking: RankedProxySelector::new(vec![]),
      by_proxies: HashMap::new(),
    }
  }
}

impl ProxySelectors {
  pub fn new() -> Self {
    Self::default()
  }

  /// Selector for the proxy list, [NoProxySelector] when the list is empty
  pub fn get(&mut self, proxies: &[Proxy]) -> Arc<dyn ProxySelector> {
    if proxies.is_empty() {
      return NoProxySelector::shared();
    }
    let ranking = &self.ranking;
    self
      .by_proxies
      .entry(proxies.to_vec())
      .or_insert_with(|| Arc::new(ranking.with_proxies(proxies.to_vec())))
      .clone()
  }
}

/// Destination specific configuration
#[derive(Debug, Clone)]
pub struct DestinationConfig {
  /// Name of the destination, unique within a config
  pub name: String,
  pub host: String,
  pub port: u16,
  pub scheme: Scheme,
  /// Proxies in order of preference, empty for direct connections
  pub proxies: Vec<Proxy>,
  /// Connection specs in order of preference
  pub connection_specs: Vec<ConnectionSpec>,
}

impl DestinationConfig {
  /// Build the address of this destination.
  ///
  /// A single proxy becomes the explicit proxy of the address. Several proxies go through the ranked selector of
  /// `proxy_selectors`, so that failing proxies are tried later by subsequent attempts.
  pub fn to_address(
    &self,
    resolver: Arc<dyn AddressResolver>,
    proxy_selectors: &mut ProxySelectors,
  ) -> Result<Address, BuildError> {
    let mut builder = AddressBuilder::default();
    builder
      .host(self.host.as_str())
      .port(self.port)
      .scheme(self.scheme)
      .connection_specs(self.connection_specs.clone())
      .resolver(resolver);

    match self.proxies.as_slice() {
      [proxy] => {
        builder.proxy(proxy.clone());
      }
      proxies => {
        builder.proxy_selector(proxy_selectors.get(proxies));
      }
    }

    let address = builder.build()?;
    Ok(address)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    dns::MockResolver,
    failure::{ConnectFailure, FailureCategory},
  };

  #[test]
  fn test_connect_options_defaults() {
    let options = ConnectOptionsBuilder::default().build().unwrap();
    assert_eq!(options, ConnectOptions::default());
    assert_eq!(options.connect_timeout(), Some(Duration::from_secs(10)));
    assert!(options.retry_on_connection_failure());

    let options = ConnectOptionsBuilder::default()
      .connect_timeout(None)
      .retry_on_connection_failure(false)
      .build()
      .unwrap();
    assert_eq!(options.connect_timeout(), None);
    assert!(!options.retry_on_connection_failure());
  }

  fn destination(name: &str, proxies: &[&str]) -> DestinationConfig {
    DestinationConfig {
      name: name.to_string(),
      host: format!("{name}.example.com"),
      port: 443,
      scheme: Scheme::Https,
      proxies: proxies.iter().map(|proxy| proxy.parse().unwrap()).collect(),
      connection_specs: ConnectionSpec::default_specs(),
    }
  }

  #[test]
  fn test_destination_to_address() {
    let resolver: Arc<dyn AddressResolver> = Arc::new(MockResolver::new());
    let mut proxy_selectors = ProxySelectors::new();
    let mut destination = DestinationConfig {
      name: "example".to_string(),
      host: "example.com".to_string(),
      port: 443,
      scheme: Scheme::Https,
      proxies: vec![],
      connection_specs: vec![ConnectionSpec::modern_tls()],
    };
    let address = destination.to_address(resolver.clone(), &mut proxy_selectors).unwrap();
    assert!(address.proxy().is_none());
    assert_eq!(address.proxy_selector().select(&address.uri()), vec![Proxy::Direct]);

    let proxy: Proxy = "http://proxy.example:3128".parse().unwrap();
    destination.proxies = vec![proxy.clone()];
    let address = destination.to_address(resolver.clone(), &mut proxy_selectors).unwrap();
    assert_eq!(address.proxy(), Some(&proxy));

    destination.proxies = vec![proxy.clone(), Proxy::Direct];
    let address = destination.to_address(resolver, &mut proxy_selectors).unwrap();
    assert!(address.proxy().is_none());
    assert_eq!(address.proxy_selector().select(&address.uri()), vec![proxy, Proxy::Direct]);
  }

  #[test]
  fn test_failed_proxy_is_ranked_last_for_other_destinations() {
    let config = Config {
      options: ConnectOptions::default(),
      destinations: vec![
        destination("a", &["http://proxy1.example:3128", "http://proxy2.example:3128"]),
        destination("b", &["http://proxy1.example:3128", "http://proxy2.example:3128", "direct"]),
        destination("c", &["http://proxy1.example:3128", "http://proxy2.example:3128"]),
      ],
    };
    let addresses = config.addresses(Arc::new(MockResolver::new())).unwrap();
    assert_eq!(addresses.len(), 3);
    assert_eq!(addresses[0].host(), "a.example.com");
    assert!(Arc::ptr_eq(addresses[0].proxy_selector(), addresses[2].proxy_selector()));

    let proxy1: Proxy = "http://proxy1.example:3128".parse().unwrap();
    let proxy2: Proxy = "http://proxy2.example:3128".parse().unwrap();
    let failure = ConnectFailure::other(FailureCategory::Io, "connection refused");
    addresses[0]
      .proxy_selector()
      .connect_failed(&addresses[0].uri(), &proxy1, &failure);

    let b = &addresses[1];
    assert_eq!(
      b.proxy_selector().select(&b.uri()),
      vec![proxy2.clone(), Proxy::Direct, proxy1.clone()]
    );
    let c = &addresses[2];
    assert_eq!(c.proxy_selector().select(&c.uri()), vec![proxy2, proxy1]);
  }

  #[test]
  fn test_direct_destinations_share_default_selector() {
    let mut proxy_selectors = ProxySelectors::new();
    let resolver: Arc<dyn AddressResolver> = Arc::new(MockResolver::new());
    let first = destination("a", &[]).to_address(resolver.clone(), &mut proxy_selectors).unwrap();
    let again = destination("a", &[]).to_address(resolver, &mut proxy_selectors).unwrap();
    assert_eq!(first, again);
  }
}
