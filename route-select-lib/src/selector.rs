use crate::{
  address::Address,
  error::RouteSelectError,
  events::EventListener,
  failure::ConnectFailure,
  ledger::RouteLedger,
  proxy::Proxy,
  route::Route,
  target::TargetAddr,
  trace::*,
};
use std::{
  net::{IpAddr, SocketAddr},
  sync::Arc,
};

/* ---------------------------------------------------------- */
/// Ordered batch of routes returned by one [RouteSelector::next] call
#[derive(Debug, Clone)]
pub struct Selection {
  routes: Vec<Route>,
  next_index: usize,
}

impl Selection {
  fn new(routes: Vec<Route>) -> Self {
    Self { routes, next_index: 0 }
  }

  /// Whether a route of this batch has not been handed out yet
  pub fn has_next(&self) -> bool {
    self.next_index < self.routes.len()
  }

  /// Every route of the batch, including the ones already handed out
  pub fn all(&self) -> &[Route] {
    &self.routes
  }

  pub fn len(&self) -> usize {
    self.routes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.routes.is_empty()
  }
}

impl Iterator for Selection {
  type Item = Route;

  fn next(&mut self) -> Option<Self::Item> {
    let route = self.routes.get(self.next_index)?.clone();
    self.next_index += 1;
    Some(route)
  }
}

/* ---------------------------------------------------------- */
/// Position in the proxy list of the address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyCursor {
  /// The proxy at this index has not been resolved yet
  Next(usize),
  /// Every proxy has been resolved
  Done,
}

/// Generates batches of routes to an address, one proxy at a time.
///
/// Routes that the ledger marks as recently failed are held back and only handed out once every proxy has been
/// scanned without finding a fresh route. The first proxy yielding a fresh route ends the scan of a `next()`
/// call, even when later proxies might have more routes.
pub struct RouteSelector {
  address: Arc<Address>,
  ledger: Arc<dyn RouteLedger>,
  events: Arc<dyn EventListener>,
  /// Proxies to try, queried once at construction
  proxies: Vec<Proxy>,
  cursor: ProxyCursor,
  /// Routes held back because the ledger marked them
  postponed: Vec<Route>,
}

impl RouteSelector {
  pub fn new(address: Arc<Address>, ledger: Arc<dyn RouteLedger>, events: Arc<dyn EventListener>) -> Self {
    let proxies = match address.proxy() {
      Some(proxy) => vec![proxy.clone()],
      None => {
        let selected = address.proxy_selector().select(&address.uri());
        if selected.is_empty() {
          vec![Proxy::Direct]
        } else {
          selected
        }
      }
    };
    debug!("Proxies for {}: {:?}", address.uri(), proxies);
    let cursor = if proxies.is_empty() {
      ProxyCursor::Done
    } else {
      ProxyCursor::Next(0)
    };
    Self {
      address,
      ledger,
      events,
      proxies,
      cursor,
      postponed: Vec::new(),
    }
  }

  pub fn address(&self) -> &Arc<Address> {
    &self.address
  }

  /// Returns true if there's another set of routes to attempt
  pub fn has_next(&self) -> bool {
    self.has_next_proxy() || !self.postponed.is_empty()
  }

  fn has_next_proxy(&self) -> bool {
    matches!(self.cursor, ProxyCursor::Next(_))
  }

  /// Produce the next batch of routes.
  ///
  /// A resolution failure of a proxy is returned as an error after the cursor moved past that proxy, so the caller
  /// may keep calling `next()` while `has_next()` is true.
  pub async fn next(&mut self) -> Result<Selection, RouteSelectError> {
    if !self.has_next() {
      return Err(RouteSelectError::Exhausted);
    }

    let mut routes = Vec::new();
    while let ProxyCursor::Next(index) = self.cursor {
      self.cursor = if index + 1 < self.proxies.len() {
        ProxyCursor::Next(index + 1)
      } else {
        ProxyCursor::Done
      };
      let proxy = self.proxies[index].clone();
      let targets = self.resolve_targets(&proxy).await?;

      for target in targets {
        let route = Route::new(self.address.clone(), proxy.clone(), target);
        if self.ledger.should_postpone(&route) {
          trace!("Postponing recently failed route: {route}");
          self.postponed.push(route);
        } else {
          routes.push(route);
        }
      }
      if !routes.is_empty() {
        break;
      }
    }

    if routes.is_empty() {
      // Every proxy is exhausted, give the failed routes another try
      debug!("No fresh route to {}, retrying {} postponed routes", self.address, self.postponed.len());
      routes = std::mem::take(&mut self.postponed);
    }
    Ok(Selection::new(routes))
  }

  /// Socket targets of the proxy, in resolver order
  async fn resolve_targets(&self, proxy: &Proxy) -> Result<Vec<TargetAddr>, RouteSelectError> {
    let (host, port) = match proxy {
      Proxy::Direct | Proxy::Socks(_) => (self.address.host().to_string(), self.address.port()),
      Proxy::Http(addr) => (addr.host(), addr.port()),
    };
    if port == 0 {
      return Err(RouteSelectError::InvalidPort { host, port });
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
      return Ok(vec![TargetAddr::Socket(SocketAddr::new(ip, port))]);
    }
    if let Proxy::Socks(_) = proxy {
      // The SOCKS proxy resolves the name
      return Ok(vec![TargetAddr::Domain(host, port)]);
    }

    self.events.dns_start(&host);
    let ips = self.address.resolver().lookup(&host).await?;
    if ips.is_empty() {
      return Err(RouteSelectError::UnresolvableHost(host));
    }
    self.events.dns_end(&host, &ips);

    Ok(ips.into_iter().map(|ip| TargetAddr::Socket(SocketAddr::new(ip, port))).collect())
  }

  /// Report a failed attempt on a route handed out by this selector
  pub fn connect_failed(&self, route: &Route, failure: &ConnectFailure) {
    if !route.proxy().is_direct() {
      self
        .address
        .proxy_selector()
        .connect_failed(&self.address.uri(), route.proxy(), failure);
    }
    self.ledger.failed(route);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    address::AddressBuilder,
    dns::{AddressResolver, MockResolver},
    events::NoopEventListener,
    failure::FailureCategory,
    ledger::RouteDatabase,
    proxy::{ProxySelector, StaticProxySelector},
  };
  use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  };

  #[derive(Default)]
  struct RecordingEvents {
    events: Mutex<Vec<String>>,
  }

  impl EventListener for RecordingEvents {
    fn dns_start(&self, host: &str) {
      self.events.lock().unwrap().push(format!("dns_start {host}"));
    }
    fn dns_end(&self, host: &str, addresses: &[IpAddr]) {
      self.events.lock().unwrap().push(format!("dns_end {host} {}", addresses.len()));
    }
  }

  #[derive(Default)]
  struct CountingProxySelector {
    proxies: Vec<Proxy>,
    selects: AtomicUsize,
    failed: Mutex<Vec<Proxy>>,
  }

  impl ProxySelector for CountingProxySelector {
    fn select(&self, _uri: &str) -> Vec<Proxy> {
      self.selects.fetch_add(1, Ordering::SeqCst);
      self.proxies.clone()
    }
    fn connect_failed(&self, _uri: &str, proxy: &Proxy, _failure: &ConnectFailure) {
      self.failed.lock().unwrap().push(proxy.clone());
    }
  }

  fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
  }

  /// Mock resolver from `(host, "ip,ip,...")` pairs
  fn resolver(entries: &[(&str, &str)]) -> Arc<dyn AddressResolver> {
    let mut resolver = MockResolver::new();
    for (host, ips) in entries {
      let ips = ips.split(',').filter(|s| !s.is_empty()).map(ip).collect();
      resolver.add_response(host, ips);
    }
    Arc::new(resolver)
  }

  fn two_proxy_address() -> Arc<Address> {
    let proxies = vec![
      "http://proxy1.example:3128".parse().unwrap(),
      "http://proxy2.example:3128".parse().unwrap(),
    ];
    let address = AddressBuilder::default()
      .host("example.com")
      .port(443)
      .proxy_selector(Arc::new(StaticProxySelector::new(proxies)) as Arc<dyn ProxySelector>)
      .resolver(resolver(&[
        ("proxy1.example", "10.0.0.1"),
        ("proxy2.example", "10.0.0.2"),
      ]))
      .build()
      .unwrap();
    Arc::new(address)
  }

  fn targets(selection: &Selection) -> Vec<String> {
    selection.all().iter().map(|r| r.target().to_string()).collect()
  }

  fn failure() -> ConnectFailure {
    ConnectFailure::other(FailureCategory::Io, "connection refused")
  }

  #[tokio::test]
  async fn test_fresh_route_of_later_proxy_wins_over_postponed() {
    let address = two_proxy_address();
    let ledger = Arc::new(RouteDatabase::new());
    let first_proxy: Proxy = "http://proxy1.example:3128".parse().unwrap();
    let failed = Route::new(address.clone(), first_proxy.clone(), TargetAddr::Socket("10.0.0.1:3128".parse().unwrap()));
    ledger.failed(&failed);

    let mut selector = RouteSelector::new(address, ledger, Arc::new(NoopEventListener));
    let selection = selector.next().await.unwrap();
    assert_eq!(targets(&selection), vec!["10.0.0.2:3128"]);
    assert_eq!(selection.all()[0].proxy().to_string(), "http://proxy2.example:3128");

    // The postponed route comes last
    assert!(selector.has_next());
    let selection = selector.next().await.unwrap();
    assert_eq!(selection.all(), &[failed]);
    assert!(!selector.has_next());
    assert!(matches!(selector.next().await, Err(RouteSelectError::Exhausted)));
  }

  #[tokio::test]
  async fn test_all_postponed_routes_are_returned_together() {
    let address = two_proxy_address();
    let ledger = Arc::new(RouteDatabase::new());
    for (proxy, target) in [
      ("http://proxy1.example:3128", "10.0.0.1:3128"),
      ("http://proxy2.example:3128", "10.0.0.2:3128"),
    ] {
      ledger.failed(&Route::new(
        address.clone(),
        proxy.parse().unwrap(),
        TargetAddr::Socket(target.parse().unwrap()),
      ));
    }

    let mut selector = RouteSelector::new(address, ledger, Arc::new(NoopEventListener));
    let selection = selector.next().await.unwrap();
    assert_eq!(targets(&selection), vec!["10.0.0.1:3128", "10.0.0.2:3128"]);
    assert!(selector.postponed.is_empty());
    assert!(!selector.has_next());
  }

  #[tokio::test]
  async fn test_every_fresh_route_is_returned_before_exhaustion() {
    let address = Arc::new(
      AddressBuilder::default()
        .host("example.com")
        .port(443)
        .resolver(resolver(&[("example.com", "192.0.2.1,192.0.2.2,192.0.2.3")]))
        .build()
        .unwrap(),
    );
    let ledger = Arc::new(RouteDatabase::new());
    let postponed = Route::new(address.clone(), Proxy::Direct, TargetAddr::Socket("192.0.2.2:443".parse().unwrap()));
    ledger.failed(&postponed);

    let mut selector = RouteSelector::new(address, ledger.clone(), Arc::new(NoopEventListener));
    let mut seen = Vec::new();
    while selector.has_next() {
      for route in selector.next().await.unwrap() {
        seen.push(route.target().to_string());
        selector.connect_failed(&route, &failure());
      }
    }
    assert_eq!(seen, vec!["192.0.2.1:443", "192.0.2.3:443", "192.0.2.2:443"]);
    assert_eq!(ledger.len(), 3);
  }

  #[tokio::test]
  async fn test_proxy_selector_is_queried_once() {
    let proxy_selector = Arc::new(CountingProxySelector::default());
    let address = Arc::new(
      AddressBuilder::default()
        .host("192.0.2.10")
        .port(8080)
        .proxy_selector(proxy_selector.clone() as Arc<dyn ProxySelector>)
        .build()
        .unwrap(),
    );
    let mut selector = RouteSelector::new(address, Arc::new(RouteDatabase::new()), Arc::new(NoopEventListener));
    // Empty selection means direct
    let selection = selector.next().await.unwrap();
    assert_eq!(selection.len(), 1);
    assert!(selection.all()[0].proxy().is_direct());
    assert!(!selector.has_next());
    assert_eq!(proxy_selector.selects.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_explicit_proxy_overrides_selector() {
    let proxy_selector = Arc::new(CountingProxySelector::default());
    let address = Arc::new(
      AddressBuilder::default()
        .host("example.com")
        .port(443)
        .proxy("http://127.0.0.1:3128".parse::<Proxy>().unwrap())
        .proxy_selector(proxy_selector.clone() as Arc<dyn ProxySelector>)
        .resolver(resolver(&[]))
        .build()
        .unwrap(),
    );
    let ledger = Arc::new(RouteDatabase::new());
    let mut selector = RouteSelector::new(address, ledger.clone(), Arc::new(NoopEventListener));
    let selection = selector.next().await.unwrap();
    assert_eq!(targets(&selection), vec!["127.0.0.1:3128"]);
    assert_eq!(proxy_selector.selects.load(Ordering::SeqCst), 0);

    // Failures through a proxy are reported to the proxy selector and the ledger
    let route = selection.all()[0].clone();
    selector.connect_failed(&route, &failure());
    assert_eq!(proxy_selector.failed.lock().unwrap().as_slice(), &[route.proxy().clone()]);
    assert!(ledger.should_postpone(&route));
  }

  #[tokio::test]
  async fn test_direct_failure_is_not_reported_to_proxy_selector() {
    let proxy_selector = Arc::new(CountingProxySelector::default());
    let address = Arc::new(
      AddressBuilder::default()
        .host("192.0.2.10")
        .port(443)
        .proxy_selector(proxy_selector.clone() as Arc<dyn ProxySelector>)
        .build()
        .unwrap(),
    );
    let ledger = Arc::new(RouteDatabase::new());
    let mut selector = RouteSelector::new(address, ledger.clone(), Arc::new(NoopEventListener));
    let route = selector.next().await.unwrap().next().unwrap();
    selector.connect_failed(&route, &failure());
    assert!(proxy_selector.failed.lock().unwrap().is_empty());
    assert!(ledger.should_postpone(&route));
  }

  #[tokio::test]
  async fn test_socks_target_is_left_unresolved() {
    let address = Arc::new(
      AddressBuilder::default()
        .host("example.com")
        .port(443)
        .proxy("socks5://proxy.example:1080".parse::<Proxy>().unwrap())
        // Any lookup would fail
        .resolver(resolver(&[]))
        .build()
        .unwrap(),
    );
    let events = Arc::new(RecordingEvents::default());
    let mut selector = RouteSelector::new(address, Arc::new(RouteDatabase::new()), events.clone());
    let selection = selector.next().await.unwrap();
    assert_eq!(
      selection.all()[0].target(),
      &TargetAddr::Domain("example.com".to_string(), 443)
    );
    assert!(events.events.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_dns_events_and_resolver_order() {
    let address = Arc::new(
      AddressBuilder::default()
        .host("example.com")
        .port(443)
        .resolver(resolver(&[("example.com", "2001:db8::1,192.0.2.1")]))
        .build()
        .unwrap(),
    );
    let events = Arc::new(RecordingEvents::default());
    let mut selector = RouteSelector::new(address, Arc::new(RouteDatabase::new()), events.clone());
    let selection = selector.next().await.unwrap();
    assert_eq!(targets(&selection), vec!["[2001:db8::1]:443", "192.0.2.1:443"]);
    assert_eq!(
      events.events.lock().unwrap().as_slice(),
      &["dns_start example.com".to_string(), "dns_end example.com 2".to_string()]
    );
  }

  #[tokio::test]
  async fn test_ip_literal_skips_resolver() {
    let address = Arc::new(
      AddressBuilder::default()
        .host("::1")
        .port(443)
        .resolver(resolver(&[]))
        .build()
        .unwrap(),
    );
    let events = Arc::new(RecordingEvents::default());
    let mut selector = RouteSelector::new(address, Arc::new(RouteDatabase::new()), events.clone());
    let selection = selector.next().await.unwrap();
    assert_eq!(targets(&selection), vec!["[::1]:443"]);
    assert!(events.events.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_resolution_failures_move_to_next_proxy() {
    let proxies = vec![
      "http://unknown.example:3128".parse().unwrap(),
      "http://empty.example:3128".parse().unwrap(),
      "http://proxy.example:3128".parse().unwrap(),
    ];
    let address = Arc::new(
      AddressBuilder::default()
        .host("example.com")
        .port(443)
        .proxy_selector(Arc::new(StaticProxySelector::new(proxies)) as Arc<dyn ProxySelector>)
        .resolver(resolver(&[("empty.example", ""), ("proxy.example", "10.0.0.3")]))
        .build()
        .unwrap(),
    );
    let mut selector = RouteSelector::new(address, Arc::new(RouteDatabase::new()), Arc::new(NoopEventListener));
    assert!(matches!(selector.next().await, Err(RouteSelectError::Resolution(_))));
    assert!(selector.has_next());
    assert!(matches!(
      selector.next().await,
      Err(RouteSelectError::UnresolvableHost(host)) if host == "empty.example"
    ));
    let selection = selector.next().await.unwrap();
    assert_eq!(targets(&selection), vec!["10.0.0.3:3128"]);
    assert!(!selector.has_next());
  }

  #[tokio::test]
  async fn test_failed_route_is_postponed_for_equal_address() {
    let ledger = Arc::new(RouteDatabase::new());
    let first = Arc::new(Address::try_new("192.0.2.1", 443, crate::address::Scheme::Https).unwrap());
    let mut selector = RouteSelector::new(first, ledger.clone(), Arc::new(NoopEventListener));
    let selection = selector.next().await.unwrap();
    selector.connect_failed(&selection.all()[0], &failure());

    // Built separately with the default proxy selector and resolver
    let second = Arc::new(AddressBuilder::default().host("192.0.2.1").port(443).build().unwrap());
    let mut selector = RouteSelector::new(second, ledger.clone(), Arc::new(NoopEventListener));
    let selection = selector.next().await.unwrap();
    // Only the postponed route remains, handed back once everything else is exhausted
    assert_eq!(targets(&selection), vec!["192.0.2.1:443"]);
    assert!(ledger.should_postpone(&selection.all()[0]));
    assert!(!selector.has_next());
  }

  #[test]
  fn test_selection_iterates_in_order() {
    let address = Arc::new(Address::try_new("192.0.2.1", 80, crate::address::Scheme::Http).unwrap());
    let routes: Vec<Route> = ["192.0.2.1:80", "192.0.2.2:80"]
      .iter()
      .map(|s| Route::new(address.clone(), Proxy::Direct, TargetAddr::Socket(s.parse().unwrap())))
      .collect();
    let mut selection = Selection::new(routes.clone());
    assert!(selection.has_next());
    assert_eq!(selection.next().as_ref(), Some(&routes[0]));
    assert_eq!(selection.next().as_ref(), Some(&routes[1]));
    assert!(!selection.has_next());
    assert_eq!(selection.next(), None);
    assert_eq!(selection.all().len(), 2);
  }
}
