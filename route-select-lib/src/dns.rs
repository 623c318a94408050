//! Address resolution abstractions
//!
//! The route selector only depends on the [AddressResolver] interface; [SystemResolver] delegates to the
//! operating system through tokio and [MockResolver] serves canned answers in tests.

use crate::{error::ResolveError, trace::*};
use std::{
  collections::HashMap,
  net::IpAddr,
  sync::{Arc, LazyLock},
};

/// Trait for hostname resolution strategies
#[async_trait::async_trait]
pub trait AddressResolver: Send + Sync {
  /// Resolve a hostname to IP addresses, in the order they should be attempted
  async fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>, ResolveError>;
}

/// Resolver backed by the operating system via `tokio::net::lookup_host`
#[derive(Debug, Default, Clone)]
pub struct SystemResolver;

static SYSTEM_RESOLVER: LazyLock<Arc<dyn AddressResolver>> = LazyLock::new(|| Arc::new(SystemResolver));

impl SystemResolver {
  /// Process-wide handle. Addresses compare resolvers by identity, so every default address uses this one.
  pub fn shared() -> Arc<dyn AddressResolver> {
    SYSTEM_RESOLVER.clone()
  }
}

#[async_trait::async_trait]
impl AddressResolver for SystemResolver {
  async fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>, ResolveError> {
    let addrs = tokio::net::lookup_host((hostname, 0))
      .await
      .map_err(|source| ResolveError::Lookup {
        hostname: hostname.to_string(),
        source,
      })?;
    let mut ips: Vec<IpAddr> = Vec::new();
    for addr in addrs {
      // getaddrinfo may return the same address once per socket type
      if !ips.contains(&addr.ip()) {
        ips.push(addr.ip());
      }
    }
    trace!("Resolved {hostname} to {ips:?}");
    Ok(ips)
  }
}

/// Mock resolver for testing
#[derive(Debug, Default, Clone)]
pub struct MockResolver {
  responses: HashMap<String, Vec<IpAddr>>,
}

impl MockResolver {
  /// Create a new mock resolver
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a mock response for a hostname. An empty list makes lookups succeed with no address.
  pub fn add_response(&mut self, hostname: &str, addresses: Vec<IpAddr>) {
    self.responses.insert(hostname.to_string(), addresses);
  }

  /// Set multiple responses at once
  pub fn with_responses(mut self, responses: HashMap<String, Vec<IpAddr>>) -> Self {
    self.responses = responses;
    self
  }
}

#[async_trait::async_trait]
impl AddressResolver for MockResolver {
  async fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>, ResolveError> {
    self
      .responses
      .get(hostname)
      .cloned()
      .ok_or_else(|| ResolveError::UnknownHost(hostname.to_string()))
  }
}
