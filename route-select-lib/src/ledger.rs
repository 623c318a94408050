use crate::{route::Route, trace::*};
use dashmap::DashSet;

/// Record of routes whose most recent connection attempt failed.
/// Shared by every route selector of a client, so implementations must be thread safe.
pub trait RouteLedger: Send + Sync {
  /// Record a failure connecting to `route`
  fn failed(&self, route: &Route);
  /// Record a success connecting to `route`
  fn connected(&self, route: &Route);
  /// Returns true if `route` has failed recently and should be avoided
  fn should_postpone(&self, route: &Route) -> bool;
}

/// Default in-memory ledger backed by a concurrent hash set
#[derive(Debug, Default)]
pub struct RouteDatabase {
  failed_routes: DashSet<Route, ahash::RandomState>,
}

impl RouteDatabase {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of routes currently marked as failed
  pub fn len(&self) -> usize {
    self.failed_routes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.failed_routes.is_empty()
  }
}

impl RouteLedger for RouteDatabase {
  fn failed(&self, route: &Route) {
    if self.failed_routes.insert(route.clone()) {
      debug!("Marked route as failed: {route}");
    }
  }

  fn connected(&self, route: &Route) {
    if self.failed_routes.remove(route).is_some() {
      debug!("Route recovered: {route}");
    }
  }

  fn should_postpone(&self, route: &Route) -> bool {
    self.failed_routes.contains(route)
  }
}
