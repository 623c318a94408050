use crate::{constants::MAX_SUPPRESSED_FAILURES, error::UnnegotiableTransport, route::Route};
use std::{fmt, io};

/* ---------------------------------------------------------- */
/// Closed set of failure classes produced at the transport boundary.
/// Retry decisions are made over these categories, never over concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
  /// Generic TLS negotiation failure, e.g. handshake alert or no shared protocol version
  Handshake,
  /// Malformed or unexpected protocol data (not a negotiation mismatch)
  Protocol,
  /// The operation was interrupted
  Interrupted,
  Timeout,
  /// The handshake failed because the peer's certificate chain was rejected
  CertificateRejected,
  /// The peer's identity could not be verified (missing certificate, pin or hostname mismatch)
  PeerUnverified,
  /// None of the remaining connection specs is compatible with the socket
  Unnegotiable,
  /// The target host could not be resolved
  Resolution,
  /// Any other I/O failure below TLS, like a refused or reset TCP connection
  Io,
}

impl FailureCategory {
  /// Category for a plain I/O error, only by its kind
  pub fn of_io_error(err: &io::Error) -> Self {
    match err.kind() {
      io::ErrorKind::TimedOut => FailureCategory::Timeout,
      io::ErrorKind::Interrupted => FailureCategory::Interrupted,
      _ => FailureCategory::Io,
    }
  }
}

impl fmt::Display for FailureCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      FailureCategory::Handshake => "TLS handshake failure",
      FailureCategory::Protocol => "protocol error",
      FailureCategory::Interrupted => "interrupted",
      FailureCategory::Timeout => "timed out",
      FailureCategory::CertificateRejected => "certificate rejected",
      FailureCategory::PeerUnverified => "peer not verified",
      FailureCategory::Unnegotiable => "no acceptable connection spec",
      FailureCategory::Resolution => "resolution failure",
      FailureCategory::Io => "I/O error",
    };
    f.write_str(label)
  }
}

/* ---------------------------------------------------------- */
/// One classified failure of a connect step
#[derive(Debug)]
pub struct ConnectFailure {
  category: FailureCategory,
  source: io::Error,
  route: Option<Route>,
}

impl ConnectFailure {
  pub fn new(category: FailureCategory, source: io::Error) -> Self {
    Self {
      category,
      source,
      route: None,
    }
  }

  /// Classify a plain I/O error by its kind
  pub fn from_io(source: io::Error) -> Self {
    Self::new(FailureCategory::of_io_error(&source), source)
  }

  /// Failure with a message and no underlying I/O error
  pub fn other(category: FailureCategory, message: impl Into<String>) -> Self {
    Self::new(category, io::Error::other(message.into()))
  }

  /// Attach the route the failure happened on
  pub fn with_route(mut self, route: &Route) -> Self {
    self.route = Some(route.clone());
    self
  }

  pub fn category(&self) -> FailureCategory {
    self.category
  }

  pub fn io_error(&self) -> &io::Error {
    &self.source
  }

  pub fn route(&self) -> Option<&Route> {
    self.route.as_ref()
  }
}

impl From<io::Error> for ConnectFailure {
  fn from(source: io::Error) -> Self {
    Self::from_io(source)
  }
}

impl From<UnnegotiableTransport> for ConnectFailure {
  fn from(err: UnnegotiableTransport) -> Self {
    Self::new(FailureCategory::Unnegotiable, io::Error::other(err))
  }
}

impl fmt::Display for ConnectFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.route {
      Some(route) => write!(f, "{} on {}: {}", self.category, route, self.source),
      None => write!(f, "{}: {}", self.category, self.source),
    }
  }
}

impl std::error::Error for ConnectFailure {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.source)
  }
}

/* ---------------------------------------------------------- */
/// Failures of one logical connection attempt across routes and connection specs.
///
/// The first failure is kept for diagnosis and later failures are suppressed onto it; the most recent one is
/// what gets reported. Intermediate failures beyond [MAX_SUPPRESSED_FAILURES] are dropped and only counted.
#[derive(Debug)]
pub struct RouteError {
  first: ConnectFailure,
  suppressed: Vec<ConnectFailure>,
  dropped: usize,
}

impl RouteError {
  pub fn new(first: ConnectFailure) -> Self {
    Self {
      first,
      suppressed: Vec::new(),
      dropped: 0,
    }
  }

  /// Record another failure, which becomes the last one
  pub fn add(&mut self, failure: ConnectFailure) {
    if self.suppressed.len() >= MAX_SUPPRESSED_FAILURES {
      self.suppressed.remove(0);
      self.dropped += 1;
    }
    self.suppressed.push(failure);
  }

  /// Record into an optional aggregate, creating it on the first failure
  pub fn record(slot: &mut Option<RouteError>, failure: ConnectFailure) {
    match slot {
      Some(aggregate) => aggregate.add(failure),
      None => *slot = Some(RouteError::new(failure)),
    }
  }

  /// The failure that happened first
  pub fn first(&self) -> &ConnectFailure {
    &self.first
  }

  /// The most recent failure
  pub fn last(&self) -> &ConnectFailure {
    self.suppressed.last().unwrap_or(&self.first)
  }

  /// Failures after the first one that are still retained, oldest first. The last failure is included.
  pub fn suppressed(&self) -> &[ConnectFailure] {
    &self.suppressed
  }

  /// Total number of failures recorded
  pub fn attempts(&self) -> usize {
    1 + self.suppressed.len() + self.dropped
  }
}

impl fmt::Display for RouteError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.last())?;
    if self.attempts() > 1 {
      write!(f, " (after {} failed attempts, first: {})", self.attempts(), self.first)?;
    }
    Ok(())
  }
}

impl std::error::Error for RouteError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(self.last())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn failure(message: &str) -> ConnectFailure {
    ConnectFailure::other(FailureCategory::Io, message)
  }

  #[test]
  fn test_first_and_last_are_tracked() {
    let mut errors = RouteError::new(failure("first"));
    assert_eq!(errors.first().io_error().to_string(), "first");
    assert_eq!(errors.last().io_error().to_string(), "first");
    assert_eq!(errors.attempts(), 1);

    errors.add(failure("second"));
    errors.add(failure("third"));
    assert_eq!(errors.first().io_error().to_string(), "first");
    assert_eq!(errors.last().io_error().to_string(), "third");
    assert_eq!(errors.suppressed().len(), 2);
    assert_eq!(errors.attempts(), 3);
  }

  #[test]
  fn test_suppressed_failures_are_bounded() {
    let mut slot = None;
    for i in 0..(MAX_SUPPRESSED_FAILURES + 10) {
      RouteError::record(&mut slot, failure(&format!("failure {i}")));
    }
    let errors = slot.unwrap();
    assert_eq!(errors.first().io_error().to_string(), "failure 0");
    assert_eq!(
      errors.last().io_error().to_string(),
      format!("failure {}", MAX_SUPPRESSED_FAILURES + 9)
    );
    assert_eq!(errors.suppressed().len(), MAX_SUPPRESSED_FAILURES);
    assert_eq!(errors.attempts(), MAX_SUPPRESSED_FAILURES + 10);
  }

  #[test]
  fn test_reported_error_is_the_last() {
    let mut errors = RouteError::new(failure("refused"));
    errors.add(ConnectFailure::other(FailureCategory::Handshake, "alert"));
    let source = std::error::Error::source(&errors).unwrap();
    assert!(source.to_string().contains("alert"));
    assert!(errors.to_string().starts_with("TLS handshake failure: alert"));
  }

  #[test]
  fn test_io_error_classification() {
    let timeout = ConnectFailure::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
    assert_eq!(timeout.category(), FailureCategory::Timeout);
    let interrupted = ConnectFailure::from(io::Error::new(io::ErrorKind::Interrupted, "signal"));
    assert_eq!(interrupted.category(), FailureCategory::Interrupted);
    let refused = ConnectFailure::from(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
    assert_eq!(refused.category(), FailureCategory::Io);
  }
}
