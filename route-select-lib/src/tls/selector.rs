use super::spec::{ConnectionSpec, SecureSocket};
use crate::{
  error::UnnegotiableTransport,
  failure::{ConnectFailure, FailureCategory},
  trace::*,
};

/* ---------------------------------------------------------- */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Progress of the selector through the connection spec list
enum SelectorState {
  /// No spec has been applied yet
  Untried,
  /// The spec at `index - 1` was applied; `index` is the next one to consider
  Configured { next_index: usize, fallback_possible: bool },
  /// No compatible spec is left
  Exhausted,
}

/// Picks the connection spec to apply to a secure socket and decides whether a handshake failure is worth
/// retrying with the next compatible spec.
///
/// One selector lives for the attempts on a single route. Specs are never revisited.
#[derive(Debug)]
pub struct ConnectionSpecSelector {
  connection_specs: Vec<ConnectionSpec>,
  state: SelectorState,
  is_fallback: bool,
}

impl ConnectionSpecSelector {
  pub fn new(connection_specs: Vec<ConnectionSpec>) -> Self {
    Self {
      connection_specs,
      state: SelectorState::Untried,
      is_fallback: false,
    }
  }

  /// Whether a previous attempt with this selector has failed
  pub fn is_fallback(&self) -> bool {
    self.is_fallback
  }

  /// Configure the socket with the first compatible spec not yet tried, and return that spec
  pub fn configure_secure_socket<S>(&mut self, socket: &mut S) -> Result<ConnectionSpec, UnnegotiableTransport>
  where
    S: SecureSocket + ?Sized,
  {
    let start = match self.state {
      SelectorState::Untried => 0,
      SelectorState::Configured { next_index, .. } => next_index,
      SelectorState::Exhausted => self.connection_specs.len(),
    };

    let found = self.connection_specs[start.min(self.connection_specs.len())..]
      .iter()
      .position(|spec| spec.is_compatible(socket))
      .map(|offset| start + offset);

    let Some(index) = found else {
      self.state = SelectorState::Exhausted;
      // Report the socket before any narrowing, as inspected
      return Err(UnnegotiableTransport {
        fallback: self.is_fallback,
        connection_specs: self.connection_specs.iter().map(|s| s.name().to_string()).collect(),
        enabled_protocols: socket.enabled_protocols().to_vec(),
      });
    };

    let next_index = index + 1;
    let fallback_possible = self.connection_specs[next_index..]
      .iter()
      .any(|spec| spec.is_compatible(socket));
    self.state = SelectorState::Configured {
      next_index,
      fallback_possible,
    };

    let spec = self.connection_specs[index].clone();
    debug!(
      "Applying connection spec {} (fallback attempt: {}, fallback possible: {})",
      spec.name(),
      self.is_fallback,
      fallback_possible
    );
    spec.apply(socket, self.is_fallback);
    Ok(spec)
  }

  /// Report a failed connection attempt. Returns true if the attempt should be retried with the next spec.
  pub fn connection_failed(&mut self, failure: &ConnectFailure) -> bool {
    self.is_fallback = true;
    let fallback_possible = match self.state {
      SelectorState::Configured { fallback_possible, .. } => fallback_possible,
      SelectorState::Untried | SelectorState::Exhausted => false,
    };
    let retry = retry_with_fallback(failure.category(), fallback_possible);
    trace!(
      "Connection failed with {} (fallback possible: {}): retry = {}",
      failure.category(),
      fallback_possible,
      retry
    );
    retry
  }
}

/// Retry decision over the failure class alone.
/// Only generic TLS negotiation failures are worth another spec; everything else would fail again.
pub fn retry_with_fallback(category: FailureCategory, fallback_possible: bool) -> bool {
  if !fallback_possible {
    return false;
  }
  match category {
    FailureCategory::Handshake => true,
    FailureCategory::Protocol
    | FailureCategory::Interrupted
    | FailureCategory::Timeout
    | FailureCategory::CertificateRejected
    | FailureCategory::PeerUnverified
    | FailureCategory::Unnegotiable
    | FailureCategory::Resolution
    | FailureCategory::Io => false,
  }
}
