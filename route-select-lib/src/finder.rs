use crate::{
  address::Address,
  config::ConnectOptions,
  error::{ConnectError, RouteSelectError},
  events::EventListener,
  failure::{ConnectFailure, FailureCategory, RouteError},
  ledger::RouteLedger,
  route::Route,
  selector::{RouteSelector, Selection},
  tls::{ConnectionSpec, ConnectionSpecSelector, SecureSocket},
  trace::*,
};
use std::{future::Future, io, sync::Arc};
use tokio_util::sync::CancellationToken;

/* ---------------------------------------------------------- */
/// Socket level operations the finder drives for each route.
///
/// Implementations classify their errors into a [FailureCategory] at this boundary.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
  /// Connected stream before TLS
  type Stream: Send;
  /// Secure socket that is configured but not handshaked yet
  type PendingTls: SecureSocket + Send;
  /// Stream after a successful handshake
  type TlsStream: Send;

  /// Open a connection for the route, including the proxy handshake (SOCKS, or CONNECT for tunnels)
  async fn connect(&self, route: &Route) -> Result<Self::Stream, ConnectFailure>;

  /// Create a fresh secure socket for a TLS attempt on the route
  fn start_tls(&self, route: &Route) -> Result<Self::PendingTls, ConnectFailure>;

  /// Run the TLS handshake over the stream with the socket configured for `connection_spec`
  async fn handshake(
    &self,
    stream: Self::Stream,
    tls: Self::PendingTls,
    route: &Route,
    connection_spec: &ConnectionSpec,
  ) -> Result<Self::TlsStream, ConnectFailure>;
}

/// Stream of an established connection
pub enum EstablishedStream<S, T> {
  Plain(S),
  Tls(T),
}

/// A live connection with the route and connection spec it was established with
pub struct Established<T: Transport> {
  route: Route,
  connection_spec: ConnectionSpec,
  stream: EstablishedStream<T::Stream, T::TlsStream>,
}

impl<T: Transport> Established<T> {
  pub fn route(&self) -> &Route {
    &self.route
  }

  pub fn connection_spec(&self) -> &ConnectionSpec {
    &self.connection_spec
  }

  pub fn is_tls(&self) -> bool {
    matches!(self.stream, EstablishedStream::Tls(_))
  }

  pub fn stream(&self) -> &EstablishedStream<T::Stream, T::TlsStream> {
    &self.stream
  }

  pub fn into_stream(self) -> EstablishedStream<T::Stream, T::TlsStream> {
    self.stream
  }
}

/// Outcome of a failed attempt on one route
enum AttemptError {
  Failed(ConnectFailure),
  Canceled,
}

impl From<ConnectFailure> for AttemptError {
  fn from(failure: ConnectFailure) -> Self {
    AttemptError::Failed(failure)
  }
}

/* ---------------------------------------------------------- */
/// Finds a working connection to an address by walking the routes of a [RouteSelector] and the connection specs
/// of each route, recording the outcome of every route in the ledger.
pub struct ConnectionFinder<T: Transport> {
  transport: Arc<T>,
  route_selector: RouteSelector,
  selection: Option<Selection>,
  ledger: Arc<dyn RouteLedger>,
  events: Arc<dyn EventListener>,
  options: ConnectOptions,
  cancel_token: CancellationToken,
}

impl<T: Transport> ConnectionFinder<T> {
  pub fn new(
    address: Arc<Address>,
    transport: Arc<T>,
    ledger: Arc<dyn RouteLedger>,
    events: Arc<dyn EventListener>,
    options: ConnectOptions,
  ) -> Self {
    let route_selector = RouteSelector::new(address, ledger.clone(), events.clone());
    Self {
      transport,
      route_selector,
      selection: None,
      ledger,
      events,
      options,
      cancel_token: CancellationToken::new(),
    }
  }

  /// Abort the attempt when the token is cancelled
  pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
    self.cancel_token = cancel_token;
    self
  }

  /// Whether another route is left to try
  pub fn has_route_to_try(&self) -> bool {
    self.selection.as_ref().is_some_and(|s| s.has_next()) || self.route_selector.has_next()
  }

  /// Connect to the address, trying routes and connection specs until one succeeds.
  /// On failure the returned error carries the first and the last failure of the whole attempt.
  pub async fn connect(&mut self) -> Result<Established<T>, ConnectError> {
    let address = self.route_selector.address().clone();
    if !address.is_tls() && !address.connection_specs().iter().any(|spec| !spec.is_tls()) {
      return Err(ConnectError::CleartextNotPermitted(address.host().to_string()));
    }

    let mut errors: Option<RouteError> = None;
    loop {
      if self.cancel_token.is_cancelled() {
        return Err(ConnectError::Canceled);
      }

      let route = match self.next_route().await {
        Some(Ok(route)) => route,
        Some(Err(e)) => {
          warn!("Failed to select routes to {address}: {e}");
          RouteError::record(&mut errors, ConnectFailure::other(FailureCategory::Resolution, e.to_string()));
          if !self.options.retry_on_connection_failure() {
            break;
          }
          continue;
        }
        None => break,
      };

      match self.connect_route(&route, &mut errors).await {
        Ok(established) => {
          self.ledger.connected(&route);
          return Ok(established);
        }
        Err(AttemptError::Canceled) => return Err(ConnectError::Canceled),
        Err(AttemptError::Failed(failure)) => {
          debug!("Route failed: {failure}");
          self.route_selector.connect_failed(&route, &failure);
          RouteError::record(&mut errors, failure);
          if !self.options.retry_on_connection_failure() {
            break;
          }
        }
      }
    }

    let errors = errors.unwrap_or_else(|| {
      RouteError::new(ConnectFailure::new(
        FailureCategory::Io,
        io::Error::new(io::ErrorKind::NotFound, format!("No route to {address}")),
      ))
    });
    Err(ConnectError::Route(errors))
  }

  /// Next route of the current selection, or of a fresh selection. `None` when every route was handed out.
  async fn next_route(&mut self) -> Option<Result<Route, RouteSelectError>> {
    loop {
      if let Some(route) = self.selection.as_mut().and_then(|s| s.next()) {
        return Some(Ok(route));
      }
      if !self.route_selector.has_next() {
        return None;
      }
      match self.route_selector.next().await {
        Ok(selection) => {
          trace!("New selection of {} routes", selection.len());
          self.selection = Some(selection);
        }
        Err(e) => return Some(Err(e)),
      }
    }
  }

  /// Attempt one route, falling back through the connection specs while failures are retry-worthy.
  /// Failures that lead to a retry on the same route are recorded into `errors`, the final one is returned.
  async fn connect_route(
    &self,
    route: &Route,
    errors: &mut Option<RouteError>,
  ) -> Result<Established<T>, AttemptError> {
    let address = route.address();
    let mut spec_selector = ConnectionSpecSelector::new(address.connection_specs().to_vec());

    loop {
      self.events.connect_start(route);
      let stream = match self.step(self.transport.connect(route)).await {
        Ok(stream) => stream,
        Err(AttemptError::Failed(failure)) => {
          let failure = failure.with_route(route);
          self.events.connect_failed(route, &failure);
          return Err(AttemptError::Failed(failure));
        }
        Err(AttemptError::Canceled) => return Err(AttemptError::Canceled),
      };

      if !address.is_tls() {
        let connection_spec = address
          .connection_specs()
          .iter()
          .find(|spec| !spec.is_tls())
          .cloned()
          .unwrap_or_else(ConnectionSpec::cleartext);
        self.events.connect_end(route);
        return Ok(Established {
          route: route.clone(),
          connection_spec,
          stream: EstablishedStream::Plain(stream),
        });
      }

      self.events.secure_connect_start(route);
      let handshake = self.secure(stream, route, &mut spec_selector).await;
      let failure = match handshake {
        Ok((tls_stream, connection_spec)) => {
          self.events.secure_connect_end(route, &connection_spec);
          self.events.connect_end(route);
          return Ok(Established {
            route: route.clone(),
            connection_spec,
            stream: EstablishedStream::Tls(tls_stream),
          });
        }
        Err(AttemptError::Canceled) => return Err(AttemptError::Canceled),
        Err(AttemptError::Failed(failure)) => failure.with_route(route),
      };

      self.events.connect_failed(route, &failure);
      let retry = spec_selector.connection_failed(&failure);
      if !(retry && self.options.retry_on_connection_failure()) {
        return Err(AttemptError::Failed(failure));
      }
      debug!("Retrying {route} with a fallback connection spec after: {failure}");
      RouteError::record(errors, failure);
      if self.cancel_token.is_cancelled() {
        return Err(AttemptError::Canceled);
      }
    }
  }

  /// Configure a fresh secure socket with the next connection spec and handshake over the stream
  async fn secure(
    &self,
    stream: T::Stream,
    route: &Route,
    spec_selector: &mut ConnectionSpecSelector,
  ) -> Result<(T::TlsStream, ConnectionSpec), AttemptError> {
    let mut tls = self.transport.start_tls(route)?;
    let connection_spec = spec_selector
      .configure_secure_socket(&mut tls)
      .map_err(ConnectFailure::from)?;
    let tls_stream = self
      .step(self.transport.handshake(stream, tls, route, &connection_spec))
      .await?;
    Ok((tls_stream, connection_spec))
  }

  /// Run a connect step bounded by the connect timeout and the cancel token
  async fn step<F, S>(&self, fut: F) -> Result<S, AttemptError>
  where
    F: Future<Output = Result<S, ConnectFailure>>,
  {
    let timed = async {
      match self.options.connect_timeout() {
        Some(timeout) => match tokio::time::timeout(timeout, fut).await {
          Ok(res) => res,
          Err(_) => Err(ConnectFailure::new(
            FailureCategory::Timeout,
            io::Error::new(io::ErrorKind::TimedOut, format!("Timed out after {timeout:?}")),
          )),
        },
        None => fut.await,
      }
    };
    tokio::select! {
      _ = self.cancel_token.cancelled() => Err(AttemptError::Canceled),
      res = timed => res.map_err(AttemptError::Failed),
    }
  }
}
