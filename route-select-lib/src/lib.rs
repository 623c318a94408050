mod address;
mod config;
mod constants;
mod dns;
mod error;
mod events;
mod failure;
mod finder;
mod ledger;
mod proxy;
mod route;
mod selector;
mod target;
mod tls;
mod trace;
mod transport;


pub use address::{Address, AddressBuilder, AddressBuilderError, Scheme};
pub use config::{
  Config, ConfigBuilder, ConfigValidationError, ConnectOptions, ConnectOptionsBuilder, ConnectOptionsBuilderError,
  DestinationConfig, DestinationConfigBuilder, ProxySelectors,
};
pub use dns::{AddressResolver, MockResolver, SystemResolver};
pub use error::{BuildError, ConnectError, ResolveError, RouteSelectError, UnnegotiableTransport};
pub use events::{EventListener, NoopEventListener, TracingEventListener};
pub use failure::{ConnectFailure, FailureCategory, RouteError};
pub use finder::{ConnectionFinder, Established, EstablishedStream, Transport};
pub use ledger::{RouteDatabase, RouteLedger};
pub use proxy::{NoProxySelector, Proxy, ProxySelector, RankedProxySelector, StaticProxySelector};
pub use route::Route;
pub use selector::{RouteSelector, Selection};
pub use target::TargetAddr;
pub use tls::{
  CipherSuite, ConnectionSpec, ConnectionSpecBuilder, ConnectionSpecSelector, SecureSocket, TlsVersion,
  retry_with_fallback,
};
pub use transport::{RustlsSocket, TokioTransport};
