use std::time::Duration;

/// Default timeout applied to each connect step (TCP connect, proxy handshake, TLS handshake) in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MSEC: u64 = 10_000;

/// Upper bound of failures kept as suppressed entries of the first failure in a [crate::RouteError].
/// Intermediate failures beyond this are counted but dropped, the last failure is always retained.
pub const MAX_SUPPRESSED_FAILURES: usize = 16;

/// Maximum size of the HTTP response header returned by a proxy to a CONNECT request
pub const MAX_TUNNEL_RESPONSE_HEADER_SIZE: usize = 8192;

/// TCP keepalive idle time set on outgoing sockets
pub const TCP_KEEPALIVE_IDLE: Duration = Duration::from_secs(60);

/// ALPN protocol identifiers advertised when a connection spec supports TLS extensions
pub const DEFAULT_ALPN_PROTOCOLS: &[&[u8]] = &[b"http/1.1"];
