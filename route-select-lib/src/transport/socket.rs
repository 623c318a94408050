use crate::{
  constants::TCP_KEEPALIVE_IDLE,
  failure::{ConnectFailure, FailureCategory},
  target::TargetAddr,
  trace::*,
};
use socket2::{SockRef, TcpKeepalive};
use std::net::SocketAddr;
use tokio::net::{TcpSocket, TcpStream};

/// Connect a TCP socket to the given `SocketAddr` with `TCP_NODELAY` and keepalive enabled.
pub(super) async fn connect_tcp_socket(connect_to: &SocketAddr) -> Result<TcpStream, std::io::Error> {
  let tcp_socket = if connect_to.is_ipv6() {
    TcpSocket::new_v6()
  } else {
    TcpSocket::new_v4()
  }?;
  tcp_socket.set_keepalive(true)?;

  let stream = tcp_socket.connect(*connect_to).await?;
  stream.set_nodelay(true)?;

  let keepalive = TcpKeepalive::new().with_time(TCP_KEEPALIVE_IDLE);
  SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;
  Ok(stream)
}

/// Connect to a target that may still be a host name, e.g. a SOCKS proxy given by name.
/// Resolved addresses are tried in order and the last error is returned.
pub(super) async fn connect_tcp_target(target: &TargetAddr) -> Result<TcpStream, ConnectFailure> {
  let addrs: Vec<SocketAddr> = match target {
    TargetAddr::Socket(addr) => vec![*addr],
    TargetAddr::Domain(host, port) => tokio::net::lookup_host((host.as_str(), *port))
      .await
      .map_err(|e| ConnectFailure::new(FailureCategory::Resolution, e))?
      .collect(),
  };

  let mut last_error = None;
  for addr in addrs {
    match connect_tcp_socket(&addr).await {
      Ok(stream) => return Ok(stream),
      Err(e) => {
        debug!("TCP connect to {addr} failed: {e}");
        last_error = Some(e);
      }
    }
  }
  match last_error {
    Some(e) => Err(ConnectFailure::from_io(e)),
    None => Err(ConnectFailure::other(
      FailureCategory::Resolution,
      format!("No address for {target}"),
    )),
  }
}
