use crate::{
  address::Address,
  constants::MAX_TUNNEL_RESPONSE_HEADER_SIZE,
  failure::{ConnectFailure, FailureCategory},
  target::TargetAddr,
  trace::*,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/* ---------------------------------------------------------- */
/// Open a CONNECT tunnel to the address through an HTTP proxy
pub(super) async fn http_tunnel<S>(stream: &mut S, address: &Address) -> Result<(), ConnectFailure>
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  let authority = address.to_string();
  let request = format!(
    "CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\nProxy-Connection: Keep-Alive\r\nUser-Agent: {}/{}\r\n\r\n",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_VERSION")
  );
  stream.write_all(request.as_bytes()).await?;
  stream.flush().await?;

  let header = read_response_header(stream).await?;
  let status = parse_status_code(&header)?;
  match status {
    200 => {
      debug!("Tunnel to {authority} established");
      Ok(())
    }
    407 => Err(ConnectFailure::other(
      FailureCategory::Io,
      "Failed to authenticate with proxy",
    )),
    code => Err(ConnectFailure::other(
      FailureCategory::Io,
      format!("Unexpected response code for CONNECT: {code}"),
    )),
  }
}

/// Read the response header byte by byte, so nothing after the blank line is consumed
async fn read_response_header<S>(stream: &mut S) -> Result<Vec<u8>, ConnectFailure>
where
  S: AsyncRead + Unpin,
{
  let mut header = Vec::with_capacity(256);
  while !header.ends_with(b"\r\n\r\n") {
    if header.len() >= MAX_TUNNEL_RESPONSE_HEADER_SIZE {
      return Err(ConnectFailure::other(
        FailureCategory::Protocol,
        "Proxy response header too large",
      ));
    }
    header.push(stream.read_u8().await?);
  }
  Ok(header)
}

fn parse_status_code(header: &[u8]) -> Result<u16, ConnectFailure> {
  let malformed = || ConnectFailure::other(FailureCategory::Protocol, "Malformed proxy response status line");
  let line_end = header.windows(2).position(|w| w == b"\r\n").ok_or_else(malformed)?;
  let status_line = std::str::from_utf8(&header[..line_end]).map_err(|_| malformed())?;
  let mut parts = status_line.split(' ');
  match (parts.next(), parts.next()) {
    (Some(version), Some(code)) if version.starts_with("HTTP/1.") => code.parse::<u16>().map_err(|_| malformed()),
    _ => Err(malformed()),
  }
}

/* ---------------------------------------------------------- */
const SOCKS_VERSION: u8 = 0x05;
const SOCKS_NO_AUTH: u8 = 0x00;
const SOCKS_CMD_CONNECT: u8 = 0x01;
const SOCKS_ATYP_IPV4: u8 = 0x01;
const SOCKS_ATYP_DOMAIN: u8 = 0x03;
const SOCKS_ATYP_IPV6: u8 = 0x04;

/// SOCKS5 CONNECT without authentication (RFC 1928). Host names are sent to the proxy unresolved.
pub(super) async fn socks5_connect<S>(stream: &mut S, target: &TargetAddr) -> Result<(), ConnectFailure>
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  stream.write_all(&[SOCKS_VERSION, 1, SOCKS_NO_AUTH]).await?;
  let mut method = [0u8; 2];
  stream.read_exact(&mut method).await?;
  if method[0] != SOCKS_VERSION {
    return Err(ConnectFailure::other(
      FailureCategory::Protocol,
      format!("Unexpected SOCKS version: {}", method[0]),
    ));
  }
  if method[1] != SOCKS_NO_AUTH {
    return Err(ConnectFailure::other(
      FailureCategory::Io,
      "SOCKS proxy requires authentication",
    ));
  }

  let mut request = vec![SOCKS_VERSION, SOCKS_CMD_CONNECT, 0x00];
  match target {
    TargetAddr::Socket(addr) => match addr.ip() {
      std::net::IpAddr::V4(ip) => {
        request.push(SOCKS_ATYP_IPV4);
        request.extend_from_slice(&ip.octets());
      }
      std::net::IpAddr::V6(ip) => {
        request.push(SOCKS_ATYP_IPV6);
        request.extend_from_slice(&ip.octets());
      }
    },
    TargetAddr::Domain(host, _) => {
      let len = u8::try_from(host.len()).map_err(|_| {
        ConnectFailure::other(FailureCategory::Protocol, format!("Host name too long for SOCKS: {host}"))
      })?;
      request.push(SOCKS_ATYP_DOMAIN);
      request.push(len);
      request.extend_from_slice(host.as_bytes());
    }
  }
  request.extend_from_slice(&target.port().to_be_bytes());
  stream.write_all(&request).await?;

  let mut reply = [0u8; 4];
  stream.read_exact(&mut reply).await?;
  if reply[0] != SOCKS_VERSION {
    return Err(ConnectFailure::other(
      FailureCategory::Protocol,
      format!("Unexpected SOCKS version: {}", reply[0]),
    ));
  }
  if reply[1] != 0x00 {
    return Err(ConnectFailure::other(
      FailureCategory::Io,
      format!("SOCKS connect to {target} failed: {}", socks_reply_message(reply[1])),
    ));
  }

  // Bound address, unused
  let addr_len = match reply[3] {
    SOCKS_ATYP_IPV4 => 4,
    SOCKS_ATYP_IPV6 => 16,
    SOCKS_ATYP_DOMAIN => stream.read_u8().await? as usize,
    atyp => {
      return Err(ConnectFailure::other(
        FailureCategory::Protocol,
        format!("Unexpected SOCKS address type: {atyp}"),
      ));
    }
  };
  let mut bound = vec![0u8; addr_len + 2];
  stream.read_exact(&mut bound).await?;
  debug!("SOCKS tunnel to {target} established");
  Ok(())
}

fn socks_reply_message(code: u8) -> &'static str {
  match code {
    0x01 => "general SOCKS server failure",
    0x02 => "connection not allowed by ruleset",
    0x03 => "network unreachable",
    0x04 => "host unreachable",
    0x05 => "connection refused",
    0x06 => "TTL expired",
    0x07 => "command not supported",
    0x08 => "address type not supported",
    _ => "unknown error",
  }
}
