use std::{fmt, str::FromStr};

/* ---------------------------------------------------------- */
/// TLS protocol versions a connection spec may enable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TlsVersion {
  Tls13,
  Tls12,
  Tls11,
  Tls10,
  Ssl30,
}

impl TlsVersion {
  /// Protocol name as it appears in socket APIs and logs
  pub fn name(&self) -> &'static str {
    match self {
      TlsVersion::Tls13 => "TLSv1.3",
      TlsVersion::Tls12 => "TLSv1.2",
      TlsVersion::Tls11 => "TLSv1.1",
      TlsVersion::Tls10 => "TLSv1",
      TlsVersion::Ssl30 => "SSLv3",
    }
  }
}

impl fmt::Display for TlsVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for TlsVersion {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "TLSv1.3" => Ok(TlsVersion::Tls13),
      "TLSv1.2" => Ok(TlsVersion::Tls12),
      "TLSv1.1" => Ok(TlsVersion::Tls11),
      "TLSv1" | "TLSv1.0" => Ok(TlsVersion::Tls10),
      "SSLv3" => Ok(TlsVersion::Ssl30),
      _ => Err(format!("Unexpected TLS version: {s}")),
    }
  }
}

/* ---------------------------------------------------------- */
macro_rules! cipher_suites {
  ($($name:ident = $code:literal),* $(,)?) => {
    /// Cipher suites known to the built-in connection specs, identified by their IANA name and code point
    #[allow(non_camel_case_types)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum CipherSuite {
      $($name,)*
    }

    impl CipherSuite {
      /// IANA code point
      pub fn code(&self) -> u16 {
        match self {
          $(CipherSuite::$name => $code,)*
        }
      }

      /// IANA name
      pub fn name(&self) -> &'static str {
        match self {
          $(CipherSuite::$name => stringify!($name),)*
        }
      }

      /// Look up a suite by its code point, `None` for suites unknown to this crate
      pub fn from_code(code: u16) -> Option<Self> {
        match code {
          $($code => Some(CipherSuite::$name),)*
          _ => None,
        }
      }
    }

    impl FromStr for CipherSuite {
      type Err = String;
      /// Accepts both `TLS_` and the legacy `SSL_` prefix
      fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = match s.strip_prefix("SSL_") {
          Some(rest) => format!("TLS_{rest}"),
          None => s.to_string(),
        };
        match normalized.as_str() {
          $(stringify!($name) => Ok(CipherSuite::$name),)*
          _ => Err(format!("Unknown cipher suite: {s}")),
        }
      }
    }
  };
}

cipher_suites! {
  // TLS 1.3
  TLS_AES_128_GCM_SHA256 = 0x1301,
  TLS_AES_256_GCM_SHA384 = 0x1302,
  TLS_CHACHA20_POLY1305_SHA256 = 0x1303,
  TLS_AES_128_CCM_SHA256 = 0x1304,
  TLS_AES_128_CCM_8_SHA256 = 0x1305,
  // TLS 1.2 forward secret AEAD
  TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 = 0xc02b,
  TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 = 0xc02f,
  TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 = 0xc02c,
  TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 = 0xc030,
  TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256 = 0xcca9,
  TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256 = 0xcca8,
  // Legacy suites kept for old servers, these are on the HTTP/2 bad cipher list
  TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA = 0xc013,
  TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA = 0xc014,
  TLS_RSA_WITH_AES_128_GCM_SHA256 = 0x009c,
  TLS_RSA_WITH_AES_256_GCM_SHA384 = 0x009d,
  TLS_RSA_WITH_AES_128_CBC_SHA = 0x002f,
  TLS_RSA_WITH_AES_256_CBC_SHA = 0x0035,
  TLS_RSA_WITH_3DES_EDE_CBC_SHA = 0x000a,
  // Signalling suite, RFC 7507
  TLS_FALLBACK_SCSV = 0x5600,
}

impl fmt::Display for CipherSuite {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}
