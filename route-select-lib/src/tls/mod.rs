mod selector;
mod spec;
mod version;

pub use selector::{ConnectionSpecSelector, retry_with_fallback};
pub use spec::{ConnectionSpec, ConnectionSpecBuilder, SecureSocket};
pub use version::{CipherSuite, TlsVersion};

#[cfg(test)]
pub(crate) use spec::tests::FakeSecureSocket;
