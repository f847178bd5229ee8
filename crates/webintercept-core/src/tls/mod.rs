//! TLS material for the interception path
//!
//! [`CertificateAuthority`] owns the local CA keypair and forges leaf
//! identities for CONNECT targets. The upstream leg of a MITM tunnel runs
//! through the shared HTTP client, which accepts invalid certificates the way
//! an interception tool must.

mod authority;

pub use authority::{CertificateAuthority, ForgedIdentity};

use std::sync::Arc;

/// Crypto provider for the client-facing TLS leg
pub(crate) fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}
