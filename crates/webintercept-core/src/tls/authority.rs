//! Local certificate authority and per-host leaf forge

use super::crypto_provider;
use crate::{Error, Result};
use parking_lot::Mutex;
use rand::RngCore;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

const CA_CERT_FILE: &str = "ca-cert.pem";
const CA_KEY_FILE: &str = "ca-key.pem";
const CA_COMMON_NAME: &str = "Web Intercept CA";
const CA_VALIDITY_DAYS: i64 = 3650;
const LEAF_VALIDITY_DAYS: i64 = 825;

/// A leaf certificate chain plus private key, ready to serve TLS for one host
#[derive(Debug, Clone)]
pub struct ForgedIdentity {
    /// Leaf first, CA second
    pub cert_chain: Vec<CertificateDer<'static>>,
    /// PKCS#8 private key DER
    pub key_der: Vec<u8>,
    /// rustls server configuration built from the above
    pub server_config: Arc<rustls::ServerConfig>,
}

/// CA keypair with an in-memory cache of forged leaf identities.
///
/// `identity_for` is idempotent per host for the process lifetime; the target
/// set of an interception session is small, so the cache never evicts.
pub struct CertificateAuthority {
    ca_cert_pem: String,
    ca_params: CertificateParams,
    ca_cert: Certificate,
    ca_key: KeyPair,
    cache: Mutex<HashMap<String, ForgedIdentity>>,
}

impl CertificateAuthority {
    /// Load the CA from `cert_dir`, generating and persisting a fresh one if
    /// no material exists yet.
    pub fn load_or_create(cert_dir: &Path) -> Result<Self> {
        let cert_path = cert_dir.join(CA_CERT_FILE);
        let key_path = cert_dir.join(CA_KEY_FILE);

        if cert_path.exists() && key_path.exists() {
            let cert_pem = std::fs::read_to_string(&cert_path)?;
            let key_pem = std::fs::read_to_string(&key_path)?;
            info!(path = %cert_path.display(), "loaded existing CA certificate");
            return Self::from_pem(&cert_pem, &key_pem);
        }

        std::fs::create_dir_all(cert_dir)?;
        let (cert_pem, key_pem) = Self::generate_ca_pem()?;
        std::fs::write(&cert_path, &cert_pem)?;
        std::fs::write(&key_path, &key_pem)?;
        info!(path = %cert_path.display(), "generated new CA certificate");
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Build the authority from existing PEM material
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let ca_key = KeyPair::from_pem(key_pem)?;
        let ca_params = CertificateParams::from_ca_cert_pem(cert_pem)?;
        // Re-signing with the same parameters and key yields a certificate
        // usable as the issuer handle; clients validate against the PEM that
        // was actually installed, so only the name and key must agree.
        let ca_cert = ca_params.clone().self_signed(&ca_key)?;
        Ok(Self {
            ca_cert_pem: cert_pem.to_string(),
            ca_params,
            ca_cert,
            ca_key,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Generate fresh CA material as (cert PEM, key PEM)
    fn generate_ca_pem() -> Result<(String, String)> {
        let key = KeyPair::generate()?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, "US");
        dn.push(DnType::OrganizationName, "webintercept");
        dn.push(DnType::CommonName, CA_COMMON_NAME);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
        ];
        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1);
        params.not_after = now + Duration::days(CA_VALIDITY_DAYS);
        params.serial_number = Some(random_serial());

        let cert = params.self_signed(&key)?;
        Ok((cert.pem(), key.serialize_pem()))
    }

    /// The CA certificate as PEM, for export to client trust stores
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// Return the TLS identity for `host`, forging and caching it on first use.
    ///
    /// Never falls back to a wildcard: a malformed hostname is an error.
    pub fn identity_for(&self, host: &str) -> Result<ForgedIdentity> {
        if !is_valid_host(host) {
            return Err(Error::invalid_hostname(host));
        }

        if let Some(identity) = self.cache.lock().get(host) {
            return Ok(identity.clone());
        }

        let identity = self.forge(host)?;
        debug!(host, "forged leaf certificate");
        self.cache
            .lock()
            .entry(host.to_string())
            .or_insert(identity.clone());
        Ok(identity)
    }

    fn forge(&self, host: &str) -> Result<ForgedIdentity> {
        let leaf_key = KeyPair::generate()?;

        // CertificateParams::new turns an IP-shaped string into an IP SAN.
        let mut params = CertificateParams::new(vec![host.to_string()])?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, host);
        params.distinguished_name = dn;
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.serial_number = Some(random_serial());

        // Leaf validity: [now - 1 day, now + 825 days] clipped to the CA's own window.
        let now = OffsetDateTime::now_utc();
        params.not_before = (now - Duration::days(1)).max(self.ca_params.not_before);
        params.not_after = (now + Duration::days(LEAF_VALIDITY_DAYS)).min(self.ca_params.not_after);

        let leaf = params.signed_by(&leaf_key, &self.ca_cert, &self.ca_key)?;

        let cert_chain = vec![leaf.der().clone(), self.ca_cert.der().clone()];
        let key_der = leaf_key.serialize_der();

        let server_config = rustls::ServerConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(
                cert_chain.clone(),
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der.clone())),
            )?;

        Ok(ForgedIdentity {
            cert_chain,
            key_der,
            server_config: Arc::new(server_config),
        })
    }
}

fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    // Clear the top bit so the DER integer stays positive without padding.
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}

fn is_valid_host(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> CertificateAuthority {
        let (cert_pem, key_pem) = CertificateAuthority::generate_ca_pem().expect("generate CA");
        CertificateAuthority::from_pem(&cert_pem, &key_pem).expect("load CA")
    }

    #[test]
    fn identity_is_cached_per_host() {
        let ca = authority();
        let first = ca.identity_for("secure.test").expect("forge");
        let second = ca.identity_for("secure.test").expect("cached");
        assert_eq!(first.cert_chain[0], second.cert_chain[0]);
        assert_eq!(first.cert_chain.len(), 2);
    }

    #[test]
    fn malformed_hostname_is_rejected() {
        let ca = authority();
        assert!(matches!(
            ca.identity_for("bad host!"),
            Err(Error::InvalidHostname { .. })
        ));
        assert!(matches!(ca.identity_for(""), Err(Error::InvalidHostname { .. })));
        assert!(ca.identity_for("10.0.0.7").is_ok());
    }

    #[test]
    fn load_or_create_persists_material() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ca1 = CertificateAuthority::load_or_create(dir.path()).expect("create");
        let pem1 = ca1.ca_cert_pem().to_string();

        let ca2 = CertificateAuthority::load_or_create(dir.path()).expect("reload");
        assert_eq!(pem1, ca2.ca_cert_pem());
        assert!(pem1.contains("BEGIN CERTIFICATE"));
    }
}
