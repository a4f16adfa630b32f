//! Server certificate handling.
//!
//! The device has no CA-issued certificate. On first start (or whenever the
//! configured pair cannot be loaded) a self-signed RSA-2048 certificate for
//! `chime.local` is generated, valid for ten years, and written next to its
//! key before the listener starts.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_RSA_SHA256};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig as RustlsConfig;
use thiserror::Error;
use tracing::{info, warn};

use chime_core::fsutil::atomic_write;

/// Name the generated certificate is issued for.
pub const CERT_HOST_NAME: &str = "chime.local";

const RSA_BITS: usize = 2048;
const VALIDITY_DAYS: i64 = 3650;
const CERT_MODE: u32 = 0o644;
const KEY_MODE: u32 = 0o600;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificate found in '{}'", .0.display())]
    NoCertificate(PathBuf),

    #[error("no private key found in '{}'", .0.display())]
    NoPrivateKey(PathBuf),

    #[error("failed to generate RSA key: {0}")]
    KeyGeneration(#[from] rsa::Error),

    #[error("failed to encode private key: {0}")]
    KeyEncoding(String),

    #[error("failed to build certificate: {0}")]
    Certificate(#[from] rcgen::Error),

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Load the pair at `cert_path`/`key_path`, generating a fresh self-signed
/// pair first if loading fails for any reason.
pub fn load_or_generate(cert_path: &Path, key_path: &Path) -> Result<Arc<RustlsConfig>, TlsError> {
    match load_server_config(cert_path, key_path) {
        Ok(config) => {
            info!(cert = %cert_path.display(), "loaded TLS certificate");
            Ok(config)
        }
        Err(e) => {
            warn!(error = %e, "TLS certificate unavailable, generating a self-signed one");
            generate_self_signed(cert_path, key_path)?;
            load_server_config(cert_path, key_path)
        }
    }
}

/// Build a rustls server config from PEM files.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<RustlsConfig>, TlsError> {
    let certs = read_certificates(cert_path)?;
    let key = read_private_key(key_path)?;

    let config = RustlsConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Arc::new(config))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path).map(BufReader::new).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// All certificates in a PEM file, in file order.
pub fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

/// Generate a self-signed certificate and write it (0644) and its PKCS#8
/// key (0600) to the given paths.
pub fn generate_self_signed(cert_path: &Path, key_path: &Path) -> Result<(), TlsError> {
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_BITS)?;
    let key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| TlsError::KeyEncoding(e.to_string()))?;
    let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &PKCS_RSA_SHA256)?;

    let mut params = CertificateParams::new(vec![CERT_HOST_NAME.to_string()])?;
    let mut subject = DistinguishedName::new();
    subject.push(DnType::CountryName, "US");
    subject.push(DnType::OrganizationName, "VirtualChime");
    subject.push(DnType::CommonName, CERT_HOST_NAME);
    params.distinguished_name = subject;

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(VALIDITY_DAYS);

    let certificate = params.self_signed(&key_pair)?;

    write_file(key_path, key_pem.as_bytes(), KEY_MODE)?;
    write_file(cert_path, certificate.pem().as_bytes(), CERT_MODE)?;

    info!(cert = %cert_path.display(), key = %key_path.display(), "generated self-signed certificate");
    Ok(())
}

fn write_file(path: &Path, content: &[u8], mode: u32) -> Result<(), TlsError> {
    atomic_write(path, content, mode).map_err(|source| TlsError::Write {
        path: path.to_path_buf(),
        source,
    })
}
