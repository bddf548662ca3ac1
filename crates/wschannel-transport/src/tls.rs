//! TLS material loading.
//!
//! Both channel types use rustls with the ring provider selected explicitly, so
//! the process-wide default provider is never consulted.

use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::{self, PemObject};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tracing::debug;

use wschannel_core::{TlsError, TlsResult};

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn pem_error(path: &Path, e: pem::Error) -> TlsError {
    TlsError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Reads every PEM certificate in `path`.
pub fn load_certs(path: &Path) -> TlsResult<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| pem_error(path, e))?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificatesFound(path.to_path_buf()));
    }
    Ok(certs)
}

/// Reads the first PEM private key (PKCS#1, PKCS#8 or SEC1) in `path`.
pub fn load_private_key(path: &Path) -> TlsResult<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_file(path).map_err(|e| match e {
        pem::Error::NoItemsFound => TlsError::NoPrivateKeyFound(path.to_path_buf()),
        e => pem_error(path, e),
    })
}

/// Builds a client configuration that trusts only the certificates in
/// `ca_file`.
pub fn client_config(ca_file: &Path) -> TlsResult<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(load_certs(ca_file)?);
    if added == 0 {
        return Err(TlsError::NoCertificatesFound(ca_file.to_path_buf()));
    }
    debug!(path = %ca_file.display(), added, ignored, "Loaded certificate authorities");

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Configuration(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// Builds a server configuration from a certificate chain and its private key.
pub fn server_config(cert_file: &Path, key_file: &Path) -> TlsResult<Arc<ServerConfig>> {
    let certs = load_certs(cert_file)?;
    let key = load_private_key(key_file)?;

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Configuration(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| TlsError::Configuration(e.to_string()))?;

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rcgen::{CertifiedKey, generate_simple_self_signed};
    use tempfile::TempDir;

    use super::*;

    fn write_identity(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("localhost.crt");
        let key_path = dir.path().join("localhost.key");
        fs::write(&cert_path, cert.pem()).unwrap();
        fs::write(&key_path, key_pair.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    #[test]
    fn test_load_valid_identity() {
        let dir = TempDir::new().unwrap();
        let (cert, key) = write_identity(&dir);

        assert_eq!(load_certs(&cert).unwrap().len(), 1);
        assert!(load_private_key(&key).is_ok());
        assert!(client_config(&cert).is_ok());
        assert!(server_config(&cert, &key).is_ok());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.crt");

        assert!(matches!(load_certs(&missing), Err(TlsError::Io { .. })));
    }

    #[test]
    fn test_garbage_files_are_rejected() {
        let dir = TempDir::new().unwrap();
        let garbage = dir.path().join("garbage.pem");
        fs::write(&garbage, "this is not a certificate").unwrap();

        assert_eq!(
            load_certs(&garbage),
            Err(TlsError::NoCertificatesFound(garbage.clone()))
        );
        assert_eq!(
            load_private_key(&garbage).unwrap_err(),
            TlsError::NoPrivateKeyFound(garbage.clone())
        );
        assert!(server_config(&garbage, &garbage).is_err());
    }

    #[test]
    fn test_key_is_not_a_certificate() {
        let dir = TempDir::new().unwrap();
        let (_cert, key) = write_identity(&dir);

        assert!(matches!(
            client_config(&key),
            Err(TlsError::NoCertificatesFound(_))
        ));
    }
}
