//! TLS contexts for [`Server::listen_secure`](crate::Server::listen_secure).
//!
//! Contexts built here use the `ring` provider and accept TLS 1.2 and
//! TLS 1.3 only, without client authentication.

use crate::errors::TlsError;
use rustls::{
    crypto::ring,
    pki_types::{CertificateDer, PrivateKeyDer},
    version::{TLS12, TLS13},
    ServerConfig,
};
use std::{fs::File, io::BufReader, path::Path, sync::Arc};

/// Loads a PEM certificate chain and a PEM private key (PKCS#1, PKCS#8 or
/// SEC1) and builds a server context from them.
///
/// ```no_run
/// use ferrule::{server::tls, Router, Server};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tls = tls::load_pem("certs/server.pem", "certs/server.key")?;
/// let server = Server::builder().router(Router::new()).build();
///
/// server.listen_secure("0.0.0.0:8443", tls).await?.join().await;
/// # Ok(())
/// # }
/// ```
pub fn load_pem(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<Arc<ServerConfig>, TlsError> {
    let cert_path = cert_path.as_ref();
    let key_path = key_path.as_ref();

    let certs = rustls_pemfile::certs(&mut open(cert_path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| read_error(cert_path, source))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.display().to_string()));
    }

    let key = rustls_pemfile::private_key(&mut open(key_path)?)
        .map_err(|source| read_error(key_path, source))?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.display().to_string()))?;

    server_config(certs, key)
}

/// Builds a server context from an already decoded certificate chain and key.
pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>, TlsError> {
    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_protocol_versions(&[&TLS13, &TLS12])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| read_error(path, source))
}

fn read_error(path: &Path, source: std::io::Error) -> TlsError {
    TlsError::Read {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn pem_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_files() {
        let err = load_pem("/nonexistent/cert.pem", "/nonexistent/key.pem").unwrap_err();
        assert!(matches!(err, TlsError::Read { ref path, .. } if path == "/nonexistent/cert.pem"));
    }

    #[test]
    fn empty_pem_files() {
        let cert = pem_file("not a certificate\n");
        let key = pem_file("");

        let err = load_pem(cert.path(), key.path()).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates(_)), "{err}");
    }

    #[test]
    fn missing_key() {
        // Certificate content is not validated before the key is looked up.
        let cert = pem_file("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n");
        let key = pem_file("no key here\n");

        let err = load_pem(cert.path(), key.path()).unwrap_err();
        assert!(matches!(err, TlsError::NoPrivateKey(_)), "{err}");
    }
}
