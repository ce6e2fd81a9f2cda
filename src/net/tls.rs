//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls_pemfile::{certs, private_key};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{RootCertStore, ServerConfig};
use tracing::info;

use crate::config::TlsConfig;
use crate::error::ServerError;

/// Build a rustls server config from PEM files.
///
/// A non-empty `client_ca_paths` requires clients to present a certificate
/// signed by one of those CAs.
pub fn load_tls_config(config: &TlsConfig) -> Result<Arc<ServerConfig>, ServerError> {
    let cert_chain = load_certs(Path::new(&config.cert_path))?;
    if cert_chain.is_empty() {
        return Err(tls_error(&config.cert_path, "no certificates found"));
    }
    let key = load_key(Path::new(&config.key_path))?;

    let builder = ServerConfig::builder();
    let mut server_config = if config.client_ca_paths.is_empty() {
        builder
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)
            .map_err(|e| ServerError::Tls(e.to_string()))?
    } else {
        let mut roots = RootCertStore::empty();
        for path in &config.client_ca_paths {
            for cert in load_certs(Path::new(path))? {
                roots
                    .add(cert)
                    .map_err(|e| tls_error(path, &e.to_string()))?;
            }
        }
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| ServerError::Tls(e.to_string()))?;
        info!(cas = config.client_ca_paths.len(), "Mutual TLS enabled");
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(cert_chain, key)
            .map_err(|e| ServerError::Tls(e.to_string()))?
    };

    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(server_config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path).map_err(|e| tls_error(path.display(), &e.to_string()))?;
    certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(path.display(), &e.to_string()))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path).map_err(|e| tls_error(path.display(), &e.to_string()))?;
    private_key(&mut BufReader::new(file))
        .map_err(|e| tls_error(path.display(), &e.to_string()))?
        .ok_or_else(|| tls_error(path.display(), "no private key found"))
}

fn tls_error(path: impl std::fmt::Display, reason: &str) -> ServerError {
    ServerError::Tls(format!("{path}: {reason}"))
}
