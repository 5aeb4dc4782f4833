//! Loading of the mutual TLS material shared by the server and the client.
//!
//! Every party holds a certificate signed by a common CA. Servers require client certificates
//! signed by that CA and identify the peer by the fingerprint of its leaf certificate.

use std::{path::Path, sync::Arc};

use quinn::rustls::{
    self,
    crypto::{ring, CryptoProvider},
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    server::WebPkiClientVerifier,
    ClientConfig, RootCertStore, ServerConfig,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::{fs, io};
use tracing::info;

use crate::config::TlsConfig;

/// Errors that occur while loading TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A file could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// The offending file.
        path: String,

        /// The underlying error.
        source: io::Error,
    },

    /// A file does not contain the expected material.
    #[error("{0}")]
    Invalid(String),

    /// rustls rejected the configuration.
    #[error("rustls: {0}")]
    Rustls(#[from] rustls::Error),

    /// The client verifier could not be built.
    #[error("client verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// The node's certificate chain, key and trusted CA.
#[derive(Debug)]
pub struct TlsIdentity {
    /// Certificate chain, leaf first.
    pub certs: Vec<CertificateDer<'static>>,

    /// Private key of the leaf.
    pub key: PrivateKeyDer<'static>,

    /// CA certificates trusted for peers.
    pub roots: RootCertStore,
}

impl Clone for TlsIdentity {
    fn clone(&self) -> Self {
        Self {
            certs: self.certs.clone(),
            key: self.key.clone_key(),
            roots: self.roots.clone(),
        }
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(ring::default_provider())
}

/// Reads the identity described by `conf`.
pub async fn load_identity(conf: &TlsConfig) -> Result<TlsIdentity, TlsError> {
    let key_bytes = read(&conf.key).await?;
    let key = if conf.key.extension().is_some_and(|x| x == "der") {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_bytes))
    } else {
        rustls_pemfile::private_key(&mut &*key_bytes)
            .map_err(|e| TlsError::Invalid(format!("{}: {e}", conf.key.display())))?
            .ok_or_else(|| TlsError::Invalid(format!("{}: no private key", conf.key.display())))?
    };

    let certs = read_certs(&conf.cert).await?;
    if certs.is_empty() {
        return Err(TlsError::Invalid(format!(
            "{}: no certificate",
            conf.cert.display()
        )));
    }

    let ca_certs = read_certs(&conf.ca).await?;
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(ca_certs);
    info!(
        "Added {} certificates to the peer CA store, ignored {}",
        added, ignored
    );
    if added == 0 {
        return Err(TlsError::Invalid(format!(
            "{}: no usable CA certificate",
            conf.ca.display()
        )));
    }

    Ok(TlsIdentity { certs, key, roots })
}

/// Server side configuration requiring client certificates issued by the trusted CA.
pub fn server_config(identity: &TlsIdentity) -> Result<ServerConfig, TlsError> {
    let verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(identity.roots.clone()), provider())
            .build()?;

    Ok(ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_client_cert_verifier(verifier)
        .with_single_cert(identity.certs.clone(), identity.key.clone_key())?)
}

/// Client side configuration presenting the node's certificate.
pub fn client_config(identity: &TlsIdentity) -> Result<ClientConfig, TlsError> {
    Ok(ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_root_certificates(identity.roots.clone())
        .with_client_auth_cert(identity.certs.clone(), identity.key.clone_key())?)
}

/// SHA-256 of a certificate's DER encoding.
pub fn fingerprint(cert: &CertificateDer<'_>) -> [u8; 32] {
    Sha256::digest(cert.as_ref()).into()
}

async fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).await.map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })
}

async fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let bytes = read(path).await?;
    if path.extension().is_some_and(|x| x == "der") {
        Ok(vec![CertificateDer::from(bytes)])
    } else {
        rustls_pemfile::certs(&mut &*bytes)
            .collect::<Result<_, _>>()
            .map_err(|e| TlsError::Invalid(format!("{}: {e}", path.display())))
    }
}
