//! rustls config construction for the TLS binding. Identities come from
//! `TBENCH_TLS_CERT`/`TBENCH_TLS_KEY` (server) and `TBENCH_TLS_CA` (client);
//! absent those, the server generates a self-signed identity and the client
//! skips verification.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tracing::{info, warn};

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

pub fn server_config() -> Result<ServerConfig> {
    let (certs, key) = server_identity()?;
    ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .context("selecting TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid TLS server identity")
}

pub fn client_config() -> Result<ClientConfig> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .context("selecting TLS protocol versions")?;
    let config = match env::var("TBENCH_TLS_CA") {
        Ok(ca_path) => {
            let mut roots = RootCertStore::empty();
            for cert in CertificateDer::pem_file_iter(&ca_path)
                .with_context(|| format!("reading CA bundle {ca_path}"))?
            {
                roots
                    .add(cert.context("parsing CA certificate")?)
                    .context("adding CA certificate to root store")?;
            }
            info!(ca = %ca_path, "using CA bundle for TLS server verification");
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        Err(_) => {
            warn!("TBENCH_TLS_CA not set, accepting any TLS server certificate");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new(provider())))
                .with_no_client_auth()
        }
    };
    Ok(config)
}

fn server_identity() -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    if let (Ok(cert_path), Ok(key_path)) = (env::var("TBENCH_TLS_CERT"), env::var("TBENCH_TLS_KEY")) {
        let certs = CertificateDer::pem_file_iter(&cert_path)
            .with_context(|| format!("reading certificate chain {cert_path}"))?
            .collect::<Result<Vec<_>, _>>()
            .context("parsing certificate chain")?;
        let key = PrivateKeyDer::from_pem_file(&key_path)
            .with_context(|| format!("reading private key {key_path}"))?;
        info!(cert = %cert_path, "using TLS identity from environment");
        return Ok((certs, key));
    }
    info!("TBENCH_TLS_CERT/TBENCH_TLS_KEY not set, generating a self-signed TLS identity");
    generated_identity()
}

pub(crate) fn generated_identity() -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .context("generating self-signed identity")?;
    let key = PrivateKeyDer::Pkcs8(key_pair.serialize_der().into());
    Ok((vec![cert.der().clone()], key))
}

/// Verifier for deployments without a provisioned trust anchor. Signature
/// checks still run; only the chain-to-root check is skipped.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyServerCert {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
