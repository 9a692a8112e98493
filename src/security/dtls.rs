//! webrtc-dtls config construction for the three DTLS handshake modes.
//! The server enables the PSK and certificate suites side by side so any
//! client mode can connect to the single DTLS endpoint.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::CertificateDer;
use tracing::{info, warn};
use webrtc_dtls::cipher_suite::CipherSuiteId;
use webrtc_dtls::config::{Config, ExtendedMasterSecretType};
use webrtc_dtls::crypto::Certificate;

use super::{psk_secret, SecurityMode, PSK_IDENTITY};

pub fn client_config(mode: SecurityMode) -> Result<Config> {
    let config = match mode {
        SecurityMode::PreSharedKey => Config {
            psk: Some(Arc::new(|_hint: &[u8]| Ok(psk_secret()))),
            psk_identity_hint: Some(PSK_IDENTITY.to_vec()),
            cipher_suites: vec![CipherSuiteId::Tls_Psk_With_Aes_128_Ccm_8],
            extended_master_secret: ExtendedMasterSecretType::Require,
            ..Default::default()
        },
        SecurityMode::RawPublicKey => Config {
            // the peer is identified by its key alone, pinning is a
            // deployment concern
            insecure_skip_verify: true,
            cipher_suites: vec![CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256],
            extended_master_secret: ExtendedMasterSecretType::Require,
            ..Default::default()
        },
        SecurityMode::Certificate => {
            let mut config = Config {
                cipher_suites: vec![CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256],
                extended_master_secret: ExtendedMasterSecretType::Require,
                ..Default::default()
            };
            match env::var("TBENCH_DTLS_CA") {
                Ok(ca_path) => {
                    for cert in CertificateDer::pem_file_iter(&ca_path)
                        .with_context(|| format!("reading CA bundle {ca_path}"))?
                    {
                        config
                            .roots_cas
                            .add(cert.context("parsing CA certificate")?)
                            .context("adding CA certificate to root store")?;
                    }
                    info!(ca = %ca_path, "using CA bundle for DTLS server verification");
                }
                Err(_) => {
                    warn!("TBENCH_DTLS_CA not set, accepting any DTLS server certificate");
                    config.insecure_skip_verify = true;
                }
            }
            config
        }
    };
    Ok(config)
}

pub fn server_config() -> Result<Config> {
    let certificate = Certificate::generate_self_signed(vec!["localhost".to_string()])
        .context("generating self-signed DTLS identity")?;
    Ok(Config {
        certificates: vec![certificate],
        psk: Some(Arc::new(|_hint: &[u8]| Ok(psk_secret()))),
        psk_identity_hint: Some(PSK_IDENTITY.to_vec()),
        cipher_suites: vec![
            CipherSuiteId::Tls_Psk_With_Aes_128_Ccm_8,
            CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256,
        ],
        extended_master_secret: ExtendedMasterSecretType::Require,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_configs_build_for_all_modes() {
        for mode in [
            SecurityMode::PreSharedKey,
            SecurityMode::RawPublicKey,
            SecurityMode::Certificate,
        ] {
            client_config(mode).unwrap();
        }
    }

    #[test]
    fn psk_callback_returns_secret() {
        let config = client_config(SecurityMode::PreSharedKey).unwrap();
        let psk = config.psk.unwrap();
        assert_eq!(psk(b"hint").unwrap(), psk_secret());
    }

    #[test]
    fn server_enables_psk_and_certificate_suites() {
        let config = server_config().unwrap();
        assert_eq!(config.certificates.len(), 1);
        assert!(config.psk.is_some());
        assert_eq!(config.cipher_suites.len(), 2);
    }
}
