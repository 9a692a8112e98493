pub mod dtls;
pub mod tls;

/// How a handshake-secured transport authenticates the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityMode {
    PreSharedKey,
    RawPublicKey,
    Certificate,
}

/// Identity presented in the PSK handshake.
pub const PSK_IDENTITY: &[u8] = b"Client_identity";

const DEFAULT_PSK: &[u8] = b"secretPSK";

/// Pre-shared key material, overridable via `TBENCH_PSK` on both sides.
pub fn psk_secret() -> Vec<u8> {
    match std::env::var("TBENCH_PSK") {
        Ok(value) => value.into_bytes(),
        Err(_) => DEFAULT_PSK.to_vec(),
    }
}
