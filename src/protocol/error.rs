use thiserror::Error;

/// Errors produced while encoding or decoding wire frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame truncated: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("path too long: {0} bytes")]
    PathTooLong(usize),

    #[error("path is not valid UTF-8")]
    InvalidPath,
}
