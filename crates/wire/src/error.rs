use crate::model::ErrorCode;

/// Errors raised while encoding or decoding the wire protocol.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("access out of range")]
    Range,

    #[error("payload too large: {len} bytes (max 252)")]
    PayloadTooLarge { len: usize },

    #[error("decode error: {reason}")]
    DecodeError { reason: String },

    #[error("device reported error: {0:?}")]
    Device(ErrorCode),
}

impl WireError {
    pub fn decode(reason: impl Into<String>) -> Self {
        WireError::DecodeError {
            reason: reason.into(),
        }
    }
}
