use thiserror::Error;

/// Errors produced by the payment handshake.
///
/// Every variant is converted to the partner's single rejection code `"21"`
/// at the callback boundary; the variants exist so the service can log and
/// count infrastructure faults separately from routine rejections.
#[derive(Debug, Error)]
pub enum XpayError {
    /// Request body/query could not be read as structured data.
    #[error("parse error: {0}")]
    Parse(String),

    /// A required field is missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Signature verification could not run: malformed base64, malformed
    /// signature bytes, or no usable public key. Distinct from a clean
    /// mismatch, which is reported as `Ok(false)` by the verifier.
    #[error("signature error: {0}")]
    Signature(String),

    /// Verification ran and the signature did not match. Routine rejection,
    /// often adversarial noise.
    #[error("signature mismatch")]
    InvalidSignature,

    /// Callback `command` is anything other than `pay`.
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// Order already in `processing` or a terminal state.
    #[error("order {txn_id} already in state {status}")]
    IllegalTransition { txn_id: String, status: String },

    /// Order store failed or timed out. Infrastructure fault, not a
    /// routine rejection.
    #[error("order store unavailable: {0}")]
    StoreUnavailable(String),

    /// Callback processing is administratively disabled.
    #[error("callback processing disabled")]
    ConfigDisabled,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for XpayError {
    fn from(e: rusqlite::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}
