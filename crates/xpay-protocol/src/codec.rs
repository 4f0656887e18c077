//! Wire encoding of the outbound payload.
//!
//! JSON → gzip → base64 → percent-encode. The pipeline is deterministic for
//! a given payload (struct field order fixes the JSON key order); only the
//! forward direction ships — XPAY does the decoding.

use std::io::Write;

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::XpayError;
use crate::payload::PaymentInitiationRequest;

/// Encode the payload into the URL-safe `data` token.
pub fn encode_payload(request: &PaymentInitiationRequest) -> Result<String, XpayError> {
    let json = serde_json::to_vec(request)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| XpayError::Validation(format!("payload compression failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| XpayError::Validation(format!("payload compression failed: {e}")))?;

    let b64 = STANDARD.encode(compressed);
    Ok(urlencoding::encode(&b64).into_owned())
}
