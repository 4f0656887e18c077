//! RSA signature verification for inbound callbacks.
//!
//! XPAY signs `txn_id + uuid + txn_date + sum` (exact concatenation, no
//! delimiters) with its private key; partners verify with a configured PEM
//! public key, SHA-256 digest, PKCS#1 v1.5 padding.
//!
//! Three outcomes matter to the caller:
//! - `Ok(true)` — signature valid;
//! - `Ok(false)` — verification ran, signature mismatch (often adversarial
//!   noise, logged at `warn`);
//! - `Err(_)` — verification could not run (malformed base64, unusable
//!   key), logged at `error` and counted separately.
//!
//! Both of the last two are rejections at the protocol boundary. Key
//! material never appears in logs or error strings.

use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::Sha256;

use crate::error::XpayError;

/// Verifier bound to one partner public key.
pub struct CallbackVerifier {
    key: VerifyingKey<Sha256>,
}

impl CallbackVerifier {
    /// Parse a PEM public key. Accepts both PKCS#8 (`BEGIN PUBLIC KEY`) and
    /// PKCS#1 (`BEGIN RSA PUBLIC KEY`) encodings, since partner-issued keys
    /// show up in either form.
    pub fn from_pem(pem: &str) -> Result<Self, XpayError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|_| XpayError::Signature("unusable public key".to_string()))?;
        Ok(Self {
            key: VerifyingKey::new(key),
        })
    }

    /// Verify `signature_b64` over `signed_text`. Fails closed: any decode
    /// problem is an error outcome, never a pass.
    pub fn verify(&self, signed_text: &str, signature_b64: &str) -> Result<bool, XpayError> {
        let raw = STANDARD
            .decode(signature_b64.trim())
            .map_err(|_| XpayError::Signature("signature is not valid base64".to_string()))?;

        let signature = Signature::try_from(raw.as_slice())
            .map_err(|_| XpayError::Signature("malformed signature bytes".to_string()))?;

        Ok(self.key.verify(signed_text.as_bytes(), &signature).is_ok())
    }
}

impl std::fmt::Debug for CallbackVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackVerifier").finish_non_exhaustive()
    }
}
