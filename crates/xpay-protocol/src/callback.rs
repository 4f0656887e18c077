//! Inbound callback message and the fixed-shape wire response.

use std::collections::HashMap;

use serde::Serialize;

use crate::sanitize;

/// Accepted: the order moved to `processing`.
pub const RESULT_ACCEPTED: &str = "10";
/// Rejected: every failure category, differentiated only by `message`.
pub const RESULT_REJECTED: &str = "21";

/// The inbound payment-result message. Every field arrives as untrusted
/// text and is sanitized at extraction; `sign` covers the concatenation
/// `txn_id + uuid + txn_date + sum`, in that order, with no delimiters.
#[derive(Debug, Clone, Default)]
pub struct CallbackMessage {
    pub txn_id: Option<String>,
    pub uuid: Option<String>,
    pub txn_date: Option<String>,
    pub sum: Option<String>,
    pub sign: Option<String>,
    pub command: Option<String>,
}

impl CallbackMessage {
    /// Extract and sanitize the protocol fields from a parsed request.
    /// Unknown keys are ignored; no semantic validation happens here.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let field = |name: &str| sanitize::optional_field(fields.get(name).map(String::as_str));
        Self {
            txn_id: field("txn_id"),
            uuid: field("uuid"),
            txn_date: field("txn_date"),
            sum: field("sum"),
            sign: field("sign"),
            command: field("command"),
        }
    }

    /// The exact byte sequence the partner signed. Absent fields contribute
    /// nothing, matching the partner's concatenation of raw values.
    pub fn signed_text(&self) -> String {
        let mut text = String::new();
        for part in [&self.txn_id, &self.uuid, &self.txn_date, &self.sum] {
            if let Some(value) = part {
                text.push_str(value);
            }
        }
        text
    }
}

/// The fixed-shape body returned for every callback, success or rejection.
/// The HTTP status is always 200; the partner reads `result`.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackResponse {
    pub result: &'static str,
    pub txn_id: Option<String>,
    pub message: String,
    /// `YYYYMMDDhhmmss`, server local time.
    pub date_time: String,
}

impl CallbackResponse {
    fn stamp() -> String {
        chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
    }

    pub fn accepted(txn_id: String) -> Self {
        Self {
            result: RESULT_ACCEPTED,
            txn_id: Some(txn_id),
            message: "Ok".to_string(),
            date_time: Self::stamp(),
        }
    }

    pub fn rejected(txn_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            result: RESULT_REJECTED,
            txn_id,
            message: message.into(),
            date_time: Self::stamp(),
        }
    }
}
