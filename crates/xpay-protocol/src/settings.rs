//! Merchant-side configuration consumed by the gateway.
//!
//! The surrounding platform owns how these values are sourced (env, admin
//! screens, …); the protocol only reads them.

use serde::{Deserialize, Serialize};

/// Which billing field identifies the payer to XPAY in the `acc` query
/// parameter. Defaults to phone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifiedBy {
    #[default]
    Phone,
    Email,
}

impl IdentifiedBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "phone" => Some(Self::Phone),
            "email" => Some(Self::Email),
            _ => None,
        }
    }
}

/// Which order-item field becomes the `Caption` of a payment-info line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionSource {
    #[default]
    Name,
    ShortDescription,
}

impl CaptionSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "short_description" => Some(Self::ShortDescription),
            _ => None,
        }
    }
}

/// Settings for one XPAY partner integration.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Partner id issued by XPAY (`pid` query parameter).
    pub partner_id: String,
    /// Base URL of the XPAY payment widget.
    pub service_url: String,
    /// PEM-encoded RSA public key for callback signatures. `None` means
    /// every callback is rejected with a signature error.
    pub public_key_pem: Option<String>,
    /// The address XPAY must notify on completion. Server-of-record value,
    /// never taken from a request.
    pub callback_url: String,
    /// Payer identity selection for the `acc` parameter.
    pub identified_by: IdentifiedBy,
    /// Whether order line items are embedded in the payload.
    pub show_payment_info: bool,
    pub payment_info_caption: CaptionSource,
    /// Master switch for inbound callback processing.
    pub process_callback: bool,
    /// Success-redirect page, resolved by the platform's page lookup.
    pub return_url: Option<String>,
    /// Manually configured success URL; wins over `return_url` when set.
    pub return_url_override: Option<String>,
    /// Whether the storefront opens the pay link in a new window. Consumed
    /// by the storefront, carried here because it is part of the same
    /// configuration surface.
    pub open_in_new_window: bool,
}

impl GatewaySettings {
    /// The success-redirect URL embedded in the outbound payload: the manual
    /// override when present, otherwise the configured return page.
    pub fn success_return_url(&self) -> Option<&str> {
        self.return_url_override
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(self.return_url.as_deref())
    }
}
