//! Outbound payment-initiation payload.
//!
//! Field names are fixed and case-sensitive per the partner contract; the
//! serde renames below are the wire format, do not touch them.

use serde::Serialize;

use crate::amount::normalize_phone;
use crate::settings::{CaptionSource, GatewaySettings, IdentifiedBy};
use crate::store::Order;

/// One `{Caption, Value}` line of the optional payment-info block.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInfoItem {
    #[serde(rename = "Caption")]
    pub caption: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Success-redirect callback block.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessCallback {
    #[serde(rename = "URL")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallbackBlock {
    #[serde(rename = "PaySuccess")]
    pub pay_success: SuccessCallback,
}

/// The payment-initiation request serialized into the `data` token.
/// Constructed per order, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiationRequest {
    #[serde(rename = "Email")]
    pub email: String,
    /// Digits only; `+ - ( )` are stripped at construction.
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "LastName")]
    pub last_name: String,
    #[serde(rename = "ClientIP")]
    pub client_ip: String,
    /// Opaque client-supplied token, not validated beyond presence.
    #[serde(rename = "BrowserFingerprint")]
    pub browser_fingerprint: String,
    /// String form of the order id. The idempotency key for the protocol.
    pub txn_id: String,
    #[serde(rename = "Currency")]
    pub currency: String,
    #[serde(rename = "PaymentInfo")]
    pub payment_info: Vec<PaymentInfoItem>,
    /// Where XPAY posts the payment result. Always the server-configured
    /// address — a client can never steer the callback elsewhere.
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "Callback", skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackBlock>,
}

impl PaymentInitiationRequest {
    /// Assemble the payload from order/billing/settings data. Only
    /// `fingerprint` originates from the payer's browser.
    pub fn from_order(
        order: &Order,
        settings: &GatewaySettings,
        client_ip: &str,
        fingerprint: &str,
    ) -> Self {
        let payment_info = if settings.show_payment_info {
            order
                .line_items
                .iter()
                .map(|item| PaymentInfoItem {
                    caption: match settings.payment_info_caption {
                        CaptionSource::Name => item.name.clone(),
                        CaptionSource::ShortDescription => item
                            .short_description
                            .clone()
                            .unwrap_or_else(|| item.name.clone()),
                    },
                    value: item.total.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            email: order.billing.email.clone(),
            phone: normalize_phone(&order.billing.phone),
            first_name: order.billing.first_name.clone(),
            last_name: order.billing.last_name.clone(),
            client_ip: client_ip.to_string(),
            browser_fingerprint: fingerprint.to_string(),
            txn_id: order.txn_id.clone(),
            currency: order.currency.clone(),
            payment_info,
            callback_url: settings.callback_url.clone(),
            callback: settings.success_return_url().map(|url| CallbackBlock {
                pay_success: SuccessCallback {
                    url: url.to_string(),
                },
            }),
        }
    }

    /// The outward-facing account identifier (`acc` query parameter).
    pub fn account_identity(&self, identified_by: IdentifiedBy) -> &str {
        match identified_by {
            IdentifiedBy::Phone => &self.phone,
            IdentifiedBy::Email => &self.email,
        }
    }
}
