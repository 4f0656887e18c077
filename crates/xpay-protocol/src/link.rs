//! Outbound pay-link composition.

use crate::amount::minor_units;
use crate::codec::encode_payload;
use crate::error::XpayError;
use crate::payload::PaymentInitiationRequest;
use crate::settings::GatewaySettings;
use crate::store::Order;

/// Compose the payment-initiation URL:
/// `base?pid=<partnerId>&acc=<identity>&sum=<minorUnits>&data=<token>`.
///
/// Everything except `fingerprint` (and the connection-derived `client_ip`)
/// is taken from order, billing and settings data — the payer's browser has
/// no say in the amount, identity or callback address.
pub fn build_pay_link(
    settings: &GatewaySettings,
    order: &Order,
    client_ip: &str,
    fingerprint: &str,
) -> Result<String, XpayError> {
    let request = PaymentInitiationRequest::from_order(order, settings, client_ip, fingerprint);
    let sum = minor_units(&order.total)?;
    // Percent-encoded: an email identity may carry `+`, which would decode
    // to a space on the partner side if passed through raw.
    let acc = urlencoding::encode(request.account_identity(settings.identified_by));
    let data = encode_payload(&request)?;

    Ok(format!(
        "{base}?pid={pid}&acc={acc}&sum={sum}&data={data}",
        base = settings.service_url,
        pid = settings.partner_id,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{CaptionSource, IdentifiedBy};
    use crate::store::{BillingInfo, OrderStatus};

    fn order() -> Order {
        Order {
            txn_id: "1001".to_string(),
            status: OrderStatus::Pending,
            total: "19.999".to_string(),
            currency: "UAH".to_string(),
            billing: BillingInfo {
                email: "payer@example.com".to_string(),
                phone: "+38(067)123-45-67".to_string(),
                first_name: "Olena".to_string(),
                last_name: "Kovalenko".to_string(),
            },
            line_items: Vec::new(),
        }
    }

    fn settings() -> GatewaySettings {
        GatewaySettings {
            partner_id: "12345".to_string(),
            service_url: "https://mapi.xpay.example/widget".to_string(),
            public_key_pem: None,
            callback_url: "https://shop.example/process-pay".to_string(),
            identified_by: IdentifiedBy::Phone,
            show_payment_info: false,
            payment_info_caption: CaptionSource::Name,
            process_callback: true,
            return_url: None,
            return_url_override: None,
            open_in_new_window: false,
        }
    }

    #[test]
    fn link_shape_and_truncated_sum() {
        let url = build_pay_link(&settings(), &order(), "10.0.0.7", "fp-1").unwrap();
        assert!(url.starts_with("https://mapi.xpay.example/widget?pid=12345&acc=380671234567&sum=1999&data="));
        // The whole thing must still parse as a URL.
        let parsed = url::Url::parse(&url).unwrap();
        assert_eq!(parsed.query_pairs().count(), 4);
    }

    #[test]
    fn email_identity_mode() {
        let mut s = settings();
        s.identified_by = IdentifiedBy::Email;
        let url = build_pay_link(&s, &order(), "10.0.0.7", "fp-1").unwrap();
        assert!(url.contains("&acc=payer%40example.com&"));
    }

    #[test]
    fn email_identity_survives_query_decoding() {
        let mut s = settings();
        s.identified_by = IdentifiedBy::Email;
        let mut o = order();
        o.billing.email = "payer+tag@example.com".to_string();

        let url = build_pay_link(&s, &o, "10.0.0.7", "fp-1").unwrap();
        assert!(url.contains("&acc=payer%2Btag%40example.com&"));

        let parsed = url::Url::parse(&url).unwrap();
        let (_, acc) = parsed.query_pairs().find(|(k, _)| k == "acc").unwrap();
        assert_eq!(acc, "payer+tag@example.com");
    }

    #[test]
    fn malformed_total_is_rejected() {
        let mut o = order();
        o.total = "nineteen".to_string();
        assert!(matches!(
            build_pay_link(&settings(), &o, "10.0.0.7", "fp-1"),
            Err(XpayError::Validation(_))
        ));
    }
}
