//! The payment handshake service.
//!
//! [`XpayGateway`] is an explicitly constructed value injected with its
//! settings and order store at startup — no lazily initialized singleton.
//! It exposes the two protocol operations the surrounding platform consumes:
//! [`XpayGateway::build_pay_link`] and [`XpayGateway::handle_callback`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::amount::minor_units;
use crate::callback::{CallbackMessage, CallbackResponse};
use crate::error::XpayError;
use crate::link;
use crate::settings::GatewaySettings;
use crate::store::{OrderStore, Transition};
use crate::verify::CallbackVerifier;

/// Partner-visible rejection messages. Free text by protocol design; the
/// single `"21"` code carries no category, only `message` differentiates.
mod msg {
    pub const DISABLED: &str = "Processing pay callback disabled.";
    pub const PARSE: &str = "Not JSON";
    pub const SIGNATURE: &str = "Signature not valid!";
    pub const COMMAND: &str = "Only pay command supported!";
    pub const TXN_ID: &str = "txn_id is required!";
    pub const STORE: &str = "Error while getting order by txn_id!";
    pub const NOT_FOUND: &str = "No Orders found for this txn_id!";
    pub const SETTLED: &str = "Order already processed or in terminal state.";
}

pub struct XpayGateway {
    settings: GatewaySettings,
    store: Arc<dyn OrderStore>,
    verifier: Option<CallbackVerifier>,
}

impl XpayGateway {
    /// Build the gateway, parsing the configured public key up front so a
    /// broken key fails at startup instead of on the first callback.
    pub fn new(settings: GatewaySettings, store: Arc<dyn OrderStore>) -> Result<Self, XpayError> {
        let verifier = settings
            .public_key_pem
            .as_deref()
            .map(CallbackVerifier::from_pem)
            .transpose()?;
        if verifier.is_none() {
            tracing::warn!("no XPAY public key configured; every callback will be rejected");
        }
        Ok(Self {
            settings,
            store,
            verifier,
        })
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Liveness of the order store, for health checks.
    pub fn ping_store(&self) -> Result<(), XpayError> {
        self.store.ping()
    }

    /// Build the outbound payment-initiation URL for an order. The payer's
    /// browser supplies only `order_id` and `fingerprint`; `client_ip` comes
    /// from the connection and everything else from order/settings data.
    pub fn build_pay_link(
        &self,
        order_id: &str,
        client_ip: &str,
        fingerprint: &str,
    ) -> Result<String, XpayError> {
        let order = self
            .store
            .find_by_txn_id(order_id)?
            .ok_or_else(|| XpayError::OrderNotFound(order_id.to_string()))?;
        let url = link::build_pay_link(&self.settings, &order, client_ip, fingerprint)?;
        tracing::info!(txn_id = %order.txn_id, "pay link generated");
        Ok(url)
    }

    /// Run the callback pipeline and always produce a wire response.
    /// `fields` is `None` when the transport could not parse the request
    /// into key/value pairs at all.
    pub fn handle_callback(&self, fields: Option<HashMap<String, String>>) -> CallbackResponse {
        if !self.settings.process_callback {
            return CallbackResponse::rejected(None, msg::DISABLED);
        }

        let Some(fields) = fields else {
            tracing::warn!("callback request unreadable, rejecting");
            return CallbackResponse::rejected(None, msg::PARSE);
        };

        let message = CallbackMessage::from_fields(&fields);
        match self.process(&message) {
            Ok(txn_id) => {
                tracing::info!(txn_id = %txn_id, "payment callback applied, order now processing");
                CallbackResponse::accepted(txn_id)
            }
            Err(err) => {
                self.log_rejection(&message, &err);
                CallbackResponse::rejected(message.txn_id.clone(), rejection_message(&err))
            }
        }
    }

    /// The sequential validation pipeline: signature, command, txn_id,
    /// order resolution, idempotent transition. Check order matches the
    /// partner's reference flow.
    fn process(&self, message: &CallbackMessage) -> Result<String, XpayError> {
        let verifier = self
            .verifier
            .as_ref()
            .ok_or_else(|| XpayError::Signature("no public key configured".to_string()))?;
        let sign = message
            .sign
            .as_deref()
            .ok_or_else(|| XpayError::Signature("sign field missing".to_string()))?;

        if !verifier.verify(&message.signed_text(), sign)? {
            return Err(XpayError::InvalidSignature);
        }

        if message.command.as_deref() != Some("pay") {
            return Err(XpayError::UnsupportedCommand(
                message.command.clone().unwrap_or_default(),
            ));
        }

        let txn_id = message
            .txn_id
            .clone()
            .ok_or_else(|| XpayError::Validation("txn_id is required".to_string()))?;

        let order = self
            .store
            .find_by_txn_id(&txn_id)?
            .ok_or_else(|| XpayError::OrderNotFound(txn_id.clone()))?;

        // The partner never promised that `sum` equals the order total and
        // the protocol does not reject on mismatch; surface it for operators.
        if let (Ok(expected), Some(Ok(received))) = (
            minor_units(&order.total),
            message.sum.as_deref().map(minor_units),
        ) {
            if expected != received {
                tracing::warn!(
                    txn_id = %txn_id,
                    expected_minor_units = expected,
                    callback_minor_units = received,
                    "callback sum differs from order total"
                );
            }
        }

        match self.store.begin_processing(&txn_id)? {
            Transition::Applied => Ok(txn_id),
            Transition::AlreadySettled(status) => {
                Err(XpayError::IllegalTransition { txn_id, status })
            }
        }
    }

    fn log_rejection(&self, message: &CallbackMessage, err: &XpayError) {
        let txn_id = message.txn_id.as_deref().unwrap_or("<none>");
        match err {
            // Infrastructure faults: alert-worthy, not routine rejections.
            XpayError::StoreUnavailable(detail) => {
                tracing::error!(txn_id, detail = %detail, "order store failure during callback");
            }
            XpayError::Signature(detail) => {
                tracing::error!(txn_id, detail = %detail, "signature verification could not run");
            }
            XpayError::InvalidSignature => {
                tracing::warn!(txn_id, "callback signature mismatch");
            }
            other => {
                tracing::warn!(txn_id, error = %other, "callback rejected");
            }
        }
    }
}

/// Map the internal taxonomy onto the partner-visible message. Never leaks
/// internal detail (stack traces, key material, store errors).
fn rejection_message(err: &XpayError) -> &'static str {
    match err {
        XpayError::ConfigDisabled => msg::DISABLED,
        XpayError::Parse(_) | XpayError::Serde(_) => msg::PARSE,
        XpayError::Signature(_) | XpayError::InvalidSignature => msg::SIGNATURE,
        XpayError::UnsupportedCommand(_) => msg::COMMAND,
        XpayError::Validation(_) => msg::TXN_ID,
        XpayError::StoreUnavailable(_) => msg::STORE,
        XpayError::OrderNotFound(_) => msg::NOT_FOUND,
        XpayError::IllegalTransition { .. } => msg::SETTLED,
    }
}
