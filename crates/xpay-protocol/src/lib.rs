//! XPAY payment handshake protocol.
//!
//! Implements the two message exchanges between a store's checkout and the
//! XPAY payment processor:
//!
//! - **Outbound** — [`XpayGateway::build_pay_link`] encodes an order's
//!   amount, identity and callback address into a payment-initiation URL
//!   (JSON → gzip → base64 → percent-encoded `data` token).
//! - **Inbound** — [`XpayGateway::handle_callback`] validates an
//!   asynchronous payment-result callback (RSA/SHA-256 signature over
//!   `txn_id + uuid + txn_date + sum`) and applies it exactly once to the
//!   order's state. Replayed or late callbacks are rejected, never
//!   double-applied.
//!
//! The gateway never touches card data; it negotiates a payment session and
//! reconciles its outcome against an [`OrderStore`].
//!
//! # Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xpay::{GatewaySettings, InMemoryOrderStore, XpayGateway};
//!
//! # fn settings() -> GatewaySettings { unimplemented!() }
//! let gateway = XpayGateway::new(settings(), Arc::new(InMemoryOrderStore::new())).unwrap();
//! let url = gateway.build_pay_link("1001", "203.0.113.9", "fp-token").unwrap();
//! ```

pub mod amount;
pub mod callback;
pub mod codec;
pub mod error;
pub mod gateway;
pub mod link;
pub mod payload;
pub mod sanitize;
pub mod settings;
pub mod store;
pub mod verify;

pub use callback::{CallbackMessage, CallbackResponse, RESULT_ACCEPTED, RESULT_REJECTED};
pub use error::XpayError;
pub use gateway::XpayGateway;
pub use payload::PaymentInitiationRequest;
pub use settings::{CaptionSource, GatewaySettings, IdentifiedBy};
pub use store::{
    BillingInfo, InMemoryOrderStore, LineItem, Order, OrderStatus, OrderStore, SqliteOrderStore,
    Transition,
};
pub use verify::CallbackVerifier;
