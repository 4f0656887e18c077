//! HTTP surface for the XPAY payment handshake.
//!
//! Exposes `/pay-link` (outbound link generation) and `/process-pay`
//! (inbound payment-result callback) plus `/health` and `/metrics`,
//! delegating the protocol itself to the [`xpay`] crate.

pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;
