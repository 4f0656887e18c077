use xpay::XpayGateway;

/// Shared application state. The gateway is constructed once at startup
/// with its settings and order store; requests only read it.
pub struct AppState {
    pub gateway: XpayGateway,
    /// Bearer token for /metrics (None = endpoint disabled).
    pub metrics_token: Option<String>,
    /// Derive the payer's ClientIP from Forwarded/X-Forwarded-For instead of
    /// the socket peer. Only safe behind a proxy that sets those headers.
    pub trust_proxy_headers: bool,
}
