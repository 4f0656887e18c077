use std::env;

use url::Url;
use xpay::{CaptionSource, GatewaySettings, IdentifiedBy};

const DEFAULT_SERVICE_URL: &str = "https://mapi.xpay.com.ua/uk/frame/widget/banner-payment";
const DEFAULT_PORT: u16 = 4040;
const DEFAULT_DB_PATH: &str = "./xpay-orders.db";
const DEFAULT_RATE_LIMIT_RPM: u64 = 120;

/// Service configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub gateway: GatewaySettings,
    pub db_path: String,
    pub port: u16,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    /// Bearer token required for /metrics (None = endpoint disabled).
    pub metrics_token: Option<String>,
    /// Trust Forwarded/X-Forwarded-For for the payer's ClientIP. Off by
    /// default: those headers are client-supplied unless a proxy in front
    /// of this service overwrites them.
    pub trust_proxy_headers: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid URL in {0}: {1}")]
    InvalidUrl(&'static str, String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("cannot read {0}: {1}")]
    Unreadable(&'static str, String),
}

fn flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "1"))
        .unwrap_or(default)
}

fn checked_url(name: &'static str, value: String) -> Result<String, ConfigError> {
    Url::parse(&value).map_err(|_| ConfigError::InvalidUrl(name, value.clone()))?;
    Ok(value)
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let partner_id = env::var("XPAY_PARTNER_ID")
            .map_err(|_| ConfigError::MissingRequired("XPAY_PARTNER_ID"))?;

        let service_url = checked_url(
            "XPAY_SERVICE_URL",
            env::var("XPAY_SERVICE_URL").unwrap_or_else(|_| DEFAULT_SERVICE_URL.to_string()),
        )?;

        // The address XPAY posts results to. Required: a link without a
        // working callback address silently loses payment outcomes.
        let callback_url = checked_url(
            "XPAY_CALLBACK_URL",
            env::var("XPAY_CALLBACK_URL")
                .map_err(|_| ConfigError::MissingRequired("XPAY_CALLBACK_URL"))?,
        )?;

        // Inline PEM or a file path; inline wins when both are set.
        let public_key_pem = match env::var("XPAY_PUBLIC_KEY").ok().filter(|s| !s.is_empty()) {
            Some(pem) => Some(pem),
            None => match env::var("XPAY_PUBLIC_KEY_FILE").ok().filter(|s| !s.is_empty()) {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .map_err(|e| ConfigError::Unreadable("XPAY_PUBLIC_KEY_FILE", e.to_string()))?,
                ),
                None => None,
            },
        };
        if public_key_pem.is_none() {
            tracing::warn!(
                "XPAY_PUBLIC_KEY not set — pay links will be generated but every \
                 payment callback will be rejected"
            );
        }

        let identified_by = match env::var("XPAY_IDENTIFIED_BY") {
            Ok(v) => IdentifiedBy::parse(&v)
                .ok_or_else(|| ConfigError::InvalidValue("XPAY_IDENTIFIED_BY", v))?,
            Err(_) => IdentifiedBy::default(),
        };

        let payment_info_caption = match env::var("XPAY_PAYMENT_INFO_CAPTION") {
            Ok(v) => CaptionSource::parse(&v)
                .ok_or_else(|| ConfigError::InvalidValue("XPAY_PAYMENT_INFO_CAPTION", v))?,
            Err(_) => CaptionSource::default(),
        };

        let return_url = env::var("XPAY_RETURN_URL").ok().filter(|s| !s.is_empty());
        let return_url_override = env::var("XPAY_RETURN_URL_OVERRIDE")
            .ok()
            .filter(|s| !s.is_empty());

        let gateway = GatewaySettings {
            partner_id,
            service_url,
            public_key_pem,
            callback_url,
            identified_by,
            show_payment_info: flag("XPAY_SHOW_PAYMENT_INFO", true),
            payment_info_caption,
            process_callback: flag("XPAY_PROCESS_CALLBACK", true),
            return_url,
            return_url_override,
            open_in_new_window: flag("XPAY_OPEN_IN_NEW_WINDOW", false),
        };

        let db_path = env::var("DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let rate_limit_rpm = env::var("RATE_LIMIT_RPM")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_RPM);

        let allowed_origins: Vec<String> = env::var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let metrics_token = env::var("METRICS_TOKEN").ok().filter(|s| !s.is_empty());
        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set — /metrics endpoint is disabled");
        }

        Ok(Self {
            gateway,
            db_path,
            port,
            rate_limit_rpm,
            allowed_origins,
            metrics_token,
            trust_proxy_headers: flag("TRUST_PROXY_HEADERS", false),
        })
    }
}
