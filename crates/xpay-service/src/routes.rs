use std::collections::HashMap;

use actix_web::{get, web, HttpRequest, HttpResponse};
use serde_json::Value;
use xpay::XpayError;

use crate::metrics;
use crate::state::AppState;

/// Turn the raw request into the protocol's key/value fields.
///
/// Body first (JSON object, or form-encoded pairs when the content type says
/// so); an empty body falls back to the query string. `None` means nothing
/// parseable arrived and the gateway rejects with its parse message.
fn callback_fields(req: &HttpRequest, body: &[u8]) -> Option<HashMap<String, String>> {
    if !body.is_empty() {
        let content_type = req
            .headers()
            .get(actix_web::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.contains("application/x-www-form-urlencoded") {
            return Some(pairs_to_map(url::form_urlencoded::parse(body)));
        }

        return match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Some(
                map.into_iter()
                    .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k, s)))
                    .collect(),
            ),
            _ => None,
        };
    }

    let query = req.query_string();
    if query.is_empty() {
        return None;
    }
    Some(pairs_to_map(url::form_urlencoded::parse(query.as_bytes())))
}

fn pairs_to_map<'a>(
    pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
) -> HashMap<String, String> {
    pairs
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// JSON scalars become their string form; arrays/objects are not protocol
/// fields and are dropped.
fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Payment-result callback from XPAY. Any HTTP method; the response is
/// always 200 with the fixed-shape body — failures are expressed through
/// `result`/`message`, never through the HTTP status (partner contract).
pub async fn process_pay(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    let start = std::time::Instant::now();
    let fields = callback_fields(&req, &body);
    let response = state.gateway.handle_callback(fields);

    metrics::CALLBACK_REQUESTS
        .with_label_values(&[response.result])
        .inc();
    metrics::CALLBACK_LATENCY
        .with_label_values(&[response.result])
        .observe(start.elapsed().as_secs_f64());

    HttpResponse::Ok().json(response)
}

/// Pay-link generation for the storefront. The body carries `order_id` and
/// an opaque `fingerprint`; anything else a client sends is ignored — the
/// amount, identity and callback address are derived server-side.
///
/// Registered as a rate-limited resource in `main.rs`; the callback path
/// must never share that limiter (partner contract: always 200).
pub async fn pay_link(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            metrics::PAY_LINK_REQUESTS.with_label_values(&["bad_request"]).inc();
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid_body",
                "message": "expected a JSON body with order_id"
            }));
        }
    };

    let order_id = match &parsed["order_id"] {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => {
            metrics::PAY_LINK_REQUESTS.with_label_values(&["bad_request"]).inc();
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid_body",
                "message": "order_id is required"
            }));
        }
    };
    let fingerprint = parsed["fingerprint"].as_str().unwrap_or("").to_string();

    // Forwarded/X-Forwarded-For are client-supplied unless a trusted proxy
    // strips them; the socket peer is the default source for ClientIP.
    let client_ip = if state.trust_proxy_headers {
        req.connection_info()
            .realip_remote_addr()
            .unwrap_or("")
            .to_string()
    } else {
        req.peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    };

    match state.gateway.build_pay_link(&order_id, &client_ip, &fingerprint) {
        Ok(url) => {
            metrics::PAY_LINK_REQUESTS.with_label_values(&["ok"]).inc();
            HttpResponse::Ok().json(serde_json::json!({ "url": url }))
        }
        Err(XpayError::OrderNotFound(id)) => {
            metrics::PAY_LINK_REQUESTS.with_label_values(&["not_found"]).inc();
            HttpResponse::NotFound().json(serde_json::json!({
                "error": "order_not_found",
                "message": format!("no order for id {id}")
            }))
        }
        Err(XpayError::Validation(msg)) => {
            metrics::PAY_LINK_REQUESTS.with_label_values(&["invalid"]).inc();
            tracing::warn!(order_id = %order_id, detail = %msg, "pay link rejected");
            HttpResponse::UnprocessableEntity().json(serde_json::json!({
                "error": "invalid_order",
                "message": "order cannot be converted to a payment request"
            }))
        }
        Err(XpayError::StoreUnavailable(msg)) => {
            metrics::PAY_LINK_REQUESTS.with_label_values(&["store_error"]).inc();
            tracing::error!(order_id = %order_id, detail = %msg, "order store failure during pay link");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": "store_unavailable",
                "message": "order store is unavailable"
            }))
        }
        Err(e) => {
            metrics::PAY_LINK_REQUESTS.with_label_values(&["error"]).inc();
            tracing::error!(order_id = %order_id, error = %e, "pay link generation failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "internal_error",
                "message": "pay link generation failed"
            }))
        }
    }
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.gateway.ping_store() {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "xpay-service",
        })),
        Err(e) => {
            tracing::error!(error = %e, "order store unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "service": "xpay-service",
                "error": "order store unreachable",
            }))
        }
    }
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t == token)
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
            HttpResponse::Ok()
                .content_type("text/plain; version=0.0.4")
                .body(metrics::metrics_output())
        }
        None => HttpResponse::Forbidden().json(serde_json::json!({
            "error": "forbidden",
            "message": "Set METRICS_TOKEN to enable /metrics"
        })),
    }
}
