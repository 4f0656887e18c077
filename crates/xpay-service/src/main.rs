use std::sync::Arc;

use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xpay::{SqliteOrderStore, XpayGateway};

use xpay_service::config::ServiceConfig;
use xpay_service::routes;
use xpay_service::state::AppState;

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        // The callback endpoint is server-to-server; only the storefront's
        // pay-link call needs CORS, default to localhost for development.
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method()
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServiceConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let store = match SqliteOrderStore::open(&config.db_path) {
        Ok(store) => {
            tracing::info!("Order store: SQLite at {}", config.db_path);
            Arc::new(store)
        }
        Err(e) => {
            // Without a durable store a replayed callback could be applied
            // twice after a restart. Refuse to start instead.
            tracing::error!("failed to open order store at {}: {e}", config.db_path);
            std::process::exit(1);
        }
    };

    let gateway = match XpayGateway::new(config.gateway.clone(), store) {
        Ok(g) => g,
        Err(e) => {
            tracing::error!("gateway construction failed: {e}");
            std::process::exit(1);
        }
    };

    let state = web::Data::new(AppState {
        gateway,
        metrics_token: config.metrics_token.clone(),
        trust_proxy_headers: config.trust_proxy_headers,
    });

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
        .expect("failed to build rate limiter config");

    let port = config.port;
    let allowed_origins = config.allowed_origins.clone();

    tracing::info!("XPAY handshake service listening on port {port}");
    tracing::info!("Partner id: {}", config.gateway.partner_id);
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  POST http://localhost:{port}/pay-link");
    tracing::info!("  ANY  http://localhost:{port}/process-pay");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&allowed_origins))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::default().limit(65_536))
            // Only the storefront-facing route is rate limited. The callback
            // path answers 200 unconditionally (partner contract), so a
            // throttled burst there would silently drop payment results.
            .service(
                web::resource("/pay-link")
                    .wrap(Governor::new(&governor_conf))
                    .route(web::post().to(routes::pay_link)),
            )
            .service(routes::health)
            .service(routes::metrics_endpoint)
            .route("/process-pay", web::route().to(routes::process_pay))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
