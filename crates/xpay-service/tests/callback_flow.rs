//! End-to-end tests over the HTTP surface: link generation, callback
//! validation, and the exactly-once state transition.

use std::io::Read;
use std::sync::{Arc, OnceLock};

use actix_web::{test, web, App};
use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer};
use sha2::Sha256;
use xpay::{
    BillingInfo, CaptionSource, GatewaySettings, IdentifiedBy, InMemoryOrderStore, LineItem,
    Order, OrderStatus, OrderStore, XpayGateway,
};
use xpay_service::routes;
use xpay_service::state::AppState;

struct TestKey {
    signing: rsa::pkcs1v15::SigningKey<Sha256>,
    public_pem: String,
}

fn test_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let private = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        TestKey {
            signing: rsa::pkcs1v15::SigningKey::new(private),
            public_pem,
        }
    })
}

fn sign(text: &str) -> String {
    STANDARD.encode(test_key().signing.sign(text.as_bytes()).to_bytes())
}

fn settings() -> GatewaySettings {
    GatewaySettings {
        partner_id: "12345".to_string(),
        service_url: "https://mapi.xpay.example/widget".to_string(),
        public_key_pem: Some(test_key().public_pem.clone()),
        callback_url: "https://shop.example/wp-json/xpay/process-pay".to_string(),
        identified_by: IdentifiedBy::Phone,
        show_payment_info: true,
        payment_info_caption: CaptionSource::Name,
        process_callback: true,
        return_url: Some("https://shop.example/thanks".to_string()),
        return_url_override: None,
        open_in_new_window: false,
    }
}

fn pending_order(txn_id: &str) -> Order {
    Order {
        txn_id: txn_id.to_string(),
        status: OrderStatus::Pending,
        total: "5.00".to_string(),
        currency: "UAH".to_string(),
        billing: BillingInfo {
            email: "payer@example.com".to_string(),
            phone: "+38(067)123-45-67".to_string(),
            first_name: "Olena".to_string(),
            last_name: "Kovalenko".to_string(),
        },
        line_items: vec![LineItem {
            name: "Widget".to_string(),
            short_description: None,
            total: "5.00".to_string(),
        }],
    }
}

fn app_state(store: Arc<InMemoryOrderStore>) -> web::Data<AppState> {
    web::Data::new(AppState {
        gateway: XpayGateway::new(settings(), store).unwrap(),
        metrics_token: None,
        trust_proxy_headers: false,
    })
}

macro_rules! service {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .route("/pay-link", web::post().to(routes::pay_link))
                .service(routes::health)
                .route("/process-pay", web::route().to(routes::process_pay)),
        )
        .await
    };
}

/// Undo the `data` token pipeline of a generated pay link.
fn decode_data_token(url: &str) -> serde_json::Value {
    let token = url.split("&data=").nth(1).unwrap();
    let b64 = urlencoding::decode(token).unwrap();
    let compressed = STANDARD.decode(b64.as_bytes()).unwrap();
    let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
    let mut json = Vec::new();
    decoder.read_to_end(&mut json).unwrap();
    serde_json::from_slice(&json).unwrap()
}

fn pay_body(txn_id: &str) -> serde_json::Value {
    let uuid = "abc";
    let txn_date = "20240101120000";
    let sum = "500";
    serde_json::json!({
        "txn_id": txn_id,
        "uuid": uuid,
        "txn_date": txn_date,
        "sum": sum,
        "sign": sign(&format!("{txn_id}{uuid}{txn_date}{sum}")),
        "command": "pay",
    })
}

#[actix_rt::test]
async fn concrete_scenario_and_idempotency() {
    let store = Arc::new(InMemoryOrderStore::new());
    store.upsert(pending_order("1001")).unwrap();
    let state = app_state(store.clone());
    let app = service!(state);

    let req = test::TestRequest::post()
        .uri("/process-pay")
        .set_json(pay_body("1001"))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"], "10");
    assert_eq!(body["txn_id"], "1001");
    assert_eq!(body["message"], "Ok");
    let stamp = body["date_time"].as_str().unwrap();
    assert_eq!(stamp.len(), 14);
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));

    assert_eq!(
        store.find_by_txn_id("1001").unwrap().unwrap().status,
        OrderStatus::Processing
    );

    // At-least-once delivery: the replay must be rejected, status unchanged.
    let req = test::TestRequest::post()
        .uri("/process-pay")
        .set_json(pay_body("1001"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success(), "soft-fail contract: HTTP 200");
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["result"], "21");
    assert_eq!(body["txn_id"], "1001");
    assert_ne!(body["message"], "");

    assert_eq!(
        store.find_by_txn_id("1001").unwrap().unwrap().status,
        OrderStatus::Processing
    );
}

#[actix_rt::test]
async fn query_fallback_matches_json_body() {
    let store = Arc::new(InMemoryOrderStore::new());
    store.upsert(pending_order("2002")).unwrap();
    let state = app_state(store.clone());
    let app = service!(state);

    let uuid = "abc";
    let txn_date = "20240101120000";
    let sum = "500";
    let sig = sign(&format!("2002{uuid}{txn_date}{sum}"));
    let query = format!(
        "/process-pay?txn_id=2002&uuid={uuid}&txn_date={txn_date}&sum={sum}&sign={}&command=pay",
        urlencoding::encode(&sig)
    );

    let req = test::TestRequest::get().uri(&query).to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"], "10");
    assert_eq!(body["txn_id"], "2002");
}

#[actix_rt::test]
async fn form_encoded_body_is_accepted() {
    let store = Arc::new(InMemoryOrderStore::new());
    store.upsert(pending_order("3003")).unwrap();
    let state = app_state(store.clone());
    let app = service!(state);

    let uuid = "abc";
    let txn_date = "20240101120000";
    let sum = "500";
    let sig = sign(&format!("3003{uuid}{txn_date}{sum}"));
    let form = format!(
        "txn_id=3003&uuid={uuid}&txn_date={txn_date}&sum={sum}&sign={}&command=pay",
        urlencoding::encode(&sig)
    );

    let req = test::TestRequest::post()
        .uri("/process-pay")
        .insert_header(("content-type", "application/x-www-form-urlencoded"))
        .set_payload(form)
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"], "10");
}

#[actix_rt::test]
async fn tampered_signature_is_rejected() {
    let store = Arc::new(InMemoryOrderStore::new());
    store.upsert(pending_order("4004")).unwrap();
    let state = app_state(store.clone());
    let app = service!(state);

    let mut body = pay_body("4004");
    body["sum"] = serde_json::json!("501");

    let req = test::TestRequest::post()
        .uri("/process-pay")
        .set_json(body)
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["result"], "21");
    assert_eq!(resp["message"], "Signature not valid!");
    assert_eq!(
        store.find_by_txn_id("4004").unwrap().unwrap().status,
        OrderStatus::Pending
    );
}

#[actix_rt::test]
async fn empty_request_is_a_parse_rejection() {
    let store = Arc::new(InMemoryOrderStore::new());
    let state = app_state(store);
    let app = service!(state);

    let req = test::TestRequest::post().uri("/process-pay").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["result"], "21");
    assert_eq!(body["txn_id"], serde_json::Value::Null);
}

#[actix_rt::test]
async fn pay_link_ignores_client_supplied_callback() {
    let store = Arc::new(InMemoryOrderStore::new());
    store.upsert(pending_order("1001")).unwrap();
    let state = app_state(store);
    let app = service!(state);

    // A hostile client tries to steer the callback; only order_id and
    // fingerprint may influence the link.
    let req = test::TestRequest::post()
        .uri("/pay-link")
        .set_json(serde_json::json!({
            "order_id": "1001",
            "fingerprint": "fp-1",
            "callback_url": "https://evil.example/steal",
            "CallBackURL": "https://evil.example/steal",
            "sum": "1",
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let url = body["url"].as_str().unwrap();
    assert!(url.starts_with("https://mapi.xpay.example/widget?pid=12345&acc=380671234567&sum=500&data="));

    // The embedded callback address must be the configured one.
    let payload = decode_data_token(url);

    assert_eq!(
        payload["CallBackURL"],
        "https://shop.example/wp-json/xpay/process-pay"
    );
    assert_eq!(payload["txn_id"], "1001");
    assert_eq!(payload["BrowserFingerprint"], "fp-1");
    assert_eq!(payload["Callback"]["PaySuccess"]["URL"], "https://shop.example/thanks");
}

#[actix_rt::test]
async fn callback_path_is_never_rate_limited() {
    use actix_governor::{Governor, GovernorConfigBuilder};

    let store = Arc::new(InMemoryOrderStore::new());
    store.upsert(pending_order("5005")).unwrap();
    let state = app_state(store);

    // One request, then a refill so slow it never arrives within the test.
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(3600)
        .burst_size(1)
        .finish()
        .unwrap();
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .service(
                web::resource("/pay-link")
                    .wrap(Governor::new(&governor_conf))
                    .route(web::post().to(routes::pay_link)),
            )
            .route("/process-pay", web::route().to(routes::process_pay)),
    )
    .await;

    let peer: std::net::SocketAddr = "203.0.113.7:40000".parse().unwrap();
    let link_req = || {
        test::TestRequest::post()
            .uri("/pay-link")
            .peer_addr(peer)
            .set_json(serde_json::json!({ "order_id": "5005", "fingerprint": "fp" }))
            .to_request()
    };

    // Exhaust the storefront quota.
    assert!(test::call_service(&app, link_req()).await.status().is_success());
    assert_eq!(
        test::call_service(&app, link_req()).await.status(),
        actix_web::http::StatusCode::TOO_MANY_REQUESTS
    );

    // The callback path from the same address still answers 200 with the
    // fixed-shape body, accepted or rejected.
    for _ in 0..3 {
        let req = test::TestRequest::post()
            .uri("/process-pay")
            .peer_addr(peer)
            .set_json(pay_body("5005"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["result"] == "10" || body["result"] == "21");
        assert_eq!(body["txn_id"], "5005");
    }
}

#[actix_rt::test]
async fn forwarded_header_does_not_spoof_client_ip() {
    let store = Arc::new(InMemoryOrderStore::new());
    store.upsert(pending_order("6006")).unwrap();
    let state = app_state(store);
    let app = service!(state);

    let peer: std::net::SocketAddr = "203.0.113.9:40000".parse().unwrap();
    let req = test::TestRequest::post()
        .uri("/pay-link")
        .peer_addr(peer)
        .insert_header(("x-forwarded-for", "198.51.100.66"))
        .set_json(serde_json::json!({ "order_id": "6006", "fingerprint": "fp" }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    let payload = decode_data_token(body["url"].as_str().unwrap());
    assert_eq!(payload["ClientIP"], "203.0.113.9");
}

#[actix_rt::test]
async fn pay_link_unknown_order_is_404() {
    let store = Arc::new(InMemoryOrderStore::new());
    let state = app_state(store);
    let app = service!(state);

    let req = test::TestRequest::post()
        .uri("/pay-link")
        .set_json(serde_json::json!({ "order_id": "nope", "fingerprint": "fp" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn health_reports_ok() {
    let store = Arc::new(InMemoryOrderStore::new());
    let state = app_state(store);
    let app = service!(state);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
}
