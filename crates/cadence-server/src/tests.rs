//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use cadence_core::Database;

fn setup_test_app() -> Router {
    let db = Database::in_memory().unwrap();
    create_router_with_ai(db, ServerConfig::default(), None)
}

fn setup_test_app_with_mock_ai() -> Router {
    let db = Database::in_memory().unwrap();
    create_router_with_ai(db, ServerConfig::default(), Some(AIClient::mock()))
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Monthly charges plus enough one-off noise to pass the history gate
fn seed_batch() -> serde_json::Value {
    let today = Utc::now().date_naive();
    let mut txs = Vec::new();

    for i in 1..=6 {
        txs.push(serde_json::json!({
            "date": (today - Duration::days(30 * i)).to_string(),
            "description": "NETFLIX.COM 866-579-7172",
            "amount": 15.99,
            "category": "Entertainment",
        }));
    }
    for i in 0..5 {
        txs.push(serde_json::json!({
            "date": (today - Duration::days(3 * i + 1)).to_string(),
            "description": format!("ONE OFF {}", i),
            "amount": 42.0 + i as f64,
        }));
    }

    serde_json::Value::Array(txs)
}

// ========== Health ==========

#[tokio::test]
async fn test_health_without_ai() {
    let app = setup_test_app();

    let response = app.oneshot(get_request("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["ai"].is_null());
}

#[tokio::test]
async fn test_health_with_mock_ai() {
    let app = setup_test_app_with_mock_ai();

    let response = app.oneshot(get_request("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["ai"]["healthy"], true);
    assert_eq!(json["ai"]["model"], "mock");
}

// ========== Authentication ==========

fn setup_test_app_with_keys(keys: &[&str]) -> Router {
    let db = Database::in_memory().unwrap();
    let config = ServerConfig {
        api_keys: keys.iter().map(|k| k.to_string()).collect(),
        ..Default::default()
    };
    create_router_with_ai(db, config, None)
}

#[tokio::test]
async fn test_no_keys_configured_leaves_server_open() {
    let app = setup_test_app();

    let response = app.oneshot(get_request("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_required_without_key() {
    let app = setup_test_app_with_keys(&["secret-key-1"]);

    let response = app.oneshot(get_request("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Authentication required");
}

#[tokio::test]
async fn test_auth_rejects_wrong_key() {
    let app = setup_test_app_with_keys(&["secret-key-1"]);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header("authorization", "Bearer secret-key-2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_accepts_valid_bearer_key() {
    let app = setup_test_app_with_keys(&["secret-key-1", "secret-key-2"]);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header("authorization", "Bearer secret-key-2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// ========== Transactions ==========

#[tokio::test]
async fn test_ingest_and_list_transactions() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/transactions", seed_batch()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["imported"], 11);

    let response = app.oneshot(get_request("/api/transactions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    let txs = json.as_array().unwrap();
    assert_eq!(txs.len(), 11);
    // Oldest first
    assert_eq!(txs[0]["description"], "NETFLIX.COM 866-579-7172");
}

#[tokio::test]
async fn test_ingest_empty_batch_rejected() {
    let app = setup_test_app();

    let response = app
        .oneshot(post_json("/api/transactions", serde_json::json!([])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transactions_scoped_by_user() {
    let app = setup_test_app();

    let mut request = post_json("/api/transactions", seed_batch());
    request
        .headers_mut()
        .insert("x-cadence-user", "alice".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Default user sees nothing
    let response = app.oneshot(get_request("/api/transactions")).await.unwrap();
    let json = get_body_json(response).await;
    assert!(json.as_array().unwrap().is_empty());
}

// ========== Recurring overview and analysis ==========

#[tokio::test]
async fn test_recurring_overview_empty() {
    let app = setup_test_app();

    let response = app.oneshot(get_request("/api/recurring")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert!(json["items"].as_array().unwrap().is_empty());
    assert_eq!(json["ai_powered"], false);
    assert_eq!(json["yearly_spend_estimate"], 0.0);
}

#[tokio::test]
async fn test_analyze_not_enough_history() {
    let app = setup_test_app_with_mock_ai();

    let batch = serde_json::json!([{
        "date": Utc::now().date_naive().to_string(),
        "description": "LONE TRANSACTION",
        "amount": 9.99,
    }]);
    let response = app
        .clone()
        .oneshot(post_json("/api/transactions", batch))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json(
            "/api/recurring/analyze",
            serde_json::json!(null),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["enough_history"], false);
    assert!(json["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_analyze_single_merchant() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/transactions", seed_batch()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/api/recurring/merchants/NETFLIX.COM"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["recurring"], true);
    assert_eq!(json["pattern"]["frequency"], "monthly");
    assert_eq!(json["pattern"]["occurrences"], 6);

    // Unknown merchant: not recurring, not an error
    let response = app
        .oneshot(get_request("/api/recurring/merchants/NO%20SUCH%20VENDOR"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["recurring"], false);
    assert!(json["pattern"].is_null());
}

#[tokio::test]
async fn test_analyze_detect_confirm_cycle() {
    let app = setup_test_app_with_mock_ai();

    let response = app
        .clone()
        .oneshot(post_json("/api/transactions", seed_batch()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Run the AI-assisted analysis
    let response = app
        .clone()
        .oneshot(post_json("/api/recurring/analyze", serde_json::json!(null)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["enough_history"], true);
    assert_eq!(json["ai_powered"], true);
    assert_eq!(json["from_cache"], false);

    let items = json["items"].as_array().unwrap();
    assert!(items.iter().any(|i| i["merchant_key"] == "netflix com 866"));

    // A second analyze without force is served from the cache
    let response = app
        .clone()
        .oneshot(post_json("/api/recurring/analyze", serde_json::json!(null)))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["from_cache"], true);

    // The analysis recorded a pending suggestion
    let response = app
        .clone()
        .oneshot(get_request("/api/recurring/suggestions?status=pending"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    let suggestions = json.as_array().unwrap();
    assert!(!suggestions.is_empty());
    let id = suggestions[0]["id"].as_i64().unwrap();

    // Confirm it
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/recurring/suggestions",
            serde_json::json!({ "ids": [id], "action": "confirm" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["confirmed"], 1);
    assert_eq!(json["failed"], 0);

    // The confirmed pattern now anchors the overview
    let response = app.oneshot(get_request("/api/recurring")).await.unwrap();
    let json = get_body_json(response).await;
    let items = json["items"].as_array().unwrap();
    assert!(items.iter().any(|i| i["merchant_key"] == "netflix com 866"));
}

#[tokio::test]
async fn test_deny_suggestion_hides_item() {
    let app = setup_test_app_with_mock_ai();

    app.clone()
        .oneshot(post_json("/api/transactions", seed_batch()))
        .await
        .unwrap();
    app.clone()
        .oneshot(post_json("/api/recurring/analyze", serde_json::json!(null)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get_request("/api/recurring/suggestions?status=pending"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    let id = json.as_array().unwrap()[0]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/recurring/suggestions",
            serde_json::json!({ "ids": [id], "action": "deny" }),
        ))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["denied"], 1);

    let response = app.oneshot(get_request("/api/recurring")).await.unwrap();
    let json = get_body_json(response).await;
    let items = json["items"].as_array().unwrap();
    assert!(!items.iter().any(|i| i["merchant_key"] == "netflix com 866"));
}

#[tokio::test]
async fn test_suggestion_action_empty_ids_rejected() {
    let app = setup_test_app();

    let response = app
        .oneshot(post_json(
            "/api/recurring/suggestions",
            serde_json::json!({ "ids": [], "action": "confirm" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Manual patterns ==========

fn manual_pattern_body() -> serde_json::Value {
    serde_json::json!({
        "merchant_key": "",
        "display_name": "Acme Gym Membership",
        "frequency": "monthly",
        "amount": 45.0,
        "average_amount": 45.0,
        "is_income": false,
        "next_expected_date": null,
        "last_seen_date": null,
        "category": "Fitness",
        "confidence": "high",
        "occurrences": 0,
        "bill_type": null,
        "source": "manual",
    })
}

#[tokio::test]
async fn test_create_edit_delete_pattern() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/recurring/patterns", manual_pattern_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    let merchant_key = json["merchant_key"].as_str().unwrap().to_string();
    assert_eq!(json["source"], "manual");

    // Edit the amount
    let mut body = manual_pattern_body();
    body["amount"] = serde_json::json!(49.0);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/recurring/patterns/{}", merchant_key).replace(' ', "%20"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["amount"], 49.0);

    // Delete it
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/recurring/patterns/{}", merchant_key).replace(' ', "%20"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn test_delete_unknown_pattern_404() {
    let app = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/recurring/patterns/nonexistent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_pattern_empty_name_rejected() {
    let app = setup_test_app();

    let mut body = manual_pattern_body();
    body["display_name"] = serde_json::json!("   ");
    let response = app
        .oneshot(post_json("/api/recurring/patterns", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
