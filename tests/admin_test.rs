//! Admin surface behavior over warp's test harness.

mod common;

use common::{any_preferences, profile, TestHarness};
use pairlink::config::AppConfig;
use pairlink::handlers::admin::admin_routes;

#[tokio::test]
async fn test_health_endpoint() {
    let h = TestHarness::new();
    let routes = admin_routes(h.core.clone());
    let response = warp::test::request().path("/health").reply(&routes).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["online_users"], 0);
    assert_eq!(body["environment"], "development");
    assert!(body["version"].as_str().is_some());
}

#[tokio::test]
async fn test_stats_endpoint_counts_connections() {
    let h = TestHarness::new();
    let mut a = h.connect();
    h.register(&mut a, profile("male", "18-25")).await;

    let routes = admin_routes(h.core.clone());
    let response = warp::test::request().path("/stats").reply(&routes).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["online_users"], 1);
    assert_eq!(body["total_connections"], 1);
    assert_eq!(body["active_rooms"], 0);
}

#[tokio::test]
async fn test_config_endpoint_exposes_ice_servers() {
    let h = TestHarness::new();
    let routes = admin_routes(h.core.clone());
    let response = warp::test::request().path("/config").reply(&routes).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["max_message_length"], 500);
    assert!(body["ice_servers"].as_array().unwrap().len() >= 1);
    assert_eq!(body["ice_servers"][0]["kind"], "stun");
}

#[tokio::test]
async fn test_debug_endpoint_lists_queue() {
    let h = TestHarness::new();
    let mut a = h.connect();
    h.register(&mut a, profile("male", "18-25")).await;
    h.find_match(&a, any_preferences()).await;

    let routes = admin_routes(h.core.clone());
    let response = warp::test::request().path("/debug").reply(&routes).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["queue_size"], 1);
    assert_eq!(body["queue"][0]["user_id"], a.user_id.as_str());
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_debug_endpoint_hidden_in_production() {
    let mut config = AppConfig::for_testing();
    config.environment = "production".to_string();
    config.allowed_origins = vec!["https://app.example".to_string()];
    let h = TestHarness::with_config(config);

    let routes = admin_routes(h.core.clone());
    let response = warp::test::request().path("/debug").reply(&routes).await;
    assert_eq!(response.status(), 404);
}
