use tempfile::TempDir;

mod common;
use common::{app, registry, send, test_config, FakeCollector};

#[tokio::test]
async fn test_trends_before_first_refresh() {
    let tmp = TempDir::new().unwrap();
    let app = app(registry(&test_config(&tmp, "1,17"), FakeCollector::new(2, 0)));

    let (status, body) = send(&app, "GET", "/api/trends").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");
    assert_eq!(body["geography"], "IN");
    assert_eq!(body["trends"], serde_json::json!([]));
    assert_eq!(body["total_count"], 0);
    assert!(body["metadata"]["last_updated"].is_null());
    assert_eq!(body["cache_info"]["cached"], false);
    assert_eq!(body["cache_info"]["stale"], true);
}

#[tokio::test]
async fn test_force_refresh_then_flat_and_grouped() {
    let tmp = TempDir::new().unwrap();
    let collector = FakeCollector::new(2, 0);
    let app = app(registry(&test_config(&tmp, "1,17"), collector.clone()));

    let (status, body) = send(&app, "GET", "/api/trends?force_refresh=true").await;
    assert_eq!(status, 200);
    assert_eq!(body["total_count"], 4);
    let trends = body["trends"].as_array().unwrap();
    let ranks: Vec<u64> = trends.iter().map(|t| t["rank"].as_u64().unwrap()).collect();
    assert_eq!(ranks, vec![1, 2, 1, 2]);
    assert_eq!(trends[0]["category"], "Autos and vehicles");
    assert_eq!(trends[2]["category_id"], 17);
    assert!(trends[0]["explore_link"]
        .as_str()
        .unwrap()
        .starts_with("https://trends.google.com/trends/explore?q="));
    assert_eq!(body["metadata"]["source"], "fake");
    assert_eq!(body["cache_info"]["cached"], true);
    assert_eq!(body["cache_info"]["update_in_progress"], false);

    let (status, body) = send(&app, "GET", "/api/trends?flat=false").await;
    assert_eq!(status, 200);
    assert!(body.get("total_count").is_none());
    let categories = body["trends"].as_object().unwrap();
    let names: Vec<&String> = categories.keys().collect();
    assert_eq!(names, vec!["Autos and vehicles", "Sports"]);
    assert_eq!(categories["Sports"]["trend_count"], 2);
    assert_eq!(body["metadata"]["categories_count"], 2);

    assert_eq!(collector.calls(), 2);
}

#[tokio::test]
async fn test_category_filter_and_not_found() {
    let tmp = TempDir::new().unwrap();
    let app = app(registry(&test_config(&tmp, "1,17"), FakeCollector::new(3, 0)));
    send(&app, "GET", "/api/trends?force_refresh=true").await;

    let (status, body) = send(&app, "GET", "/api/trends?category=sports").await;
    assert_eq!(status, 200);
    assert_eq!(body["total_count"], 3);

    let (status, body) = send(&app, "GET", "/api/trends?category=Knitting").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "category_not_found");
    assert!(body["request_id"].as_str().unwrap().starts_with("req_tc_"));
}

#[tokio::test]
async fn test_unknown_geography() {
    let tmp = TempDir::new().unwrap();
    let app = app(registry(&test_config(&tmp, "1"), FakeCollector::new(1, 0)));

    let (status, body) = send(&app, "GET", "/api/trends?geo=ZZ").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "geography_not_found");
    assert!(body["suggestion"].is_string());

    let (status, _) = send(&app, "POST", "/api/update?geo=ZZ").await;
    assert_eq!(status, 404);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_trigger_ack() {
    let tmp = TempDir::new().unwrap();
    let collector = FakeCollector::new(1, 100);
    let reg = registry(&test_config(&tmp, "1,2"), collector.clone());
    let app = app(reg.clone());

    let (status, body) = send(&app, "POST", "/api/update").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "update_triggered");
    assert_eq!(body["previous_state"], "idle");
    assert_eq!(body["cache_info"]["update_in_progress"], true);

    let (_, body) = send(&app, "POST", "/api/update").await;
    assert_eq!(body["status"], "update_already_running");
    assert_eq!(body["previous_state"], "running");

    let (_, health) = send(&app, "GET", "/health").await;
    assert_eq!(health["geographies"]["IN"]["state"], "running");

    // Joins the triggered run instead of starting another.
    let (_, body) = send(&app, "GET", "/api/trends?force_refresh=true").await;
    assert_eq!(body["total_count"], 2);
    assert_eq!(collector.calls(), 2);
    assert_eq!(reg.get(None).unwrap().coordinator.status().runs_started, 1);
}

#[tokio::test]
async fn test_health_root_and_openapi() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp, "1");
    config.extra_geographies = vec!["US".to_string()];
    let app = app(registry(&config, FakeCollector::new(1, 0)));

    let (status, health) = send(&app, "GET", "/health").await;
    assert_eq!(status, 200);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["default_geography"], "IN");
    assert_eq!(health["geographies"]["US"]["state"], "idle");
    assert_eq!(health["geographies"]["IN"]["runs_started"], 0);
    assert!(health["geographies"]["IN"]["seconds_since_last_replace"].is_null());

    let (status, root) = send(&app, "GET", "/").await;
    assert_eq!(status, 200);
    assert_eq!(root["name"], "trendcache");
    assert_eq!(root["geographies"], serde_json::json!(["IN", "US"]));
    assert_eq!(root["categories"].as_array().unwrap().len(), 19);

    let (status, doc) = send(&app, "GET", "/api-docs/openapi.json").await;
    assert_eq!(status, 200);
    assert!(doc["paths"]["/api/trends"]["get"].is_object());
    assert!(doc["paths"]["/api/update"]["post"].is_object());
}
