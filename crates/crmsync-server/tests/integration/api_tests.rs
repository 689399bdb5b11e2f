use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use crmsync_core::job_queue::JobQueue;
use crmsync_core::job::JobStatus;

use crate::integration::common::setup_test_app;

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/v1/exports").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/v1/jobs")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn launch_export_starts_run_and_queues_first_page() {
    let app = setup_test_app().await;

    let (status, json) = app
        .send(
            "POST",
            "/v1/exports/product",
            Some(serde_json::json!({"request_id": "form-1"})),
        )
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["outcome"], "started");
    assert_eq!(json["data_type"], "product");
    assert!(json["run_id"].is_string());

    let pending = app
        .db
        .job_repo()
        .list_jobs(Some(JobStatus::Pending), 10)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].hook, "crmsync_product_export");

    let (_, notices) = app.send("GET", "/v1/notices", None).await;
    assert_eq!(notices["notices"], serde_json::json!(["export_in_progress"]));
}

#[tokio::test]
async fn repeated_launch_is_deduplicated() {
    let app = setup_test_app().await;
    let body = serde_json::json!({"request_id": "form-1"});

    app.send("POST", "/v1/exports/sale", Some(body.clone())).await;
    let (status, json) = app.send("POST", "/v1/exports/sale", Some(body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["outcome"], "duplicate");

    let (_, json) = app
        .send(
            "POST",
            "/v1/exports/sale",
            Some(serde_json::json!({"request_id": "form-2"})),
        )
        .await;
    assert_eq!(json["outcome"], "already_queued");
}

#[tokio::test]
async fn launch_unknown_data_type_returns_400() {
    let app = setup_test_app().await;

    let (status, json) = app
        .send("POST", "/v1/exports/orders", Some(serde_json::json!({})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad_request");
}

#[tokio::test]
async fn export_status_lists_every_data_type() {
    let app = setup_test_app().await;

    let (status, json) = app.send("GET", "/v1/exports", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["export_in_progress"], false);
    assert_eq!(json["exports"].as_array().unwrap().len(), 3);

    app.send("POST", "/v1/exports/customer", Some(serde_json::json!({})))
        .await;

    let (_, json) = app.send("GET", "/v1/exports", None).await;
    assert_eq!(json["export_in_progress"], true);
    let customer = json["exports"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["data_type"] == "customer")
        .unwrap();
    assert_eq!(customer["status"], "in_progress");
    assert_eq!(customer["offset"], 0);
}

#[tokio::test]
async fn sync_is_deduplicated_unless_forced() {
    let app = setup_test_app().await;

    let (status, json) = app.send("POST", "/v1/sync/product/42", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["scheduled"], true);

    let (status, json) = app.send("POST", "/v1/sync/product/42", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["scheduled"], false);
    assert!(json["job_id"].is_null());

    let (status, _) = app
        .send("POST", "/v1/sync/product/42?force=true", None)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, json) = app.send("GET", "/v1/jobs?status=pending", None).await;
    assert_eq!(json["total"], 2);
}

#[tokio::test]
async fn get_and_cancel_job() {
    let app = setup_test_app().await;

    let (_, json) = app.send("POST", "/v1/sync/customer/7", None).await;
    let job_id = json["job_id"].as_str().unwrap().to_string();

    let (status, json) = app.send("GET", &format!("/v1/jobs/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["args"]["item_id"], "7");
    assert_eq!(json["status"], "pending");

    let (status, _) = app
        .send("DELETE", &format!("/v1/jobs/{job_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = app
        .send("DELETE", &format!("/v1/jobs/{job_id}"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "conflict");
}

#[tokio::test]
async fn missing_job_returns_404() {
    let app = setup_test_app().await;

    let (status, json) = app
        .send("GET", &format!("/v1/jobs/{}", uuid::Uuid::new_v4()), None)
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn list_jobs_rejects_unknown_status() {
    let app = setup_test_app().await;

    let (status, _) = app.send("GET", "/v1/jobs?status=sleeping", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn openapi_document_is_public() {
    let app = setup_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["paths"]["/v1/exports/{data_type}"].is_object());
}
