use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;

use crate::security::LoginRateLimiter;
use crate::workflows::dispatch::domain::AssignmentStatus;
use crate::workflows::dispatch::router::{automate_handler, DispatchState};
use crate::workflows::dispatch::AutomationOptions;

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request builds")
}

#[tokio::test]
async fn compute_route_returns_breakdown() {
    let router = router_with(seeded_repository());

    let response = router
        .oneshot(post_json(
            "/api/v1/fees/compute",
            json!({
                "sessions": 2,
                "distance_km": 35.0,
                "instructor_type": "internal",
                "grade": "internal_level2"
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["subtotal"], json!(103_000));
    assert_eq!(payload["tax_withholding"], json!(3_399));
    assert_eq!(payload["net_amount"], json!(99_601));
    assert_eq!(payload["steps"].as_array().map(Vec::len), Some(8));
}

#[tokio::test]
async fn compute_route_rejects_negative_distance() {
    let router = router_with(seeded_repository());

    let response = router
        .oneshot(post_json(
            "/api/v1/fees/compute",
            json!({
                "sessions": 2,
                "distance_km": -3.0,
                "instructor_type": "internal",
                "grade": "internal_level1"
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], json!("validation"));
    assert_eq!(payload["success"], json!(false));
}

#[tokio::test]
async fn compute_route_flags_unconfigured_grade() {
    let router = router_with(seeded_repository());

    let response = router
        .oneshot(post_json(
            "/api/v1/fees/compute",
            json!({
                "sessions": 2,
                "instructor_type": "external",
                "grade": "external_vip"
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn candidates_route_lists_ranked_instructors() {
    let router = router_with(seeded_repository());

    let response = router
        .oneshot(get("/api/v1/requests/req-1/candidates"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["candidates"][0]["instructor_id"], json!("ins-seoul"));
    assert_eq!(payload["candidates"][0]["rank"], json!(1));
}

#[tokio::test]
async fn candidates_route_returns_not_found() {
    let router = router_with(seeded_repository());

    let response = router
        .oneshot(get("/api/v1/requests/missing/candidates"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn automate_route_creates_quote_and_assignment() {
    let repository = seeded_repository();
    let router = router_with(Arc::clone(&repository));

    let response = router
        .oneshot(post_json(
            "/api/v1/requests/req-1/automate",
            json!({ "auto_assign": true }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], json!(true));
    assert_eq!(payload["request_status"], json!("assigned"));
    assert_eq!(payload["assignment"]["status"], json!("proposed"));
    assert_eq!(
        repository
            .assignments_for(&crate::workflows::dispatch::RequestId("req-1".to_string()))
            .len(),
        1
    );
}

#[tokio::test]
async fn automate_handler_maps_business_outcomes() {
    let repository = seeded_repository();
    let mut request = school_request("req-1", "Seoul", Some("coding"));
    request.budget = Some(50_000);
    repository.insert_request(request);
    let state = DispatchState::new(
        Arc::new(workflow(repository, rules())),
        Arc::new(LoginRateLimiter::default()),
    );

    let response = automate_handler(
        State(state.clone()),
        Path("req-1".to_string()),
        axum::Json(AutomationOptions {
            auto_assign: true,
            adjust_to_budget: true,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], json!("budget_infeasible"));

    let response = automate_handler(
        State(state),
        Path("req-1".to_string()),
        axum::Json(AutomationOptions {
            auto_assign: true,
            adjust_to_budget: false,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn automate_handler_reports_unavailable_store() {
    let state = DispatchState::new(
        Arc::new(workflow(Arc::new(UnavailableRepository), rules())),
        Arc::new(LoginRateLimiter::default()),
    );

    let response = automate_handler(
        State(state),
        Path("req-1".to_string()),
        axum::Json(AutomationOptions {
            auto_assign: false,
            adjust_to_budget: false,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn payment_routes_follow_the_lifecycle() {
    let repository = seeded_repository();
    repository.insert_assignment(assignment("asg-1", AssignmentStatus::Completed));
    let router = router_with(Arc::clone(&repository));

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/assignments/asg-1/payment",
            json!({ "bonus": 5000 }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payment = read_json_body(response).await;
    assert_eq!(payment["status"], json!("calculated"));
    let payment_id = payment["id"].as_str().expect("payment id").to_string();

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/payments/{payment_id}/transition"),
            json!({ "status": "paid" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .oneshot(post_json(
            &format!("/api/v1/payments/{payment_id}/transition"),
            json!({ "status": "approved" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], json!("approved"));
}

#[tokio::test]
async fn rate_limit_routes_block_after_repeated_failures() {
    let router = router_with(seeded_repository());

    for _ in 0..5 {
        let response = router
            .clone()
            .oneshot(post_json(
                "/api/v1/auth/rate-limit/1.2.3.4/attempts",
                json!({ "success": false }),
            ))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .clone()
        .oneshot(get("/api/v1/auth/rate-limit/1.2.3.4"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let payload = read_json_body(response).await;
    assert_eq!(payload["allowed"], json!(false));
    assert!(payload["blocked_until"].is_string());

    let response = router
        .oneshot(get("/api/v1/auth/rate-limit/5.6.7.8"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
}
