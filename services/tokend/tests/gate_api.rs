mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{read_json, test_app};
use http_helpers::bearer_request;
use std::time::Duration;
use tokend::auth::SessionIssuer;
use tokend::config::SigningConfig;
use tower::ServiceExt;

#[tokio::test]
async fn session_route_accepts_tokens_from_this_issuer() {
    let app = test_app();
    let token = app
        .state
        .issuer
        .issue_session("beta", &["read".to_string()], Duration::from_secs(60))
        .expect("token");
    let response = app
        .router
        .clone()
        .oneshot(bearer_request("GET", "/v1/session", &token))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["subject"], "beta");
    assert_eq!(body["roles"], serde_json::json!(["read"]));
}

#[tokio::test]
async fn session_route_rejects_everything_else_the_same_way() {
    let app = test_app();
    let foreign = SessionIssuer::new(&SigningConfig {
        secret: b"some-other-deployment-secret-0123456789".to_vec(),
        issuer: "tokend".to_string(),
        audience: "tokend-api".to_string(),
    })
    .issue_session("beta", &[], Duration::from_secs(60))
    .expect("token");

    let requests = vec![
        Request::builder()
            .uri("/v1/session")
            .body(Body::empty())
            .expect("request"),
        Request::builder()
            .uri("/v1/session")
            .header("authorization", "Token abc")
            .body(Body::empty())
            .expect("request"),
        bearer_request("GET", "/v1/session", "not.a.jwt"),
        bearer_request("GET", "/v1/session", &foreign),
    ];

    let mut bodies = Vec::new();
    for request in requests {
        let response = app.router.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(read_json(response).await);
    }
    assert!(bodies.iter().all(|body| body == &bodies[0]));
    assert_eq!(bodies[0]["code"], "unauthorized");
}
