#![allow(clippy::unwrap_used)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use groove_hub::{
    auth::JwtKeys,
    services::Services,
    store::{MemoryStore, Store},
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

// base64 of "groove-hub-test-secret"
const SECRET: &str = "Z3Jvb3ZlLWh1Yi10ZXN0LXNlY3JldA==";

fn router() -> Router {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let keys = JwtKeys::from_base64_secret(SECRET, Duration::from_secs(300)).unwrap();
    groove_hub::app(Services::new(store), Arc::new(keys))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn signup(app: &Router, nickname: &str) -> (i64, String) {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({
            "email": format!("{nickname}@groove.io"),
            "nickname": nickname,
            "password": "correct-horse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (
        body["user"]["id"].as_i64().unwrap(),
        body["token"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let app = router();

    let (status, body) = call(&app, Method::GET, "/api/account", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
}

#[tokio::test]
async fn login_returns_a_working_token() {
    let app = router();
    let (id, _) = signup(&app, "popper").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "popper@groove.io", "password": "correct-horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();

    let (status, me) = call(&app, Method::GET, "/api/account", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], id);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "popper@groove.io", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn membership_flow_over_http() {
    let app = router();
    let (_, leader) = signup(&app, "leader").await;
    let (dancer_id, dancer) = signup(&app, "dancer").await;

    let (status, created) = call(
        &app,
        Method::POST,
        "/api/club",
        Some(&leader),
        Some(json!({
            "clubName": "Soul Train",
            "clubType": "CLUB",
            "intro": "funk styles",
            "description": "every friday",
            "locationName": "Hall B",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{created}");
    assert_eq!(created["leader"]["role"], "LEADER");
    let club = created["club"]["id"].as_i64().unwrap();

    let (status, applied) = call(
        &app,
        Method::POST,
        &format!("/api/club/{club}/apply"),
        Some(&dancer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(applied["status"], "PENDING");

    let applications = format!("/api/club/{club}/applications");
    let (status, body) = call(&app, Method::GET, &applications, Some(&dancer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);

    let (status, pending) = call(&app, Method::GET, &applications, Some(&leader), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (status, approved) = call(
        &app,
        Method::POST,
        &format!("/api/club/{club}/members/{dancer_id}/approve"),
        Some(&leader),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "ACTIVE");

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/club/{club}/apply"),
        Some(&dancer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_events_are_unprocessable() {
    let app = router();
    let (_, host) = signup(&app, "host").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/event",
        Some(&host),
        Some(json!({
            "scope": "GLOBAL",
            "clubId": null,
            "kind": "JAM",
            "title": "Cypher",
            "content": "open circle",
            "locationName": null,
            "capacity": 0,
            "startsAt": "2030-05-01T18:00:00",
            "endsAt": "2030-05-01T22:00:00",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
}

#[tokio::test]
async fn profile_and_club_edits_over_http() {
    let app = router();
    let (_, leader) = signup(&app, "leader").await;

    let (status, me) = call(
        &app,
        Method::PUT,
        "/api/account",
        Some(&leader),
        Some(json!({ "nickname": "captain" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{me}");
    assert_eq!(me["nickname"], "captain");

    let (_, created) = call(
        &app,
        Method::POST,
        "/api/club",
        Some(&leader),
        Some(json!({
            "clubName": "Flexers",
            "clubType": "CREW",
            "intro": "bone breaking",
            "description": "tuesdays",
            "locationName": "Basement",
        })),
    )
    .await;
    let club = created["club"]["id"].as_i64().unwrap();

    let (status, edited) = call(
        &app,
        Method::PUT,
        &format!("/api/club/{club}"),
        Some(&leader),
        Some(json!({ "description": "tuesdays and thursdays" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{edited}");
    assert_eq!(edited["description"], "tuesdays and thursdays");
    assert_eq!(edited["intro"], "bone breaking");
}
