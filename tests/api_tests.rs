//! Router-level tests against in-memory stores.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use referral_tracker::{
    auth::{repo::MemoryUserRepo, repo_types::Role, SessionUser},
    build_app,
    config::ResumeMode,
    referrals::repo::MemoryReferralRepo,
    AppState,
};
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt; // for .oneshot()
use uuid::Uuid;

struct TestApp {
    app: Router,
    state: AppState,
    users: MemoryUserRepo,
    referrals: MemoryReferralRepo,
}

fn test_app(mode: ResumeMode) -> TestApp {
    let base = AppState::fake_with_mode(mode);
    let users = MemoryUserRepo::new();
    let referrals = MemoryReferralRepo::new();
    let state = base.with_repos(Arc::new(users.clone()), Arc::new(referrals.clone()));
    TestApp {
        app: build_app(state.clone()),
        state,
        users,
        referrals,
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn json_req(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut b = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    b.body(Body::from(body.to_string())).unwrap()
}

fn get_req(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().method(Method::GET).uri(uri);
    if let Some(t) = token {
        b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    b.body(Body::empty()).unwrap()
}

fn delete_req(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn register_and_login(app: &Router, name: &str, email: &str, role: Option<&str>) -> String {
    let mut body = json!({ "name": name, "email": email, "password": "secret1" });
    if let Some(r) = role {
        body["role"] = json!(r);
    }
    let (status, _) = send(app, json_req(Method::POST, "/api/auth/register", None, body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        json_req(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": email, "password": "secret1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

fn referral_body() -> Value {
    json!({
        "name": "Grace Hopper",
        "email": "grace@example.com",
        "phone": "01234567890",
        "jobTitle": "Backend Engineer",
        "resumeUrl": "https://example.com/grace.pdf"
    })
}

async fn create_referral(app: &Router, token: &str, body: Value) -> Uuid {
    let (status, body) = send(app, json_req(Method::POST, "/api/candidates", Some(token), body)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn banner_and_health() {
    let t = test_app(ResumeMode::Url);
    let (status, body) = send(&t.app, get_req("/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("Candidate Referral Management API"));

    let (status, body) = send(&t.app, get_req("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));
}

#[tokio::test]
async fn register_login_refer_and_list() {
    let t = test_app(ResumeMode::Url);

    let (status, body) = send(
        &t.app,
        json_req(
            Method::POST,
            "/api/auth/register",
            None,
            json!({ "name": "A", "email": "a@b.com", "password": "secret1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["msg"], "User registered successfully");
    assert!(body.get("token").is_none());

    let (status, login) = send(
        &t.app,
        json_req(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": "a@b.com", "password": "secret1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["user"]["role"], "user");
    assert_eq!(login["user"]["name"], "A");
    let token = login["token"].as_str().unwrap();

    let claims = t.state.jwt.verify(token).unwrap();
    assert_eq!(claims.sub.to_string(), login["user"]["id"].as_str().unwrap());
    assert_eq!(claims.role, Role::User);

    let id = create_referral(&t.app, token, referral_body()).await;

    let (status, list) = send(&t.app, get_req("/api/candidates", Some(token))).await;
    assert_eq!(status, StatusCode::OK);
    let items = list.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], id.to_string());
    assert_eq!(items[0]["status"], "Pending");
    assert_eq!(items[0]["resumeUrl"], "https://example.com/grace.pdf");
    assert_eq!(items[0]["referredBy"]["name"], "A");
    assert_eq!(items[0]["referredBy"]["email"], "a@b.com");
}

#[tokio::test]
async fn duplicate_registration_is_conflict() {
    let t = test_app(ResumeMode::Url);
    register_and_login(&t.app, "A", "a@b.com", None).await;

    let (status, body) = send(
        &t.app,
        json_req(
            Method::POST,
            "/api/auth/register",
            None,
            json!({ "name": "Other", "email": "a@b.com", "password": "different" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["msg"], "User already exists");
    assert_eq!(t.users.len().await, 1);
}

#[tokio::test]
async fn malformed_registration_is_bad_request() {
    let t = test_app(ResumeMode::Url);
    let (status, body) = send(
        &t.app,
        json_req(Method::POST, "/api/auth/register", None, json!({ "email": "a@b.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Please enter all required fields");

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].is_string());
}

#[tokio::test]
async fn login_failures_look_identical() {
    let t = test_app(ResumeMode::Url);
    register_and_login(&t.app, "A", "a@b.com", None).await;

    let attempt = |email: &'static str, password: &'static str| {
        json_req(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": email, "password": password }),
        )
    };
    let unknown = send(&t.app, attempt("ghost@b.com", "secret1")).await;
    let wrong = send(&t.app, attempt("a@b.com", "nope")).await;
    assert_eq!(unknown.0, StatusCode::BAD_REQUEST);
    assert_eq!(unknown, wrong);
    assert_eq!(unknown.1["msg"], "Invalid credentials");
}

#[tokio::test]
async fn missing_and_invalid_tokens_are_unauthorized() {
    let t = test_app(ResumeMode::Url);

    let (status, body) = send(&t.app, get_req("/api/candidates", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "No token, authorization denied");

    let (status, body) = send(&t.app, get_req("/api/candidates", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "Token is not valid");
}

#[tokio::test]
async fn expired_token_never_reaches_handler() {
    let t = test_app(ResumeMode::Url);
    let session = SessionUser {
        id: Uuid::new_v4(),
        role: Role::Admin,
        name: "Old".into(),
    };
    let expired = t
        .state
        .jwt
        .sign_at(&session, OffsetDateTime::now_utc() - Duration::hours(25))
        .unwrap();

    let (status, body) = send(
        &t.app,
        json_req(Method::POST, "/api/candidates", Some(&expired), referral_body()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "Token has expired");
    assert_eq!(t.referrals.len().await, 0);

    let (status, _) = send(&t.app, get_req("/api/candidates", Some(&expired))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_role_cannot_change_status_or_delete() {
    let t = test_app(ResumeMode::Url);
    let user = register_and_login(&t.app, "U", "u@corp.com", None).await;
    let id = create_referral(&t.app, &user, referral_body()).await;

    let (status, body) = send(
        &t.app,
        json_req(
            Method::PATCH,
            &format!("/api/candidates/{id}/status"),
            Some(&user),
            json!({ "status": "Hired" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["msg"], "Access denied: insufficient role");

    let (status, _) = send(&t.app, delete_req(&format!("/api/candidates/{id}"), &user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let stored = t.referrals.get(id).await.unwrap();
    assert_eq!(stored.status.as_str(), "Pending");
}

#[tokio::test]
async fn admin_status_updates_validate_values() {
    let t = test_app(ResumeMode::Url);
    let user = register_and_login(&t.app, "U", "u@corp.com", None).await;
    let admin = register_and_login(&t.app, "Boss", "boss@corp.com", Some("admin")).await;
    let id = create_referral(&t.app, &user, referral_body()).await;
    let uri = format!("/api/candidates/{id}/status");

    let (status, body) = send(
        &t.app,
        json_req(Method::PATCH, &uri, Some(&admin), json!({ "status": "Approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Invalid status value");
    assert_eq!(t.referrals.get(id).await.unwrap().status.as_str(), "Pending");

    let (status, body) = send(
        &t.app,
        json_req(Method::PATCH, &uri, Some(&admin), json!({ "status": "Reviewed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.to_string());
    assert_eq!(body["status"], "Reviewed");

    let (status, _) = send(
        &t.app,
        json_req(
            Method::PATCH,
            &format!("/api/candidates/{}/status", Uuid::new_v4()),
            Some(&admin),
            json!({ "status": "Hired" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_twice_is_not_found() {
    let t = test_app(ResumeMode::Url);
    let admin = register_and_login(&t.app, "Boss", "boss@corp.com", Some("admin")).await;
    let id = create_referral(&t.app, &admin, referral_body()).await;
    let uri = format!("/api/candidates/{id}");

    let (status, body) = send(&t.app, delete_req(&uri, &admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "Candidate deleted");

    let (status, body) = send(&t.app, delete_req(&uri, &admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "Candidate not found");
}

#[tokio::test]
async fn invalid_phone_is_rejected_without_persisting() {
    let t = test_app(ResumeMode::Url);
    let user = register_and_login(&t.app, "U", "u@corp.com", None).await;

    for phone in ["12345", "abc1234567", "123456789012345678"] {
        let mut body = referral_body();
        body["phone"] = json!(phone);
        let (status, resp) =
            send(&t.app, json_req(Method::POST, "/api/candidates", Some(&user), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["msg"], "Invalid phone number");
    }
    assert_eq!(t.referrals.len().await, 0);
}

#[tokio::test]
async fn listing_filters_by_status_and_title() {
    let t = test_app(ResumeMode::Url);
    let user = register_and_login(&t.app, "U", "u@corp.com", None).await;
    let admin = register_and_login(&t.app, "Boss", "boss@corp.com", Some("admin")).await;

    let backend = create_referral(&t.app, &user, referral_body()).await;
    let mut design = referral_body();
    design["jobTitle"] = json!("Product Designer");
    let designer = create_referral(&t.app, &user, design).await;

    send(
        &t.app,
        json_req(
            Method::PATCH,
            &format!("/api/candidates/{designer}/status"),
            Some(&admin),
            json!({ "status": "Hired" }),
        ),
    )
    .await;

    let (status, hired) = send(&t.app, get_req("/api/candidates?status=Hired", Some(&user))).await;
    assert_eq!(status, StatusCode::OK);
    let hired = hired.as_array().unwrap();
    assert_eq!(hired.len(), 1);
    assert!(hired.iter().all(|r| r["status"] == "Hired"));

    let (_, by_title) = send(&t.app, get_req("/api/candidates?jobTitle=BACKEND", Some(&user))).await;
    let by_title = by_title.as_array().unwrap();
    assert_eq!(by_title.len(), 1);
    assert_eq!(by_title[0]["id"], backend.to_string());

    let (_, everything) = send(&t.app, get_req("/api/candidates", Some(&admin))).await;
    let everything = everything.as_array().unwrap();
    assert_eq!(everything.len(), 2);
    assert_eq!(everything[0]["id"], designer.to_string());

    let (status, _) = send(&t.app, get_req("/api/candidates?status=Approved", Some(&user))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

const BOUNDARY: &str = "referral-test-boundary";

fn multipart_req(token: &str, resume: Option<(&str, &str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in [
        ("name", "Grace Hopper"),
        ("email", "grace@example.com"),
        ("phone", "01234567890"),
        ("jobTitle", "Compiler Engineer"),
    ] {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = resume {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/candidates")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn upload_mode_stores_and_serves_pdf() {
    let t = test_app(ResumeMode::Upload);
    let user = register_and_login(&t.app, "U", "u@corp.com", None).await;

    let (status, body) = send(
        &t.app,
        multipart_req(&user, Some(("grace cv.pdf", "application/pdf", b"%PDF-1.7 test"))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

    let stored = t.referrals.get(id).await.unwrap();
    assert!(stored.resume_url.starts_with("/uploads/"));
    assert!(stored.resume_url.ends_with("-grace_cv.pdf"));

    let resp = t
        .app
        .clone()
        .oneshot(get_req(&stored.resume_url, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.7 test");
}

#[tokio::test]
async fn upload_mode_rejects_non_pdf_and_json() {
    let t = test_app(ResumeMode::Upload);
    let user = register_and_login(&t.app, "U", "u@corp.com", None).await;

    let (status, body) = send(
        &t.app,
        multipart_req(&user, Some(("cv.docx", "application/msword", b"PK..."))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Only PDF files are allowed");

    let (status, _) = send(
        &t.app,
        json_req(Method::POST, "/api/candidates", Some(&user), referral_body()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(t.referrals.len().await, 0);

    let (status, _) = send(&t.app, multipart_req(&user, None)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn deleting_a_referral_removes_its_upload() {
    let t = test_app(ResumeMode::Upload);
    let user = register_and_login(&t.app, "U", "u@corp.com", None).await;
    let admin = register_and_login(&t.app, "Boss", "boss@corp.com", Some("admin")).await;

    let (_, body) = send(
        &t.app,
        multipart_req(&user, Some(("cv.pdf", "application/pdf", b"%PDF-1.7"))),
    )
    .await;
    let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let url = t.referrals.get(id).await.unwrap().resume_url;

    let (status, _) = send(&t.app, delete_req(&format!("/api/candidates/{id}"), &admin)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&t.app, get_req(&url, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_upload_is_payload_too_large() {
    let t = test_app(ResumeMode::Upload);
    let user = register_and_login(&t.app, "U", "u@corp.com", None).await;

    let big = vec![b'x'; t.state.config.uploads.max_bytes + 512 * 1024];
    let (status, body) = send(
        &t.app,
        multipart_req(&user, Some(("big.pdf", "application/pdf", &big[..]))),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["msg"].is_string());
    assert_eq!(t.referrals.len().await, 0);
}

#[tokio::test]
async fn url_mode_rejects_multipart() {
    let t = test_app(ResumeMode::Url);
    let user = register_and_login(&t.app, "U", "u@corp.com", None).await;
    let (status, body) = send(&t.app, multipart_req(&user, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].as_str().unwrap().contains("disabled"));
}
