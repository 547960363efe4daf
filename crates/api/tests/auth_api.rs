//! HTTP-level integration tests for the auth and session endpoints.
//!
//! Tests cover registration and email verification, login, token refresh and
//! rotation, logout, device caps,
//! session listing and termination, and capability enforcement. All run
//! against in-memory stores.

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::{Method, StatusCode};
use chrono::Duration;
use serde_json::json;
use common::{
    bearer, body_json, build_test_app, cookies, get, get_auth, login, post_json, send,
    set_cookies, user_agent, PASSWORD,
};
use warden_core::roles::Role;

const EMAIL: &str = "ada@example.com";

// ---------------------------------------------------------------------------
// Registration and verification
// ---------------------------------------------------------------------------

const NEW_PASSWORD: &str = "analytical-engine-1843";

async fn register(app: &common::TestApp, email: &str) -> axum::response::Response {
    post_json(
        app.app(),
        "/api/v1/auth/register",
        json!({ "name": "Ada Lovelace", "email": email, "password": NEW_PASSWORD }),
    )
    .await
}

async fn login_with(app: &common::TestApp, email: &str, password: &str) -> axum::response::Response {
    post_json(
        app.app(),
        "/api/v1/auth/login",
        json!({ "email": email, "password": password }),
    )
    .await
}

#[tokio::test]
async fn test_register_verify_then_login() {
    let app = build_test_app(2);

    let response = register(&app, EMAIL).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["user"]["email"], EMAIL);
    assert_eq!(body["data"]["user"]["is_verified"], false);
    assert!(body["data"]["user"].get("password_hash").is_none());
    assert!(body["data"]["message"]
        .as_str()
        .unwrap()
        .contains("check your email"));

    let before = login_with(&app, EMAIL, NEW_PASSWORD).await;
    assert_eq!(before.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(before).await["code"], "NOT_VERIFIED");

    let token = app.mailer.last_token_for(EMAIL).await.unwrap();
    let verified = get(app.app(), &format!("/api/v1/auth/verify/{token}")).await;
    assert_eq!(verified.status(), StatusCode::OK);
    assert_eq!(body_json(verified).await["data"]["user"]["is_verified"], true);

    let after = login_with(&app, EMAIL, NEW_PASSWORD).await;
    assert_eq!(after.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = build_test_app(2);
    assert_eq!(register(&app, EMAIL).await.status(), StatusCode::CREATED);

    let again = register(&app, "ADA@example.com").await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    let body = body_json(again).await;
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(body["error"], "User already exists with this email");
}

#[tokio::test]
async fn test_register_rejects_missing_and_weak_input() {
    let app = build_test_app(2);

    let missing = post_json(
        app.app(),
        "/api/v1/auth/register",
        json!({ "name": "", "email": EMAIL, "password": NEW_PASSWORD }),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(missing).await["code"], "BAD_REQUEST");

    let weak = post_json(
        app.app(),
        "/api/v1/auth/register",
        json!({ "name": "Ada", "email": EMAIL, "password": "short" }),
    )
    .await;
    assert_eq!(weak.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(weak).await["code"], "VALIDATION_ERROR");
    assert!(app.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_register_reports_unsent_email() {
    let app = build_test_app(2);
    app.mailer.set_failing(true);

    let response = register(&app, EMAIL).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(body_json(response).await["data"]["message"]
        .as_str()
        .unwrap()
        .contains("could not be sent"));
}

#[tokio::test]
async fn test_verify_rejects_expired_and_unknown_tokens() {
    let app = build_test_app(2);
    register(&app, EMAIL).await;
    let token = app.mailer.last_token_for(EMAIL).await.unwrap();

    let unknown = get(app.app(), "/api/v1/auth/verify/not-a-real-token").await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    let body = body_json(unknown).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"], "Invalid verification token");

    app.clock.advance(Duration::minutes(10));
    let expired = get(app.app(), &format!("/api/v1/auth/verify/{token}")).await;
    assert_eq!(expired.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(expired).await["error"], "Verification token has expired");

    let login = login_with(&app, EMAIL, NEW_PASSWORD).await;
    assert_eq!(body_json(login).await["code"], "NOT_VERIFIED");
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_login_success_sets_cookies() {
    let app = build_test_app(2);
    let user = app.create_user(EMAIL, Role::User, true).await;

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/auth/login",
        &[user_agent("Firefox")],
        Some(serde_json::json!({ "email": EMAIL, "password": PASSWORD })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")));
    assert!(cookies
        .iter()
        .all(|c| c.contains("HttpOnly") && c.contains("SameSite=Strict")));

    let json = body_json(response).await;
    let data = &json["data"];
    assert!(data["access_token"].is_string());
    assert!(data["refresh_token"].is_string());
    assert!(data["access_expires_at"].is_string());
    assert!(data["refresh_expires_at"].is_string());
    assert_eq!(data["user"]["id"], user.id);
    assert_eq!(data["user"]["email"], EMAIL);
    assert_eq!(data["user"]["role"], "user");
    assert!(data["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_login_wrong_password_and_unknown_user_match() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, true).await;

    let wrong = post_json(
        app.app(),
        "/api/v1/auth/login",
        serde_json::json!({ "email": EMAIL, "password": "incorrect" }),
    )
    .await;
    let unknown = post_json(
        app.app(),
        "/api/v1/auth/login",
        serde_json::json!({ "email": "ghost@example.com", "password": PASSWORD }),
    )
    .await;

    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong).await, body_json(unknown).await);
}

#[tokio::test]
async fn test_login_unverified_user() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, false).await;

    let response = post_json(
        app.app(),
        "/api/v1/auth/login",
        serde_json::json!({ "email": EMAIL, "password": PASSWORD }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "NOT_VERIFIED");
}

#[tokio::test]
async fn test_login_requires_email_and_password() {
    let app = build_test_app(2);

    let response = post_json(
        app.app(),
        "/api/v1/auth/login",
        serde_json::json!({ "email": "", "password": "" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_refresh_rotates_and_old_token_fails() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, true).await;
    let data = login(app.app(), EMAIL, "laptop").await;
    let original = data["refresh_token"].as_str().unwrap().to_string();

    let response = post_json(
        app.app(),
        "/api/v1/auth/refresh",
        serde_json::json!({ "refresh_token": original }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookies(&response).len(), 2);
    let json = body_json(response).await;
    let rotated = json["data"]["refresh_token"].as_str().unwrap();
    assert_ne!(rotated, original);

    let replay = post_json(
        app.app(),
        "/api/v1/auth/refresh",
        serde_json::json!({ "refresh_token": original }),
    )
    .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_from_cookie() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, true).await;
    let data = login(app.app(), EMAIL, "laptop").await;
    let refresh = data["refresh_token"].as_str().unwrap();

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/auth/refresh",
        &[cookies(&[("refreshToken", refresh)])],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_token_is_unauthorized() {
    let app = build_test_app(2);
    let response = send(app.app(), Method::POST, "/api/v1/auth/refresh", &[], None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_refresh_token_reports_expired() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, true).await;
    let data = login(app.app(), EMAIL, "laptop").await;
    app.clock.advance(chrono::Duration::days(7));

    let response = post_json(
        app.app(),
        "/api/v1/auth/refresh",
        serde_json::json!({ "refresh_token": data["refresh_token"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "EXPIRED");
    assert!(app.sessions.is_empty().await);
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_logout_revokes_access_token() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, true).await;
    let data = login(app.app(), EMAIL, "laptop").await;
    let access = data["access_token"].as_str().unwrap();
    let refresh = data["refresh_token"].as_str().unwrap();

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/auth/logout",
        &[bearer(access), cookies(&[("refreshToken", refresh)])],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).iter().all(|c| c.contains("Max-Age=0")));

    let profile = get_auth(app.app(), "/api/v1/auth/profile", access).await;
    assert_eq!(profile.status(), StatusCode::UNAUTHORIZED);
    assert!(app.sessions.is_empty().await);

    // A second logout with the same credentials still succeeds.
    let again = send(
        app.app(),
        Method::POST,
        "/api/v1/auth/logout",
        &[bearer(access), cookies(&[("refreshToken", refresh)])],
        None,
    )
    .await;
    assert_eq!(again.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_without_credentials_succeeds() {
    let app = build_test_app(2);
    let response = send(app.app(), Method::POST, "/api/v1/auth/logout", &[], None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Device sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_device_cap_keeps_latest_login() {
    let app = build_test_app(1);
    app.create_user(EMAIL, Role::User, true).await;

    let phone = login(app.app(), EMAIL, "phone").await;
    app.clock.advance(chrono::Duration::seconds(1));
    let laptop = login(app.app(), EMAIL, "laptop").await;

    let response = send(
        app.app(),
        Method::GET,
        "/api/v1/auth/sessions",
        &[
            bearer(laptop["access_token"].as_str().unwrap()),
            cookies(&[("refreshToken", laptop["refresh_token"].as_str().unwrap())]),
        ],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let sessions = json["data"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["device_fingerprint"], "laptop");
    assert_eq!(sessions[0]["is_current"], true);

    let evicted = post_json(
        app.app(),
        "/api/v1/auth/refresh",
        serde_json::json!({ "refresh_token": phone["refresh_token"] }),
    )
    .await;
    assert_eq!(evicted.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_all_other_devices() {
    let app = build_test_app(3);
    app.create_user(EMAIL, Role::User, true).await;
    let current = login(app.app(), EMAIL, "device-a").await;
    login(app.app(), EMAIL, "device-b").await;
    login(app.app(), EMAIL, "device-c").await;

    let access = current["access_token"].as_str().unwrap();
    let refresh = current["refresh_token"].as_str().unwrap();

    let missing = send(
        app.app(),
        Method::POST,
        "/api/v1/auth/logout-all-other-devices",
        &[bearer(access)],
        None,
    )
    .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(missing).await["code"], "MISSING_CURRENT_SESSION");

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/auth/logout-all-other-devices",
        &[bearer(access), ("x-refresh-token", refresh.to_string())],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["terminated_count"], 2);
    assert_eq!(app.sessions.len().await, 1);
}

#[tokio::test]
async fn test_terminate_other_and_own_session() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, true).await;
    let current = login(app.app(), EMAIL, "device-a").await;
    login(app.app(), EMAIL, "device-b").await;

    let access = current["access_token"].as_str().unwrap();
    let refresh = current["refresh_token"].as_str().unwrap();
    let auth = [bearer(access), cookies(&[("refreshToken", refresh)])];

    let list = body_json(send(app.app(), Method::GET, "/api/v1/auth/sessions", &auth, None).await).await;
    let sessions = list["data"].as_array().unwrap();
    let other_id = sessions
        .iter()
        .find(|s| s["is_current"] == false)
        .unwrap()["id"]
        .as_i64()
        .unwrap();
    let own_id = sessions
        .iter()
        .find(|s| s["is_current"] == true)
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let response = send(
        app.app(),
        Method::DELETE,
        &format!("/api/v1/auth/sessions/{other_id}"),
        &auth,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());

    let response = send(
        app.app(),
        Method::DELETE,
        &format!("/api/v1/auth/sessions/{own_id}"),
        &auth,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).iter().all(|c| c.contains("Max-Age=0")));

    // Terminating the current session revoked the access token too.
    let profile = get_auth(app.app(), "/api/v1/auth/profile", access).await;
    assert_eq!(profile.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_terminate_unknown_session_is_not_found() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, true).await;
    let data = login(app.app(), EMAIL, "laptop").await;

    let response = send(
        app.app(),
        Method::DELETE,
        "/api/v1/auth/sessions/9999",
        &[bearer(data["access_token"].as_str().unwrap())],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Identity and capabilities
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_profile_accepts_bearer_or_cookie() {
    let app = build_test_app(2);
    let user = app.create_user(EMAIL, Role::User, true).await;
    let data = login(app.app(), EMAIL, "laptop").await;
    let access = data["access_token"].as_str().unwrap();

    let via_header = get_auth(app.app(), "/api/v1/auth/profile", access).await;
    assert_eq!(via_header.status(), StatusCode::OK);
    assert_eq!(body_json(via_header).await["data"]["id"], user.id);

    let via_cookie = send(
        app.app(),
        Method::GET,
        "/api/v1/auth/profile",
        &[cookies(&[("accessToken", access)])],
        None,
    )
    .await;
    assert_eq!(via_cookie.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_lowercase_bearer_scheme_wins_over_stale_cookie() {
    let app = build_test_app(2);
    let user = app.create_user(EMAIL, Role::User, true).await;
    let data = login(app.app(), EMAIL, "laptop").await;
    let access = data["access_token"].as_str().unwrap();

    let response = send(
        app.app(),
        Method::GET,
        "/api/v1/auth/profile",
        &[
            (AUTHORIZATION.as_str(), format!("bearer {access}")),
            cookies(&[("accessToken", "stale-cookie-token")]),
        ],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["id"], user.id);
}

#[tokio::test]
async fn test_profile_rejects_missing_and_refresh_tokens() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, true).await;
    let data = login(app.app(), EMAIL, "laptop").await;

    let missing = get(app.app(), "/api/v1/auth/profile").await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong_kind = get_auth(
        app.app(),
        "/api/v1/auth/profile",
        data["refresh_token"].as_str().unwrap(),
    )
    .await;
    assert_eq!(wrong_kind.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_expires() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, true).await;
    let data = login(app.app(), EMAIL, "laptop").await;
    app.clock.advance(chrono::Duration::minutes(15));

    let response = get_auth(
        app.app(),
        "/api/v1/auth/profile",
        data["access_token"].as_str().unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_route_requires_admin_capability() {
    let app = build_test_app(2);
    app.create_user(EMAIL, Role::User, true).await;
    app.create_user("root@example.com", Role::Admin, true).await;

    let user = login(app.app(), EMAIL, "laptop").await;
    let admin = login(app.app(), "root@example.com", "laptop").await;

    let denied = get_auth(
        app.app(),
        "/api/v1/auth/admin",
        user["access_token"].as_str().unwrap(),
    )
    .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let granted = get_auth(
        app.app(),
        "/api/v1/auth/admin",
        admin["access_token"].as_str().unwrap(),
    )
    .await;
    assert_eq!(granted.status(), StatusCode::OK);
    assert_eq!(
        body_json(granted).await["data"]["message"],
        "Admin access granted"
    );
}

#[tokio::test]
async fn test_deleted_user_token_is_not_found() {
    let app = build_test_app(2);
    let user = app.create_user(EMAIL, Role::User, true).await;
    let data = login(app.app(), EMAIL, "laptop").await;
    app.users.remove(user.id).await;

    let response = get_auth(
        app.app(),
        "/api/v1/auth/profile",
        data["access_token"].as_str().unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
