mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn register_login_and_read_profile() {
    let app = TestApp::new();

    let registered = app.register("Jane@Pos.test").await;
    assert_eq!(registered["message"], "User registered successfully");
    assert_eq!(registered["user"]["email"], "jane@pos.test");
    assert_eq!(registered["user"]["role"], "user");
    assert!(registered["user"]["businessId"].is_null());

    let (token, _, uid) = app.login("jane@pos.test").await;
    let me = app.get("/api/auth/me", &token).await;
    assert_eq!(me.status, StatusCode::OK, "{}", me.text);
    assert_eq!(me.body["uid"], uid.as_str());
    assert_eq!(me.body["displayName"], "Test User");
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let app = TestApp::new();
    app.register("dup@pos.test").await;

    let res = app
        .post(
            "/api/auth/register",
            None,
            json!({ "email": "DUP@pos.test", "password": PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.body["error"], "Email already registered");
}

#[tokio::test]
async fn registration_input_is_validated() {
    let app = TestApp::new();

    let short = app
        .post(
            "/api/auth/register",
            None,
            json!({ "email": "short@pos.test", "password": "123" }),
        )
        .await;
    assert_eq!(short.status, StatusCode::UNPROCESSABLE_ENTITY);

    let bad_email = app
        .post(
            "/api/auth/register",
            None,
            json!({ "email": "not-an-email", "password": PASSWORD }),
        )
        .await;
    assert_eq!(bad_email.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new();
    app.register("wrong@pos.test").await;

    let res = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "wrong@pos.test", "password": "not-the-password" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "Invalid credentials");

    let unknown = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "ghost@pos.test", "password": PASSWORD }),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_rejects_garbage() {
    let app = TestApp::new();
    let res = app
        .post(
            "/api/auth/refresh",
            None,
            json!({ "refreshToken": "nope" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_reset_flow() {
    let app = TestApp::new();
    app.register("reset@pos.test").await;

    let res = app
        .post(
            "/api/auth/forgot-password",
            None,
            json!({ "email": "reset@pos.test" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "Password reset email sent");

    // Unknown addresses get the same answer.
    let res = app
        .post(
            "/api/auth/forgot-password",
            None,
            json!({ "email": "nobody@pos.test" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let sent = app.email.sent().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "reset@pos.test");
    let token = sent[0].link.split("?token=").nth(1).unwrap().to_string();

    let res = app
        .post(
            "/api/auth/reset-password",
            None,
            json!({ "token": token, "newPassword": "battery-staple" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text);
    assert_eq!(res.body["message"], "Password has been reset");

    let old = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "reset@pos.test", "password": PASSWORD }),
        )
        .await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);

    let new = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "reset@pos.test", "password": "battery-staple" }),
        )
        .await;
    assert_eq!(new.status, StatusCode::OK);

    let reused = app
        .post(
            "/api/auth/reset-password",
            None,
            json!({ "token": token, "newPassword": "another-one" }),
        )
        .await;
    assert_eq!(reused.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn owner_enrols_staff_into_their_business() {
    let app = TestApp::new();
    let owner = app.owner("owner@staff.test", "Staffed Shop").await;

    let res = app
        .post(
            "/api/auth/register",
            Some(&owner.token),
            json!({ "email": "clerk@staff.test", "password": PASSWORD, "role": "staff" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.text);
    assert_eq!(res.body["user"]["role"], "staff");
    assert_eq!(res.body["user"]["businessId"], owner.business_id.as_str());

    let (clerk, _, _) = app.login("clerk@staff.test").await;
    let product = app.create_product(&owner.token, "Tea", 2.0, 5).await;

    // Staff can sell but not administer the business.
    let sale = app
        .sale(
            &clerk,
            json!([{ "productId": product, "quantity": 1, "price": 2.0 }]),
        )
        .await;
    assert_eq!(sale.status, StatusCode::CREATED, "{}", sale.text);

    let update = app
        .put(
            &format!("/api/business/{}", owner.business_id),
            &clerk,
            json!({ "name": "Mine now" }),
        )
        .await;
    assert_eq!(update.status, StatusCode::FORBIDDEN);

    let business = app
        .get(&format!("/api/business/{}", owner.business_id), &clerk)
        .await;
    assert_eq!(business.status, StatusCode::OK);
}

#[tokio::test]
async fn anonymous_role_assignment_is_forbidden() {
    let app = TestApp::new();

    let res = app
        .post(
            "/api/auth/register",
            None,
            json!({ "email": "climber@pos.test", "password": PASSWORD, "role": "owner" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let login = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "climber@pos.test", "password": PASSWORD }),
        )
        .await;
    assert_eq!(login.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_with_a_bad_token_is_unauthorized() {
    let app = TestApp::new();
    let res = app
        .call(
            Method::POST,
            "/api/auth/register",
            Some("garbage"),
            Some(json!({ "email": "x@pos.test", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn update_and_delete_account() {
    let app = TestApp::new();
    app.register("leaver@pos.test").await;
    let (token, _, _) = app.login("leaver@pos.test").await;

    let res = app
        .put(
            "/api/auth/update",
            &token,
            json!({ "displayName": "Renamed", "photoURL": "https://img.pos.test/me.png" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text);
    assert_eq!(res.body["message"], "Profile updated successfully");

    let me = app.get("/api/auth/me", &token).await;
    assert_eq!(me.body["displayName"], "Renamed");
    assert_eq!(me.body["photoUrl"], "https://img.pos.test/me.png");

    let bad = app
        .put("/api/auth/update", &token, json!({ "photoURL": "not a url" }))
        .await;
    assert_eq!(bad.status, StatusCode::UNPROCESSABLE_ENTITY);

    let res = app.delete("/api/auth/delete", &token, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "Account deleted successfully");

    let login = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "leaver@pos.test", "password": PASSWORD }),
        )
        .await;
    assert_eq!(login.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleting_a_business_demotes_the_owner() {
    let app = TestApp::new();
    let owner = app.owner("closer@pos.test", "Closing Down").await;

    let res = app
        .delete(&format!("/api/business/{}", owner.business_id), &owner.token, None)
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text);

    let (token, _) = app.refresh(&owner.refresh_token).await;
    let me = app.get("/api/auth/me", &token).await;
    assert_eq!(me.body["role"], "user");
    assert!(me.body["businessId"].is_null());

    let gone = app
        .get(&format!("/api/business/{}", owner.business_id), &token)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}
