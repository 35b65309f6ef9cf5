mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn other_tenants_documents_are_never_returned_or_changed() {
    let app = TestApp::new();
    let alice = app.owner("alice@iso.test", "Alice Store").await;
    let bob = app.owner("bob@iso.test", "Bob Store").await;

    let category = app.create_category(&bob.token, "Bob's Category").await;
    let product = app.create_product(&bob.token, "Bob's Product", 4.0, 7).await;
    let sale = app
        .sale(
            &bob.token,
            json!([{ "productId": product, "quantity": 1, "price": 4.0 }]),
        )
        .await;
    let sale_id = sale.body["sale"]["id"].as_str().unwrap().to_string();

    for uri in [
        format!("/api/categories/{}", category),
        format!("/api/products/{}", product),
        format!("/api/sales/{}", sale_id),
    ] {
        let res = app.get(&uri, &alice.token).await;
        assert_eq!(res.status, StatusCode::FORBIDDEN, "{} {}", uri, res.text);
        assert!(res.body.get("id").is_none());
    }

    let update = app
        .put(
            &format!("/api/products/{}", product),
            &alice.token,
            json!({ "price": 0.01 }),
        )
        .await;
    assert_eq!(update.status, StatusCode::FORBIDDEN);

    let delete = app
        .delete(&format!("/api/categories/{}", category), &alice.token, None)
        .await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);

    let product_doc = app.get(&format!("/api/products/{}", product), &bob.token).await;
    assert_eq!(product_doc.body["price"], 4.0);
    let category_doc = app
        .get(&format!("/api/categories/{}", category), &bob.token)
        .await;
    assert_eq!(category_doc.status, StatusCode::OK);

    let alice_products = app.get("/api/products", &alice.token).await;
    assert!(alice_products.body.as_array().unwrap().is_empty());
    let alice_sales = app.get("/api/sales", &alice.token).await;
    assert!(alice_sales.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn missing_documents_are_not_found_before_tenant_checks() {
    let app = TestApp::new();
    let owner = app.owner("owner@nf.test", "NF Store").await;

    let res = app.get("/api/products/nope", &owner.token).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"], "Product not found");
}

#[tokio::test]
async fn bulk_delete_skips_foreign_ids() {
    let app = TestApp::new();
    let alice = app.owner("alice@bulk.test", "Alice Bulk").await;
    let bob = app.owner("bob@bulk.test", "Bob Bulk").await;

    let a1 = app.create_product(&alice.token, "A1", 1.0, 1).await;
    let a2 = app.create_product(&alice.token, "A2", 1.0, 1).await;
    let foreign = app.create_product(&bob.token, "B1", 1.0, 1).await;

    let res = app
        .delete(
            "/api/products/bulk-delete",
            &alice.token,
            Some(json!({ "ids": [a1, a2, foreign] })),
        )
        .await;

    assert_eq!(res.status, StatusCode::OK, "{}", res.text);
    assert_eq!(res.body["deleted"], 2);
    assert_eq!(res.body["message"], "2 products deleted successfully");

    assert_eq!(
        app.get(&format!("/api/products/{}", a1), &alice.token)
            .await
            .status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(app.stock_of(&bob.token, &foreign).await, 1);
}

#[tokio::test]
async fn bulk_delete_categories_reports_count() {
    let app = TestApp::new();
    let owner = app.owner("owner@bulkcat.test", "Cat Store").await;
    let c1 = app.create_category(&owner.token, "One").await;
    let c2 = app.create_category(&owner.token, "Two").await;

    let res = app
        .delete(
            "/api/categories/bulk-delete",
            &owner.token,
            Some(json!({ "ids": [c1, c2, "missing"] })),
        )
        .await;

    assert_eq!(res.status, StatusCode::OK, "{}", res.text);
    assert_eq!(res.body["deleted"], 2);
    assert_eq!(res.body["message"], "2 categories deleted successfully");
}

#[tokio::test]
async fn token_without_business_claim_is_refused_on_tenant_routes() {
    let app = TestApp::new();
    app.register("fresh@claims.test").await;
    let (token, refresh_token, _) = app.login("fresh@claims.test").await;

    let res = app
        .post("/api/business", Some(&token), json!({ "name": "Claims Cafe" }))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert!(res.body["note"].as_str().unwrap().contains("refresh"));

    // The old token still has no business claim.
    let stale = app.get("/api/products", &token).await;
    assert_eq!(stale.status, StatusCode::FORBIDDEN, "{}", stale.text);

    // Profile falls back to the user document.
    let profile = app.get("/api/business/profile", &token).await;
    assert_eq!(profile.status, StatusCode::OK, "{}", profile.text);
    assert_eq!(profile.body["name"], "Claims Cafe");

    let (fresh, _) = app.refresh(&refresh_token).await;
    let res = app.get("/api/products", &fresh).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text);
}

#[tokio::test]
async fn tenant_routes_require_a_bearer_token() {
    let app = TestApp::new();

    let missing = app.call(Method::GET, "/api/products", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let invalid = app
        .call(Method::GET, "/api/sales", Some("not-a-token"), None)
        .await;
    assert_eq!(invalid.status, StatusCode::UNAUTHORIZED);
    assert_eq!(invalid.body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn business_reads_are_limited_to_members() {
    let app = TestApp::new();
    let alice = app.owner("alice@biz.test", "Alice Biz").await;
    let bob = app.owner("bob@biz.test", "Bob Biz").await;

    let res = app
        .get(&format!("/api/business/{}", bob.business_id), &alice.token)
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let list = app.get("/api/business", &alice.token).await;
    let list = list.body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], alice.business_id.as_str());

    let update = app
        .put(
            &format!("/api/business/{}", bob.business_id),
            &alice.token,
            json!({ "name": "Hijacked" }),
        )
        .await;
    assert_eq!(update.status, StatusCode::FORBIDDEN);
}
