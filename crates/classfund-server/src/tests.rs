//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tempfile::TempDir;
use tower::ServiceExt;

use classfund_core::config::VerifyConfig;
use classfund_core::db::Database;
use classfund_core::models::{CycleStatus, NewFeeCycle};
use classfund_core::storage::ImageStore;

/// App wired against a throwaway database: user 1 "Owner", user 2 "Payer",
/// no OCR backend, auth disabled (header still honored when present)
fn setup_test_app() -> (Router, Database, TempDir) {
    let db = Database::in_memory().unwrap();
    db.create_user("Owner", "owner@example.com", None).unwrap();
    db.create_user("Nguyen Van A", "a@example.com", None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = ImageStore::new(dir.path());
    let config = ServerConfig {
        require_auth: false,
        allowed_origins: vec![],
    };
    let app = create_router(db.clone(), store, None, VerifyConfig::default(), config);
    (app, db, dir)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, user: i64) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-classfund-user", user.to_string())
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, user: i64, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-classfund-user", user.to_string())
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Class 1 owned by user 1, user 2 joined as member, one active cycle with
/// invoices generated. Returns (class_id, cycle_id, payer_invoice_id).
fn seed_class(db: &Database) -> (i64, i64, i64) {
    let class = db.create_class("10A1", 1).unwrap();
    let member = db.join_class(class.id, 2).unwrap();
    let cycle = db
        .create_fee_cycle(&NewFeeCycle {
            class_id: class.id,
            name: "Thang 9".into(),
            term: None,
            amount_per_member: 200_000,
            due_date: None,
            status: CycleStatus::Active,
            allow_late: true,
        })
        .unwrap();
    db.generate_invoices(cycle.id, None).unwrap();
    let invoice_id = db.my_invoices(member.id).unwrap().remove(0).id;
    (class.id, cycle.id, invoice_id)
}

// ========== Health & identity ==========

#[tokio::test]
async fn test_health() {
    let (app, _db, _dir) = setup_test_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_required_when_enabled() {
    let db = Database::in_memory().unwrap();
    db.create_user("Owner", "owner@example.com", None).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(
        db,
        ImageStore::new(dir.path()),
        None,
        VerifyConfig::default(),
        ServerConfig::default(), // require_auth = true
    );

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(get("/api/me", 1)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_get_me() {
    let (app, _db, _dir) = setup_test_app();
    let response = app.oneshot(get("/api/me", 2)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["name"], "Nguyen Van A");
}

// ========== Classes ==========

#[tokio::test]
async fn test_create_and_join_class() {
    let (app, _db, _dir) = setup_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/classes", 1, serde_json::json!({"name": "10A1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["role"], "owner");
    let code = json["class"]["code"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json("/api/classes/join", 2, serde_json::json!({"code": code})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["role"], "member");

    let response = app
        .clone()
        .oneshot(get("/api/classes/1/my-role", 2))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["role"], "member");

    let response = app.oneshot(get("/api/classes/1/members", 1)).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_non_member_is_forbidden() {
    let (app, db, _dir) = setup_test_app();
    seed_class(&db);
    db.create_user("Stranger", "x@example.com", None).unwrap(); // user 3

    let response = app.oneshot(get("/api/classes/1/my-invoices", 3)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_member_cannot_use_treasurer_endpoints() {
    let (app, db, _dir) = setup_test_app();
    seed_class(&db);

    let response = app
        .clone()
        .oneshot(get("/api/classes/1/payments", 2))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(post_json(
            "/api/classes/1/expenses",
            2,
            serde_json::json!({"title": "x", "amount": 10}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ========== Payment flow ==========

#[tokio::test]
async fn test_submit_payment_flow() {
    let (app, db, _dir) = setup_test_app();
    let (_class, _cycle, invoice_id) = seed_class(&db);

    let uri = format!("/api/classes/1/invoices/{}/payments", invoice_id);
    let response = app
        .clone()
        .oneshot(post_json(
            &uri,
            2,
            serde_json::json!({"amount": 200000, "method": "bank"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "submitted");
    assert_eq!(json["amount"], 200_000);

    // invoice bumped out of unpaid
    let invoice = db.get_invoice(invoice_id).unwrap().unwrap();
    assert_eq!(invoice.status.as_str(), "submitted");

    // owner sees it in the review queue
    let response = app
        .clone()
        .oneshot(get("/api/classes/1/payments", 1))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["payments"].as_array().unwrap().len(), 1);
    assert_eq!(json["payments"][0]["payer_name"], "Nguyen Van A");

    // grouped variant
    let response = app
        .oneshot(get("/api/classes/1/payments?group=cycle", 1))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["cycles"][0]["cycle_name"], "Thang 9");
}

#[tokio::test]
async fn test_cannot_submit_on_someone_elses_invoice() {
    let (app, db, _dir) = setup_test_app();
    let (class_id, _cycle, _invoice) = seed_class(&db);

    // user 1's own invoice id
    let owner_member = db.member_for_user(class_id, 1).unwrap().unwrap();
    let owner_invoice = db.my_invoices(owner_member.id).unwrap().remove(0).id;

    let uri = format!("/api/classes/1/invoices/{}/payments", owner_invoice);
    let response = app
        .oneshot(post_json(&uri, 2, serde_json::json!({"amount": 1000})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_upload_proof_stores_image() {
    let (app, db, _dir) = setup_test_app();
    let (_class, _cycle, invoice_id) = seed_class(&db);

    let member = db.member_for_user(1, 2).unwrap().unwrap();
    let payment = db
        .create_payment(&classfund_core::models::NewPayment {
            invoice_id,
            payer_id: member.id,
            amount: 200_000,
            method: classfund_core::models::PayMethod::Bank,
            txn_ref: None,
        })
        .unwrap();

    let uri = format!("/api/classes/1/payments/{}/proof", payment.id);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&uri)
                .header("x-classfund-user", "2")
                .body(Body::from("fake-jpeg-bytes".as_bytes().to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let proof_path = json["proof_path"].as_str().unwrap();
    assert!(proof_path.starts_with("proofs/"));

    // no OCR backend configured: the payment stays in manual review
    assert_eq!(json["status"], "submitted");

    // someone else cannot replace the proof
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&uri)
                .header("x-classfund-user", "1")
                .body(Body::from("other-bytes".as_bytes().to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_manual_verify_and_conflict() {
    let (app, db, _dir) = setup_test_app();
    let (_class, _cycle, invoice_id) = seed_class(&db);

    let member = db.member_for_user(1, 2).unwrap().unwrap();
    let payment = db
        .create_payment(&classfund_core::models::NewPayment {
            invoice_id,
            payer_id: member.id,
            amount: 200_000,
            method: classfund_core::models::PayMethod::Bank,
            txn_ref: None,
        })
        .unwrap();
    db.bump_invoice_submitted(invoice_id).unwrap();

    let uri = format!("/api/classes/1/payments/{}/verify", payment.id);
    let response = app
        .clone()
        .oneshot(post_json(&uri, 1, serde_json::json!({"action": "approve"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "verified");
    assert_eq!(json["verified_by"], 1);

    let invoice = db.get_invoice(invoice_id).unwrap().unwrap();
    assert_eq!(invoice.status.as_str(), "verified");

    // verdict on a settled payment is a conflict, not an overwrite
    let response = app
        .oneshot(post_json(&uri, 1, serde_json::json!({"action": "reject"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalidate_regresses_invoice_and_feeds_ledger() {
    let (app, db, _dir) = setup_test_app();
    let (_class, _cycle, invoice_id) = seed_class(&db);

    let member = db.member_for_user(1, 2).unwrap().unwrap();
    let payment = db
        .create_payment(&classfund_core::models::NewPayment {
            invoice_id,
            payer_id: member.id,
            amount: 200_000,
            method: classfund_core::models::PayMethod::Bank,
            txn_ref: None,
        })
        .unwrap();
    db.bump_invoice_submitted(invoice_id).unwrap();
    db.verify_manual(payment.id, 1, true).unwrap();

    let uri = format!("/api/classes/1/payments/{}/invalidate", payment.id);
    let response = app
        .clone()
        .oneshot(post_json(&uri, 1, serde_json::json!({"reason": "wrong proof"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "invalid");
    assert_eq!(json["invalid_reason"], "wrong proof");

    let invoice = db.get_invoice(invoice_id).unwrap().unwrap();
    assert_eq!(invoice.status.as_str(), "unpaid");

    // the ledger keeps the income line and adds the reversal
    let response = app
        .clone()
        .oneshot(get("/api/classes/1/ledger", 2))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total_income"], 200_000);
    assert_eq!(json["invalid_total"], 200_000);
    assert_eq!(json["closing_balance"], 0);
    assert_eq!(json["items"].as_array().unwrap().len(), 2);

    // invalid list shows it
    let response = app
        .oneshot(get("/api/classes/1/payments/invalid", 1))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
}

// ========== Expenses, fund account, reports ==========

#[tokio::test]
async fn test_expense_crud_and_ledger_totals() {
    let (app, db, _dir) = setup_test_app();
    seed_class(&db);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/classes/1/expenses",
            1,
            serde_json::json!({"title": "Mua bong", "amount": 50000, "fee_cycle_id": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let expense_id = get_body_json(response).await["id"].as_i64().unwrap();

    let uri = format!("/api/classes/1/expenses/{}", expense_id);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&uri)
                .header("x-classfund-user", "1")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({"title": "Mua bong da", "amount": 60000}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get("/api/classes/1/balance", 2))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total_expense"], 60_000);
    assert_eq!(json["balance"], -60_000);

    let response = app
        .clone()
        .oneshot(get("/api/classes/1/expenses", 2))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["items"][0]["created_by_name"], "Owner");

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .header("x-classfund-user", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_fund_account_and_cycle_report() {
    let (app, db, _dir) = setup_test_app();
    seed_class(&db);

    let response = app
        .clone()
        .oneshot(get("/api/classes/1/fund-account", 2))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert!(json["fund_account"].is_null());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/classes/1/fund-account")
                .header("x-classfund-user", "1")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "bank_code": "vcb",
                        "account_number": "0011223344",
                        "account_name": "Quy Lop"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["fund_account"]["bank_code"], "VCB");

    let response = app
        .oneshot(get("/api/classes/1/fee-cycles/1/report", 2))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["active_members"], 2);
    assert_eq!(json["expected_total"], 400_000);
}

#[tokio::test]
async fn test_invoice_detail_visibility() {
    let (app, db, _dir) = setup_test_app();
    let (_class, _cycle, invoice_id) = seed_class(&db);
    db.create_user("Other", "other@example.com", None).unwrap(); // user 3
    db.join_class(1, 3).unwrap();

    let uri = format!("/api/classes/1/invoices/{}", invoice_id);

    // the owner of the invoice sees it, with can_submit
    let response = app.clone().oneshot(get(&uri, 2)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["can_submit"], true);
    assert_eq!(json["can_mark_paid"], false);

    // treasurer-like viewer
    let response = app.clone().oneshot(get(&uri, 1)).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["can_submit"], false);
    assert_eq!(json["can_mark_paid"], true);

    // an unrelated member is blocked
    let response = app.oneshot(get(&uri, 3)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_notifications_endpoint() {
    let (app, db, _dir) = setup_test_app();
    let (class_id, _, _) = seed_class(&db);
    db.notify_treasurers(class_id, "payment_verified", "ok", "Payment #1")
        .unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/notifications?unread=true", 1))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    let items = json["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    let id = items[0]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/notifications/{}/read", id),
            1,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get("/api/notifications?unread=true", 1))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert!(json["items"].as_array().unwrap().is_empty());
}
