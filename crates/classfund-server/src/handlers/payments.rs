//! Payment handlers: submission, proof upload, treasurer review,
//! invalidation.
//!
//! Proof uploads return as soon as the image is stored and the pipeline run
//! is enqueued — the submitter's contract is "accepted for processing", the
//! verdict lands on the payment row later.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use classfund_core::access::{ensure_member, ensure_treasurer_like};
use classfund_core::db::PaymentListRow;
use classfund_core::models::{NewPayment, PayMethod, Payment, PaymentStatus};
use classfund_core::pipeline;

use super::invoices::invoice_in_class;
use super::{class_scope, ListResponse};
use crate::{AppError, AppState, MAX_UPLOAD_SIZE};

/// Request body for submitting a payment
#[derive(Debug, Deserialize)]
pub struct SubmitPaymentRequest {
    pub amount: i64,
    pub method: Option<PayMethod>,
    pub txn_ref: Option<String>,
}

/// POST /api/classes/:class/invoices/:invoice/payments - Member submits a
/// payment against their own invoice
pub async fn submit_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, invoice_id)): Path<(i64, i64)>,
    Json(body): Json<SubmitPaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    let (user, _, role) = class_scope(&state, &headers, class_id)?;
    let role = ensure_member(role)?;

    let invoice = invoice_in_class(&state, invoice_id, class_id)?;

    let member = state
        .db
        .member_for_user(class_id, user.id)?
        .ok_or_else(|| AppError::forbidden("not a member of this class"))?;
    if invoice.member_id != member.id {
        return Err(AppError::forbidden("not your invoice"));
    }

    if body.amount < 0 {
        return Err(AppError::unprocessable("amount must not be negative"));
    }

    // same gate the invoice detail advertises: open status and due date
    let detail = state.db.invoice_detail(
        invoice_id,
        true,
        role.is_treasurer_like(),
        Utc::now().date_naive(),
    )?;
    if !detail.can_submit {
        return Err(AppError::unprocessable(
            "invoice is not open for submission",
        ));
    }

    let payment = state.db.create_payment(&NewPayment {
        invoice_id,
        payer_id: member.id,
        amount: body.amount,
        method: body.method.unwrap_or_default(),
        txn_ref: body.txn_ref,
    })?;
    state.db.bump_invoice_submitted(invoice_id)?;

    Ok(Json(payment))
}

/// POST /api/classes/:class/payments/:payment/proof - Upload or replace the
/// proof image (raw body) and enqueue auto-verification
pub async fn upload_proof(
    State(state): State<Arc<AppState>>,
    Path((class_id, payment_id)): Path<(i64, i64)>,
    request: Request,
) -> Result<Json<Payment>, AppError> {
    let headers = request.headers().clone();
    let (user, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_member(role)?;

    let ctx = state
        .db
        .payment_context(payment_id)?
        .filter(|ctx| ctx.class_id == class_id)
        .ok_or_else(|| AppError::not_found("Payment not found in this class"))?;

    // only the payer may attach proofs
    let payer = state
        .db
        .get_member(ctx.payment.payer_id)?
        .ok_or_else(|| AppError::not_found("Payer membership not found"))?;
    if payer.user_id != user.id {
        return Err(AppError::forbidden("not your payment"));
    }

    let bytes = axum::body::to_bytes(request.into_body(), MAX_UPLOAD_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body or file too large (max 10MB)"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("No image data provided"));
    }

    let reference = state.store.store(&bytes, "proofs")?;
    state.db.set_proof_path(payment_id, &reference)?;
    state.db.bump_invoice_submitted(ctx.payment.invoice_id)?;

    enqueue_verification(&state, payment_id, &reference);

    let payment = state
        .db
        .get_payment(payment_id)?
        .ok_or_else(|| AppError::internal("Payment not found after upload"))?;
    Ok(Json(payment))
}

/// Hand the payment to the background pipeline. Without an OCR backend the
/// payment simply stays in the manual review queue.
fn enqueue_verification(state: &Arc<AppState>, payment_id: i64, reference: &str) {
    let Some(ocr) = state.ocr.clone() else {
        warn!(payment_id, "OCR not configured; leaving payment for manual review");
        return;
    };

    let abs = state.store.resolve(reference).ok();
    info!(payment_id, path = ?abs, "enqueueing proof verification");
    pipeline::enqueue(
        state.db.clone(),
        ocr,
        state.store.clone(),
        state.verify_cfg.clone(),
        payment_id,
        abs,
    );
}

/// Query params for the treasurer payment list
#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    /// Defaults to "submitted" (the review queue)
    pub status: Option<String>,
    /// "cycle" groups the rows per fee cycle
    pub group: Option<String>,
    /// Only auto-processed payments that did not pass
    #[serde(default)]
    pub ai_failed: bool,
}

/// Payments grouped per fee cycle
#[derive(Debug, Serialize)]
pub struct CycleGroup {
    pub cycle_id: i64,
    pub cycle_name: String,
    pub payments: Vec<PaymentListRow>,
}

/// Either a flat or a grouped payment list
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PaymentListResponse {
    Flat { payments: Vec<PaymentListRow> },
    Grouped { cycles: Vec<CycleGroup> },
}

/// GET /api/classes/:class/payments - Treasurer review queue
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<PaymentListResponse>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    let status = match query.status.as_deref() {
        None => Some(PaymentStatus::Submitted),
        Some("all") => None,
        Some(raw) => Some(raw.parse().map_err(|_| {
            AppError::bad_request("Invalid status. Use: submitted, verified, rejected, invalid, all")
        })?),
    };

    let rows = state.db.list_payments(class_id, status, query.ai_failed)?;

    if query.group.as_deref() == Some("cycle") {
        return Ok(Json(PaymentListResponse::Grouped {
            cycles: group_by_cycle(rows),
        }));
    }
    Ok(Json(PaymentListResponse::Flat { payments: rows }))
}

/// Query params for the approved payment list
#[derive(Debug, Deserialize)]
pub struct ApprovedPaymentsQuery {
    pub fee_cycle_id: Option<i64>,
    pub member_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub group: Option<String>,
    /// Members see only their own rows unless this is set (or they are
    /// treasurer-like)
    #[serde(default)]
    pub all: bool,
}

/// GET /api/classes/:class/payments/approved
pub async fn approved_payments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
    Query(query): Query<ApprovedPaymentsQuery>,
) -> Result<Json<PaymentListResponse>, AppError> {
    let (user, _, role) = class_scope(&state, &headers, class_id)?;
    let role = ensure_member(role)?;

    let mut member_filter = query.member_id;
    if !role.is_treasurer_like() && !query.all && member_filter.is_none() {
        let me = state
            .db
            .member_for_user(class_id, user.id)?
            .ok_or_else(|| AppError::forbidden("not a member of this class"))?;
        member_filter = Some(me.id);
    }

    let rows = state.db.approved_payments(
        class_id,
        query.fee_cycle_id,
        member_filter,
        query.from,
        query.to,
    )?;

    if query.group.as_deref() == Some("cycle") {
        return Ok(Json(PaymentListResponse::Grouped {
            cycles: group_by_cycle(rows),
        }));
    }
    Ok(Json(PaymentListResponse::Flat { payments: rows }))
}

/// GET /api/classes/:class/payments/invalid - Reversal history
pub async fn invalid_payments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
) -> Result<Json<ListResponse<PaymentListRow>>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    let items = state.db.invalid_payments(class_id)?;
    Ok(Json(ListResponse { items }))
}

/// GET /api/classes/:class/payments/:payment - Full row with OCR and
/// auto-verification fields
pub async fn payment_detail(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, payment_id)): Path<(i64, i64)>,
) -> Result<Json<Payment>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    if !state.db.payment_in_class(payment_id, class_id)? {
        return Err(AppError::not_found("Payment not found in this class"));
    }
    let payment = state
        .db
        .get_payment(payment_id)?
        .ok_or_else(|| AppError::not_found("Payment not found"))?;
    Ok(Json(payment))
}

/// Request body for the manual verdict
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    /// "approve" or "reject"
    pub action: String,
}

/// POST /api/classes/:class/payments/:payment/verify - Manual treasurer
/// verdict on a submitted payment
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, payment_id)): Path<(i64, i64)>,
    Json(body): Json<VerifyPaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    let (user, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    if !state.db.payment_in_class(payment_id, class_id)? {
        return Err(AppError::not_found("Payment not found in this class"));
    }

    let approve = match body.action.as_str() {
        "approve" => true,
        "reject" => false,
        _ => return Err(AppError::unprocessable("action must be approve or reject")),
    };

    let payment = state.db.verify_manual(payment_id, user.id, approve)?;
    Ok(Json(payment))
}

/// Request body for invalidation
#[derive(Debug, Deserialize)]
pub struct InvalidatePaymentRequest {
    pub reason: String,
    pub note: Option<String>,
}

/// POST /api/classes/:class/payments/:payment/invalidate - Reverse a
/// previously verified payment; the invoice status is recomputed in the
/// same transaction
pub async fn invalidate_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, payment_id)): Path<(i64, i64)>,
    Json(body): Json<InvalidatePaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    let (user, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    if !state.db.payment_in_class(payment_id, class_id)? {
        return Err(AppError::not_found("Payment not found in this class"));
    }
    if body.reason.trim().is_empty() {
        return Err(AppError::unprocessable("a reason is required"));
    }

    let payment = state.db.invalidate_payment(
        payment_id,
        user.id,
        body.reason.trim(),
        body.note.as_deref(),
    )?;
    Ok(Json(payment))
}

/// Group list rows by their fee cycle, preserving row order within groups
fn group_by_cycle(rows: Vec<PaymentListRow>) -> Vec<CycleGroup> {
    let mut groups: Vec<CycleGroup> = Vec::new();
    for row in rows {
        match groups.iter_mut().find(|g| g.cycle_id == row.cycle_id) {
            Some(group) => group.payments.push(row),
            None => groups.push(CycleGroup {
                cycle_id: row.cycle_id,
                cycle_name: row.cycle_name.clone(),
                payments: vec![row],
            }),
        }
    }
    groups
}
