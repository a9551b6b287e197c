//! Invoice handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;

use classfund_core::access::{ensure_member, ensure_treasurer_like};
use classfund_core::db::{InvoiceDetail, MyInvoiceRow};
use classfund_core::models::Invoice;

use super::{class_scope, ListResponse};
use crate::{AppError, AppState};

/// GET /api/classes/:class/my-invoices
pub async fn my_invoices(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
) -> Result<Json<ListResponse<MyInvoiceRow>>, AppError> {
    let (user, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_member(role)?;

    let member = state
        .db
        .member_for_user(class_id, user.id)?
        .ok_or_else(|| AppError::forbidden("not a member of this class"))?;

    let items = state.db.my_invoices(member.id)?;
    Ok(Json(ListResponse { items }))
}

/// GET /api/classes/:class/invoices/:invoice - Visible to the invoice owner
/// and to treasurer-like members
pub async fn invoice_detail(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, invoice_id)): Path<(i64, i64)>,
) -> Result<Json<InvoiceDetail>, AppError> {
    let (user, _, role) = class_scope(&state, &headers, class_id)?;
    let role = ensure_member(role)?;

    let invoice = invoice_in_class(&state, invoice_id, class_id)?;

    let my_member = state.db.member_for_user(class_id, user.id)?;
    let is_mine = my_member
        .as_ref()
        .map(|m| m.id == invoice.member_id)
        .unwrap_or(false);
    let is_treasurer_like = role.is_treasurer_like();

    if !is_mine && !is_treasurer_like {
        return Err(AppError::forbidden("not your invoice"));
    }

    let detail = state.db.invoice_detail(
        invoice_id,
        is_mine,
        is_treasurer_like,
        Utc::now().date_naive(),
    )?;
    Ok(Json(detail))
}

/// POST /api/classes/:class/invoices/:invoice/mark-paid - Treasurer settles
/// the invoice for good
pub async fn mark_invoice_paid(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, invoice_id)): Path<(i64, i64)>,
) -> Result<Json<Invoice>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    invoice_in_class(&state, invoice_id, class_id)?;

    let invoice = state.db.mark_invoice_paid(invoice_id)?;
    Ok(Json(invoice))
}

/// An invoice addressed through a class URL must belong to that class
pub(crate) fn invoice_in_class(
    state: &AppState,
    invoice_id: i64,
    class_id: i64,
) -> Result<Invoice, AppError> {
    let invoice = state
        .db
        .get_invoice(invoice_id)?
        .ok_or_else(|| AppError::not_found("Invoice not found"))?;
    let cycle = state
        .db
        .get_fee_cycle(invoice.fee_cycle_id)?
        .ok_or_else(|| AppError::not_found("Fee cycle not found"))?;
    if cycle.class_id != class_id {
        return Err(AppError::not_found("Invoice not found in this class"));
    }
    Ok(invoice)
}
