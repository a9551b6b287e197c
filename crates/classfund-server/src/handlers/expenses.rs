//! Expense handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use classfund_core::access::{ensure_member, ensure_treasurer_like};
use classfund_core::db::ExpenseRow;
use classfund_core::models::{Expense, NewExpense};

use super::{class_scope, ListResponse};
use crate::{AppError, AppState, SuccessResponse, MAX_UPLOAD_SIZE};

/// Query params for the expense list
#[derive(Debug, Deserialize)]
pub struct ListExpensesQuery {
    pub fee_cycle_id: Option<i64>,
}

/// GET /api/classes/:class/expenses
pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
    Query(query): Query<ListExpensesQuery>,
) -> Result<Json<ListResponse<ExpenseRow>>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_member(role)?;

    let items = state.db.list_expenses(class_id, query.fee_cycle_id)?;
    Ok(Json(ListResponse { items }))
}

/// Request body for creating/updating an expense
#[derive(Debug, Deserialize)]
pub struct ExpenseRequest {
    pub title: String,
    pub amount: i64,
    pub fee_cycle_id: Option<i64>,
    pub note: Option<String>,
    pub spent_at: Option<NaiveDate>,
}

/// POST /api/classes/:class/expenses - Treasurer-like
pub async fn create_expense(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
    Json(body): Json<ExpenseRequest>,
) -> Result<Json<Expense>, AppError> {
    let (user, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    if body.title.trim().is_empty() {
        return Err(AppError::unprocessable("title must not be empty"));
    }

    let expense = state.db.create_expense(&NewExpense {
        class_id,
        fee_cycle_id: body.fee_cycle_id,
        title: body.title.trim().to_string(),
        amount: body.amount,
        note: body.note,
        spent_at: body.spent_at,
        created_by: user.id,
    })?;
    Ok(Json(expense))
}

/// PUT /api/classes/:class/expenses/:expense
pub async fn update_expense(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, expense_id)): Path<(i64, i64)>,
    Json(body): Json<ExpenseRequest>,
) -> Result<Json<Expense>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    expense_in_class(&state, expense_id, class_id)?;

    let expense = state.db.update_expense(
        expense_id,
        body.title.trim(),
        body.amount,
        body.fee_cycle_id,
        body.note.as_deref(),
        body.spent_at,
    )?;
    Ok(Json(expense))
}

/// DELETE /api/classes/:class/expenses/:expense - Also removes the stored
/// receipt image
pub async fn delete_expense(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, expense_id)): Path<(i64, i64)>,
) -> Result<Json<SuccessResponse>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    expense_in_class(&state, expense_id, class_id)?;

    if let Some(reference) = state.db.delete_expense(expense_id)? {
        state.store.delete(&reference);
    }
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/classes/:class/expenses/:expense/receipt - Upload the receipt
/// image (raw body)
pub async fn upload_expense_receipt(
    State(state): State<Arc<AppState>>,
    Path((class_id, expense_id)): Path<(i64, i64)>,
    request: Request,
) -> Result<Json<Expense>, AppError> {
    let headers = request.headers().clone();
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    expense_in_class(&state, expense_id, class_id)?;

    let bytes = axum::body::to_bytes(request.into_body(), MAX_UPLOAD_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body or file too large (max 10MB)"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("No image data provided"));
    }

    let reference = state.store.store(&bytes, "receipts")?;
    state.db.set_expense_receipt(expense_id, &reference)?;

    let expense = state
        .db
        .get_expense(expense_id)?
        .ok_or_else(|| AppError::internal("Expense not found after upload"))?;
    Ok(Json(expense))
}

/// An expense addressed through a class URL must belong to that class
fn expense_in_class(state: &AppState, expense_id: i64, class_id: i64) -> Result<Expense, AppError> {
    let expense = state
        .db
        .get_expense(expense_id)?
        .ok_or_else(|| AppError::not_found("Expense not found"))?;
    if expense.class_id != class_id {
        return Err(AppError::not_found("Expense not found in this class"));
    }
    Ok(expense)
}
