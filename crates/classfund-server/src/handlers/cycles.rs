//! Fee cycle handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use classfund_core::access::{ensure_member, ensure_treasurer_like};
use classfund_core::db::{CycleReport, GenerateInvoicesResult, UnpaidMemberRow};
use classfund_core::models::{CycleStatus, FeeCycle, NewFeeCycle};

use super::{class_scope, ListResponse};
use crate::{AppError, AppState};

/// GET /api/classes/:class/fee-cycles
pub async fn list_fee_cycles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
) -> Result<Json<ListResponse<FeeCycle>>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_member(role)?;

    let items = state.db.list_fee_cycles(class_id)?;
    Ok(Json(ListResponse { items }))
}

/// Request body for creating a fee cycle
#[derive(Debug, Deserialize)]
pub struct CreateCycleRequest {
    pub name: String,
    pub term: Option<String>,
    pub amount_per_member: i64,
    pub due_date: Option<NaiveDate>,
    pub status: Option<CycleStatus>,
    pub allow_late: Option<bool>,
}

/// POST /api/classes/:class/fee-cycles - Treasurer-like; announces the new
/// cycle to every active member
pub async fn create_fee_cycle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
    Json(body): Json<CreateCycleRequest>,
) -> Result<Json<FeeCycle>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    if body.name.trim().is_empty() {
        return Err(AppError::unprocessable("cycle name must not be empty"));
    }
    if body.amount_per_member < 0 {
        return Err(AppError::unprocessable(
            "amount_per_member must not be negative",
        ));
    }

    let cycle = state.db.create_fee_cycle(&NewFeeCycle {
        class_id,
        name: body.name.trim().to_string(),
        term: body.term,
        amount_per_member: body.amount_per_member,
        due_date: body.due_date,
        status: body.status.unwrap_or_default(),
        allow_late: body.allow_late.unwrap_or(true),
    })?;

    // announce to active members; a notification failure never blocks the
    // cycle creation
    let targets: Vec<i64> = state
        .db
        .class_members(class_id)?
        .into_iter()
        .filter(|m| m.status == classfund_core::models::MemberStatus::Active)
        .map(|m| m.user_id)
        .collect();
    let body_text = format!(
        "Amount: {} - Due: {}",
        cycle.amount_per_member,
        cycle
            .due_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "N/A".into())
    );
    if let Err(e) = state.db.notify_users(
        &targets,
        class_id,
        "due_reminder",
        &format!("New fee cycle: {}", cycle.name),
        &body_text,
    ) {
        warn!(class_id, error = %e, "cycle announcement failed");
    }

    Ok(Json(cycle))
}

/// POST /api/classes/:class/fee-cycles/:cycle/generate-invoices
#[derive(Debug, Deserialize, Default)]
pub struct GenerateInvoicesRequest {
    pub amount_per_member: Option<i64>,
}

pub async fn generate_invoices(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, cycle_id)): Path<(i64, i64)>,
    body: Option<Json<GenerateInvoicesRequest>>,
) -> Result<Json<GenerateInvoicesResult>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;
    assert_cycle_in_class(&state, cycle_id, class_id)?;

    let amount_override = body.and_then(|Json(b)| b.amount_per_member);
    let result = state.db.generate_invoices(cycle_id, amount_override)?;
    Ok(Json(result))
}

/// GET /api/classes/:class/fee-cycles/:cycle/report
pub async fn cycle_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, cycle_id)): Path<(i64, i64)>,
) -> Result<Json<CycleReport>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_member(role)?;
    assert_cycle_in_class(&state, cycle_id, class_id)?;

    let report = state.db.cycle_report(class_id, cycle_id)?;
    Ok(Json(report))
}

/// Request body for cycle status updates
#[derive(Debug, Deserialize)]
pub struct UpdateCycleStatusRequest {
    pub status: CycleStatus,
    pub allow_late: Option<bool>,
}

/// POST /api/classes/:class/fee-cycles/:cycle/status
pub async fn update_cycle_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, cycle_id)): Path<(i64, i64)>,
    Json(body): Json<UpdateCycleStatusRequest>,
) -> Result<Json<FeeCycle>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;
    assert_cycle_in_class(&state, cycle_id, class_id)?;

    let cycle = state
        .db
        .update_cycle_status(cycle_id, body.status, body.allow_late)?;
    Ok(Json(cycle))
}

/// GET /api/classes/:class/fee-cycles/:cycle/unpaid-members
pub async fn unpaid_members(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, cycle_id)): Path<(i64, i64)>,
) -> Result<Json<ListResponse<UnpaidMemberRow>>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;
    assert_cycle_in_class(&state, cycle_id, class_id)?;

    let items = state.db.unpaid_members(cycle_id)?;
    Ok(Json(ListResponse { items }))
}

/// A cycle addressed through a class URL must belong to that class
pub(crate) fn assert_cycle_in_class(
    state: &AppState,
    cycle_id: i64,
    class_id: i64,
) -> Result<FeeCycle, AppError> {
    let cycle = state
        .db
        .get_fee_cycle(cycle_id)?
        .ok_or_else(|| AppError::not_found("Fee cycle not found"))?;
    if cycle.class_id != class_id {
        return Err(AppError::not_found("Fee cycle not found in this class"));
    }
    Ok(cycle)
}
