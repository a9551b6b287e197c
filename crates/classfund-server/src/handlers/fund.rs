//! Fund account, summary and ledger handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use classfund_core::access::{ensure_member, ensure_treasurer_like};
use classfund_core::db::{FundSummary, LedgerFilter, LedgerReport};
use classfund_core::models::FundAccount;

use super::class_scope;
use crate::{AppError, AppState};

/// Fund account payload (wrapped so "no account yet" serializes as null)
#[derive(Debug, Serialize)]
pub struct FundAccountResponse {
    pub fund_account: Option<FundAccount>,
}

/// GET /api/classes/:class/fund-account - Any member may see where to send
/// money
pub async fn get_fund_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
) -> Result<Json<FundAccountResponse>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_member(role)?;

    let fund_account = state.db.fund_account_for_class(class_id)?;
    Ok(Json(FundAccountResponse { fund_account }))
}

/// Request body for configuring the fund account
#[derive(Debug, Deserialize)]
pub struct UpsertFundAccountRequest {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}

/// PUT /api/classes/:class/fund-account - Treasurer-like
pub async fn upsert_fund_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
    Json(body): Json<UpsertFundAccountRequest>,
) -> Result<Json<FundAccountResponse>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_treasurer_like(role)?;

    if body.bank_code.trim().is_empty()
        || body.account_number.trim().is_empty()
        || body.account_name.trim().is_empty()
    {
        return Err(AppError::unprocessable(
            "bank_code, account_number and account_name are required",
        ));
    }

    let fund = state.db.upsert_fund_account(
        class_id,
        body.bank_code.trim(),
        body.account_number.trim(),
        body.account_name.trim(),
    )?;
    Ok(Json(FundAccountResponse {
        fund_account: Some(fund),
    }))
}

/// Shared query params for summary/ledger narrowing
#[derive(Debug, Deserialize, Default)]
pub struct LedgerQuery {
    pub fee_cycle_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl LedgerQuery {
    fn into_filter(self) -> LedgerFilter {
        LedgerFilter {
            fee_cycle_id: self.fee_cycle_id,
            from: self.from,
            to: self.to,
        }
    }
}

/// GET /api/classes/:class/fund-account/summary
pub async fn fund_summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<FundSummary>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_member(role)?;

    let summary = state.db.fund_summary(class_id, &query.into_filter())?;
    Ok(Json(summary))
}

/// GET /api/classes/:class/ledger - The reconstructed fund book; any member
/// may read it
pub async fn ledger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerReport>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_member(role)?;

    let report = state.db.ledger(class_id, &query.into_filter())?;
    Ok(Json(report))
}

/// GET /api/classes/:class/balance - Lifetime totals
pub async fn class_balance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
) -> Result<Json<FundSummary>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_member(role)?;

    let summary = state.db.fund_summary(class_id, &LedgerFilter::default())?;
    Ok(Json(summary))
}
