//! Class and membership handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use classfund_core::access::{ensure_member, ensure_owner};
use classfund_core::db::{ClassSummary, MemberRow};
use classfund_core::models::{ClassRole, Classroom};

use super::{class_scope, ListResponse};
use crate::{current_user, AppError, AppState};

/// GET /api/classes - Classes the caller belongs to
pub async fn my_classes(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ListResponse<ClassSummary>>, AppError> {
    let user = current_user(&state, &headers)?;
    let items = state.db.my_classes(user.id)?;
    Ok(Json(ListResponse { items }))
}

/// Request body for creating a class
#[derive(Debug, Deserialize)]
pub struct CreateClassRequest {
    pub name: String,
}

/// Response for class creation / join
#[derive(Debug, Serialize)]
pub struct ClassWithRole {
    pub class: Classroom,
    pub role: ClassRole,
}

/// POST /api/classes - Create a class; the creator becomes its owner
pub async fn create_class(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateClassRequest>,
) -> Result<Json<ClassWithRole>, AppError> {
    let user = current_user(&state, &headers)?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::unprocessable("class name must not be empty"));
    }

    let class = state.db.create_class(name, user.id)?;
    Ok(Json(ClassWithRole {
        class,
        role: ClassRole::Owner,
    }))
}

/// Request body for joining by invite code
#[derive(Debug, Deserialize)]
pub struct JoinClassRequest {
    pub code: String,
}

/// POST /api/classes/join
pub async fn join_class(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<JoinClassRequest>,
) -> Result<Json<ClassWithRole>, AppError> {
    let user = current_user(&state, &headers)?;

    let class = state
        .db
        .find_class_by_code(body.code.trim())?
        .ok_or_else(|| AppError::not_found("Unknown invite code"))?;

    let member = state.db.join_class(class.id, user.id)?;
    Ok(Json(ClassWithRole {
        class,
        role: member.role,
    }))
}

/// GET /api/classes/:class/members
pub async fn class_members(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
) -> Result<Json<ListResponse<MemberRow>>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_member(role)?;

    let items = state.db.class_members(class_id)?;
    Ok(Json(ListResponse { items }))
}

/// Response for the caller's role
#[derive(Debug, Serialize)]
pub struct MyRoleResponse {
    pub role: ClassRole,
}

/// GET /api/classes/:class/my-role
pub async fn my_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(class_id): Path<i64>,
) -> Result<Json<MyRoleResponse>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    let role = ensure_member(role)?;
    Ok(Json(MyRoleResponse { role }))
}

/// Request body for role assignment
#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    /// "member" or "treasurer"; ownership moves via transfer-ownership
    pub role: String,
}

/// POST /api/classes/:class/members/:user_id/role - Owner only
pub async fn set_member_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, user_id)): Path<(i64, i64)>,
    Json(body): Json<SetRoleRequest>,
) -> Result<Json<classfund_core::models::ClassMember>, AppError> {
    let (_, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_owner(role)?;

    let new_role: ClassRole = body
        .role
        .parse()
        .map_err(|_| AppError::unprocessable("role must be member or treasurer"))?;

    state
        .db
        .get_user(user_id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let member = state.db.set_member_role(class_id, user_id, new_role)?;
    Ok(Json(member))
}

/// POST /api/classes/:class/transfer-ownership/:user_id - Owner only
pub async fn transfer_ownership(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((class_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<crate::SuccessResponse>, AppError> {
    let (user, _, role) = class_scope(&state, &headers, class_id)?;
    ensure_owner(role)?;

    state
        .db
        .get_user(user_id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    state.db.transfer_ownership(class_id, user.id, user_id)?;
    Ok(Json(crate::SuccessResponse { success: true }))
}
