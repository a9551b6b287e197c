//! Request handlers

mod classes;
mod cycles;
mod expenses;
mod fund;
mod invoices;
mod notifications;
mod payments;

pub use classes::*;
pub use cycles::*;
pub use expenses::*;
pub use fund::*;
pub use invoices::*;
pub use notifications::*;
pub use payments::*;

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use classfund_core::models::{ClassRole, Classroom, User};

use crate::{current_user, AppError, AppState};

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// GET /api/me
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let user = current_user(&state, &headers)?;
    Ok(Json(user))
}

/// Caller identity plus their role in the addressed class (None when not a
/// member). Every class-scoped handler starts here.
pub(crate) fn class_scope(
    state: &AppState,
    headers: &HeaderMap,
    class_id: i64,
) -> Result<(User, Classroom, Option<ClassRole>), AppError> {
    let user = current_user(state, headers)?;
    let class = state
        .db
        .get_class(class_id)?
        .ok_or_else(|| AppError::not_found("Class not found"))?;
    let role = state.db.role_in_class(user.id, class_id)?;
    Ok((user, class, role))
}

/// Generic wrapper for list payloads
#[derive(Serialize)]
pub(crate) struct ListResponse<T> {
    pub items: Vec<T>,
}
