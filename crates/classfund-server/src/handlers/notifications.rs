//! Notification handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use classfund_core::models::Notification;

use super::ListResponse;
use crate::{current_user, AppError, AppState, SuccessResponse};

/// Query params for the notification list
#[derive(Debug, Deserialize, Default)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread: bool,
}

/// GET /api/notifications - The caller's notifications, newest first
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ListResponse<Notification>>, AppError> {
    let user = current_user(&state, &headers)?;
    let items = state.db.list_notifications(user.id, query.unread)?;
    Ok(Json(ListResponse { items }))
}

/// POST /api/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = current_user(&state, &headers)?;
    state.db.mark_notification_read(id, user.id)?;
    Ok(Json(SuccessResponse { success: true }))
}
