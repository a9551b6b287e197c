//! Classfund Web Server
//!
//! Axum-based REST API for the classfund class-fund manager.
//!
//! Authentication is an external collaborator: the server trusts the
//! `X-Classfund-User` header carrying the caller's user id, the way an
//! authenticating reverse proxy would inject it. With `require_auth`
//! disabled (local development), requests without the header act as user 1.
//! Authorization — who may do what inside a class — is enforced here on
//! every route via the core role resolution.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
    routing::{get, post, put},
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use classfund_core::config::VerifyConfig;
use classfund_core::db::Database;
use classfund_core::models::User;
use classfund_core::ocr::{OcrBackend, OcrClient};
use classfund_core::storage::ImageStore;

mod handlers;

#[cfg(test)]
mod tests;

/// Maximum proof/receipt upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Header carrying the authenticated user id
const USER_HEADER: &str = "x-classfund-user";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether the user header is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// OCR collaborator; None leaves every submission for manual review
    pub ocr: Option<OcrClient>,
    /// Decision-engine tunables, loaded once and passed into the pipeline
    pub verify_cfg: VerifyConfig,
    /// Proof/receipt image store
    pub store: ImageStore,
}

/// Authentication middleware: require the user header unless disabled
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    if request.headers().get(USER_HEADER).is_some() {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - missing user header");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Resolve the calling user from the trusted header.
///
/// Development fallback: without the header (auth disabled) the caller acts
/// as user 1.
pub(crate) fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let user_id = match headers.get(USER_HEADER).and_then(|v| v.to_str().ok()) {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::bad_request("invalid user header"))?,
        None => {
            if state.config.require_auth {
                return Err(AppError::unauthorized("Authentication required"));
            }
            1
        }
    };

    state
        .db
        .get_user(user_id)?
        .ok_or_else(|| AppError::unauthorized("unknown user"))
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(
    db: Database,
    store: ImageStore,
    ocr: Option<OcrClient>,
    verify_cfg: VerifyConfig,
    config: ServerConfig,
) -> Router {
    if let Some(ref client) = ocr {
        info!("OCR backend configured: {}", client.engine());
    } else {
        info!("ℹ️  OCR backend not configured (set CLASSFUND_OCR_HOST); proofs go to manual review");
    }

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        ocr,
        verify_cfg,
        store,
    });

    let api_routes = Router::new()
        // Me
        .route("/me", get(handlers::get_me))
        // Classes & membership
        .route(
            "/classes",
            get(handlers::my_classes).post(handlers::create_class),
        )
        .route("/classes/join", post(handlers::join_class))
        .route("/classes/:class/members", get(handlers::class_members))
        .route("/classes/:class/my-role", get(handlers::my_role))
        .route(
            "/classes/:class/members/:user_id/role",
            post(handlers::set_member_role),
        )
        .route(
            "/classes/:class/transfer-ownership/:user_id",
            post(handlers::transfer_ownership),
        )
        // Fund account & ledger
        .route(
            "/classes/:class/fund-account",
            get(handlers::get_fund_account).put(handlers::upsert_fund_account),
        )
        .route(
            "/classes/:class/fund-account/summary",
            get(handlers::fund_summary),
        )
        .route("/classes/:class/ledger", get(handlers::ledger))
        .route("/classes/:class/balance", get(handlers::class_balance))
        // Fee cycles
        .route(
            "/classes/:class/fee-cycles",
            get(handlers::list_fee_cycles).post(handlers::create_fee_cycle),
        )
        .route(
            "/classes/:class/fee-cycles/:cycle/generate-invoices",
            post(handlers::generate_invoices),
        )
        .route(
            "/classes/:class/fee-cycles/:cycle/report",
            get(handlers::cycle_report),
        )
        .route(
            "/classes/:class/fee-cycles/:cycle/status",
            post(handlers::update_cycle_status),
        )
        .route(
            "/classes/:class/fee-cycles/:cycle/unpaid-members",
            get(handlers::unpaid_members),
        )
        // Invoices
        .route("/classes/:class/my-invoices", get(handlers::my_invoices))
        .route("/classes/:class/invoices/:invoice", get(handlers::invoice_detail))
        .route(
            "/classes/:class/invoices/:invoice/mark-paid",
            post(handlers::mark_invoice_paid),
        )
        .route(
            "/classes/:class/invoices/:invoice/payments",
            post(handlers::submit_payment),
        )
        // Payments
        .route("/classes/:class/payments", get(handlers::list_payments))
        .route(
            "/classes/:class/payments/approved",
            get(handlers::approved_payments),
        )
        .route(
            "/classes/:class/payments/invalid",
            get(handlers::invalid_payments),
        )
        .route("/classes/:class/payments/:payment", get(handlers::payment_detail))
        .route(
            "/classes/:class/payments/:payment/proof",
            post(handlers::upload_proof),
        )
        .route(
            "/classes/:class/payments/:payment/verify",
            post(handlers::verify_payment),
        )
        .route(
            "/classes/:class/payments/:payment/invalidate",
            post(handlers::invalidate_payment),
        )
        // Expenses
        .route(
            "/classes/:class/expenses",
            get(handlers::list_expenses).post(handlers::create_expense),
        )
        .route(
            "/classes/:class/expenses/:expense",
            put(handlers::update_expense).delete(handlers::delete_expense),
        )
        .route(
            "/classes/:class/expenses/:expense/receipt",
            post(handlers::upload_expense_receipt),
        )
        // Notifications
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        );

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        // health stays reachable without credentials
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server
pub async fn serve(
    db: Database,
    store: ImageStore,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }

    let ocr = OcrClient::from_env();
    if let Some(ref client) = ocr {
        if client.health_check().await {
            info!("✅ OCR backend connected: {}", client.engine());
        } else {
            warn!("⚠️  OCR backend configured but not responding: {}", client.engine());
        }
    }

    let verify_cfg = VerifyConfig::load();
    let app = create_router(db, store, ocr, verify_cfg, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
        }
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.to_string(),
        }
    }

    pub fn forbidden(msg: &str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: msg.to_string(),
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
        }
    }

    pub fn unprocessable(msg: &str) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: msg.to_string(),
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

/// Map core errors onto HTTP statuses. Internals are logged, the client gets
/// a sanitized message.
impl From<classfund_core::Error> for AppError {
    fn from(err: classfund_core::Error) -> Self {
        use classfund_core::Error;
        match err {
            Error::NotFound(msg) => Self::not_found(&msg),
            Error::Forbidden(msg) => Self::forbidden(&msg),
            Error::InvalidData(msg) => Self::unprocessable(&msg),
            Error::Conflict(msg) => Self::conflict(&msg),
            Error::InvalidTransition { .. } => Self::conflict(&err.to_string()),
            other => {
                error!(error = %other, "Internal error");
                Self::internal("An internal error occurred")
            }
        }
    }
}
