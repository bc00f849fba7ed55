//! HTTP frontend
//!
//! Health and status checks, the chat webhook, and the admin grant endpoint.
//!
//! `/webhook` and `/admin/subscriptions` require a shared secret from
//! `server.webhook_secret` and `server.admin_token`. Identity fields in the
//! request body are never trusted on their own. A route whose secret is not
//! configured rejects every request.

use super::bot::{format_uptime, BotFrontend, InboundMessage};
use crate::error::{LookupBotError, Result};
use crate::ledger::{Plan, PlanCounts, UserSubscription};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Shared state for every handler
#[derive(Debug, Clone)]
pub struct WebState {
    pub bot: BotFrontend,
    webhook_secret: Option<String>,
    admin_token: Option<String>,
}

impl WebState {
    /// State with no secrets; authenticated routes reject everything
    pub fn new(bot: BotFrontend) -> Self {
        Self {
            bot,
            webhook_secret: None,
            admin_token: None,
        }
    }

    /// Secret expected in the `X-Webhook-Secret` header
    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }

    /// Bearer token expected on admin routes
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|t| !t.is_empty());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub uptime: String,
    pub uptime_seconds: i64,
    pub started_at: DateTime<Utc>,
    pub total_searches: u64,
    pub active_users: usize,
    pub users: PlanCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookReply {
    pub user_id: i64,
    pub reply: String,
}

/// Admin request to set a user's plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRequest {
    /// Caller identity, checked against the admin configuration
    pub admin_user_id: i64,
    #[serde(default)]
    pub admin_username: Option<String>,

    pub user_id: i64,
    pub plan: String,
    /// Defaults to the plan's list price
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantResponse {
    pub subscription: UserSubscription,
    pub verified: bool,
}

pub fn create_router(state: Arc<WebState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/webhook", post(webhook))
        .route("/admin/subscriptions", post(grant_subscription))
        .with_state(state)
}

/// Bind and serve until Ctrl-C or SIGTERM
pub async fn serve(bind: SocketAddr, state: Arc<WebState>) -> Result<()> {
    let listener = TcpListener::bind(bind).await.map_err(LookupBotError::Io)?;
    tracing::info!("Web frontend listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Web frontend shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

pub async fn health_check() -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "lookup-bot"
    })))
}

pub async fn status(State(state): State<Arc<WebState>>) -> ApiResult<StatusResponse> {
    let usage = state.bot.usage();
    let uptime = usage.uptime();
    Ok(Json(StatusResponse {
        status: "online".to_string(),
        uptime: format_uptime(uptime),
        uptime_seconds: uptime.num_seconds(),
        started_at: usage.started_at(),
        total_searches: usage.total_searches(),
        active_users: usage.active_users(),
        users: state.bot.ledger().plan_counts(),
    }))
}

pub async fn webhook(
    State(state): State<Arc<WebState>>,
    headers: HeaderMap,
    Json(message): Json<InboundMessage>,
) -> ApiResult<WebhookReply> {
    let presented = header_value(&headers, WEBHOOK_SECRET_HEADER);
    authorize(presented, state.webhook_secret.as_deref(), "webhook")?;

    if message.text.trim().is_empty() {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "empty_message",
            "text cannot be empty",
        ));
    }

    let reply = state.bot.handle(&message).await;
    Ok(Json(WebhookReply {
        user_id: message.user_id,
        reply,
    }))
}

pub async fn grant_subscription(
    State(state): State<Arc<WebState>>,
    headers: HeaderMap,
    Json(request): Json<GrantRequest>,
) -> ApiResult<GrantResponse> {
    let presented = bearer_token(&headers);
    authorize(presented, state.admin_token.as_deref(), "admin")?;

    let ledger = state.bot.ledger();
    if !ledger.is_admin(request.admin_user_id, request.admin_username.as_deref()) {
        tracing::warn!(
            "Rejected subscription grant from non-admin {}",
            request.admin_user_id
        );
        let denied = LookupBotError::Unauthorized("admin access required".to_string());
        return Err(error(StatusCode::FORBIDDEN, "forbidden", &denied.to_string()));
    }

    let plan: Plan = request
        .plan
        .parse()
        .map_err(|e: LookupBotError| {
            error(StatusCode::BAD_REQUEST, "invalid_plan", &e.to_string())
        })?;
    let amount = request
        .amount
        .unwrap_or_else(|| ledger.plans().price(plan));

    let subscription = ledger.upsert_plan(
        request.user_id,
        plan,
        amount,
        request.username.as_deref(),
        request.display_name.as_deref(),
    );
    let verified = ledger.verify_persistence(request.user_id);
    if !verified {
        tracing::error!(
            "Grant for user {} could not be verified on disk",
            request.user_id
        );
    }

    Ok(Json(GrantResponse {
        subscription,
        verified,
    }))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_value(headers, AUTHORIZATION_HEADER).and_then(|value| value.strip_prefix("Bearer "))
}

/// Check a presented secret against the configured one
///
/// Fails closed when nothing is configured.
fn authorize(
    presented: Option<&str>,
    expected: Option<&str>,
    route: &str,
) -> std::result::Result<(), (StatusCode, Json<ErrorResponse>)> {
    let Some(expected) = expected else {
        tracing::warn!("Rejected {} request: no secret configured", route);
        return Err(unauthorized(route));
    };
    match presented {
        Some(presented) if secrets_match(presented.as_bytes(), expected.as_bytes()) => Ok(()),
        Some(_) => {
            tracing::warn!("Rejected {} request with invalid credentials", route);
            Err(unauthorized(route))
        }
        None => {
            tracing::warn!("Rejected {} request without credentials", route);
            Err(unauthorized(route))
        }
    }
}

fn unauthorized(route: &str) -> (StatusCode, Json<ErrorResponse>) {
    let denied = LookupBotError::Unauthorized(format!("missing or invalid {} credentials", route));
    error(StatusCode::UNAUTHORIZED, "unauthorized", &denied.to_string())
}

// Compares every byte so timing does not reveal the matching prefix length
fn secrets_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

fn error(status: StatusCode, code: &str, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
        }),
    )
}
