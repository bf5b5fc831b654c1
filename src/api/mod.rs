//! HTTP API and server lifecycle.
//!
//! Handlers are thin: authenticate, call the database layer, then record
//! activity and notify the task's audience. Activity and notification are
//! best-effort and never fail a request that already mutated state.

pub mod analytics;
pub mod auth;
pub mod extract;
pub mod shares;
pub mod tasks;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::IdentityProvider;
use crate::auth::session::issue_session_token;
use crate::config::Config;
use crate::db::Database;
use crate::realtime::{Hub, TaskEvent, ws::ws_handler};
use crate::types::{ActivityDetails, TaskId, User};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub hub: Arc<Hub>,
    pub config: Arc<Config>,
    pub session_secret: Arc<str>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: Arc<Config>, session_secret: impl Into<Arc<str>>) -> Self {
        Self {
            db,
            hub: Arc::new(Hub::new()),
            config,
            session_secret: session_secret.into(),
            identity: None,
        }
    }

    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// Sign a session token for the user with the configured lifetime.
    pub fn issue_token(&self, user: &User) -> Result<String, crate::auth::AuthError> {
        issue_session_token(
            user,
            self.session_secret.as_bytes(),
            self.config.auth.session_ttl_hours,
        )
    }

    /// Append to the activity log; failures are logged and swallowed.
    pub(crate) fn record_activity(&self, task_id: TaskId, user_id: &str, action: &str, details: Value) {
        let details = match details {
            Value::Object(map) => map,
            _ => ActivityDetails::new(),
        };
        if let Err(e) = self.db.record_activity(task_id, user_id, action, &details) {
            warn!(task_id, user_id, action, "Failed to record activity: {}", e);
        }
    }

    /// Publish an event to the given audience.
    pub(crate) fn notify(&self, audience: &[String], event: TaskEvent, actor: &User) {
        let task_id = event.task_id();
        let message = event.into_message(actor.clone(), chrono::Utc::now());
        let delivered = self.hub.publish(audience, &message);
        tracing::debug!(task_id, delivered, "Task event published");
    }

    /// Current audience of a task; empty (with a warning) if the lookup fails.
    pub(crate) fn audience(&self, task_id: TaskId) -> Vec<String> {
        self.db.task_audience(task_id).unwrap_or_else(|e| {
            warn!(task_id, "Failed to resolve task audience: {}", e);
            Vec::new()
        })
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        // Session
        .route("/api/auth/user", get(auth::current_user))
        .route("/api/auth/google", get(auth::google_login))
        .route("/api/auth/google/callback", get(auth::google_callback))
        .route("/api/auth/logout", get(auth::logout).post(auth::logout))
        // Tasks
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/tasks/{id}/activities", get(tasks::list_activities))
        // Sharing
        .route("/api/tasks/{id}/share", post(shares::share_task))
        .route("/api/tasks/{id}/shares", get(shares::list_shares))
        .route(
            "/api/tasks/{id}/shares/{user_id}",
            axum::routing::delete(shares::remove_share),
        )
        // Analytics
        .route("/api/analytics/stats", get(analytics::stats))
        .route("/api/analytics/productivity", get(analytics::productivity))
        .route("/api/analytics/team", get(analytics::team))
        // Live updates
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the server on `addr`.
///
/// Returns a shutdown sender and the bound address (useful when binding port 0).
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Task server listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Task server shutting down");
            })
            .await
        {
            tracing::error!("Task server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}
