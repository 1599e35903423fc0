use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod database;
mod error;
mod handlers;
mod middleware;
mod services;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SECRET_KEY, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::AppConfig::from_env();
    let port = config.bind_port;
    let state = AppState::new(config).await?;

    let app = app(state);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("admin API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .route("/admin/auth/login", post(handlers::auth::login))
        // Everything else under /admin requires an authenticated principal
        .merge(admin_routes(state.clone()))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn admin_routes(state: AppState) -> Router<AppState> {
    use handlers::{activity, auth, content, dashboard, staff, system, tokens, users};

    Router::new()
        // Session
        .route("/admin/auth/logout", post(auth::logout))
        .route("/admin/auth/me", get(auth::me))
        .route("/admin/auth/step-up", post(auth::step_up))
        // Dashboard
        .route("/admin/dashboard/kpis", get(dashboard::kpis))
        .route("/admin/dashboard/trends", get(dashboard::trends))
        .route("/admin/dashboard/incidents", get(dashboard::incidents))
        .route("/admin/dashboard/queue-health", get(dashboard::queue_health))
        // Users
        .route("/admin/users", get(users::list))
        .route("/admin/users/:id", get(users::get))
        .route("/admin/users/:id/suspend", post(users::suspend))
        .route("/admin/users/:id/unsuspend", post(users::unsuspend))
        .route("/admin/users/:id/impersonate", post(users::impersonate))
        // Tokens
        .route("/admin/tokens/dashboard", get(tokens::dashboard))
        .route("/admin/tokens/ledger", get(tokens::ledger))
        .route("/admin/users/:id/tokens", get(tokens::user_tokens))
        .route("/admin/users/:id/tokens/grant", post(tokens::grant))
        // Activity
        .route("/admin/events", get(activity::events))
        .route("/admin/audit-logs", get(activity::audit_logs))
        .route("/admin/generation-jobs", get(activity::generation_jobs))
        .route("/admin/generation-jobs/:id", get(activity::generation_job))
        .route("/admin/errors/dashboard", get(activity::errors_dashboard))
        // Content
        .route("/admin/assets", get(content::assets))
        .route("/admin/storage/usage", get(content::storage_usage))
        // System
        .route("/admin/models", get(system::list_models))
        .route(
            "/admin/models/:id",
            get(system::get_model).put(system::update_model),
        )
        .route("/admin/feature-flags", get(system::list_feature_flags))
        .route(
            "/admin/feature-flags/:id",
            get(system::get_feature_flag).put(system::update_feature_flag),
        )
        .route(
            "/admin/system/incident-banner",
            get(system::get_banner).put(system::set_banner),
        )
        .route("/admin/system/maintenance-mode", put(system::set_maintenance))
        .route("/admin/generation-jobs/:id/retry", post(system::retry_job))
        .route("/admin/generation-jobs/:id/cancel", post(system::cancel_job))
        // Staff & keys
        .route("/admin/staff", get(staff::list).post(staff::create))
        .route(
            "/admin/staff/:id",
            put(staff::update).delete(staff::deactivate),
        )
        .route("/admin/staff/:id/mfa/reset", post(staff::reset_mfa))
        .route(
            "/admin/api-keys",
            get(staff::list_api_keys).post(staff::create_api_key),
        )
        .route("/admin/api-keys/:id", delete(staff::revoke_api_key))
        .route_layer(from_fn_with_state(
            state,
            middleware::auth::require_staff,
        ))
}

async fn root() -> axum::response::Json<Value> {
    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Admin Dashboard API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "login": "/admin/auth/login (public)",
                "admin": "/admin/* (protected - bearer JWT or X-Api-Key)",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match database::health_check(&state.pool).await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
