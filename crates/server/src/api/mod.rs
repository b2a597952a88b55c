//! HTTP endpoints.
//!
//! - `admin` - Email dispatch and rate limit controls (/api/admin/*)
//! - `players` - Registration, response links and roster (/api/users, /api/respond, /api/roster)
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod admin;
pub mod auth;
pub mod health;
pub mod openapi;
pub mod players;

pub use admin::{ADMIN_TAG, AdminState};
pub use health::MISC_TAG;
pub use players::PLAYERS_TAG;

use crate::AppResources;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the full application router. Split out of [`start_webserver`] for tests.
pub fn app(admin_state: AdminState, app_resources: AppResources) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/api/admin", admin::router(admin_state))
        .merge(players::router())
        .routes(routes!(health::health))
        .layer(axum::Extension(app_resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(admin_state, app_resources))]
pub async fn start_webserver(
    admin_state: AdminState,
    app_resources: AppResources,
) -> color_eyre::Result<()> {
    let addr = app_resources.config.listen_addr.clone();
    let router = app(admin_state, app_resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        name = "api.server.listening",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        addr = %addr,
        message = "Server running"
    );
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
