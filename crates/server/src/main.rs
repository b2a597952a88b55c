use rustls::crypto;
use rustls::crypto::CryptoProvider;
use sea_orm::Database;
use std::sync::Arc;
use tiki_taka::AppResources;
use tiki_taka::api::{AdminState, start_webserver};
use tiki_taka::config::load_config_or_panic;
use tiki_taka::dispatch::RateLimiter;
use tiki_taka::email::build_provider;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "tiki_taka=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    // A missing .env is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();

    initialize_tracing();

    let config = Arc::new(load_config_or_panic());

    let ring_provider = crypto::ring::default_provider();
    CryptoProvider::install_default(ring_provider)
        .map_err(|_| color_eyre::eyre::eyre!("Failed to install crypto provider"))?;

    let db = Arc::new(Database::connect(&config.database_url).await?);

    let mailer = build_provider(&config.email)?;
    tracing::info!(
        name = "startup.email_provider",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        provider = mailer.name(),
        from = %config.email.from,
        message = "Email transport ready"
    );

    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    tracing::info!(
        name = "startup.rate_limiter",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        min_interval_ms = config.rate_limit.min_interval_ms,
        burst_limit = config.rate_limit.burst_limit,
        persisted = config.rate_limit.state_path.is_some(),
        message = "Rate limiter ready"
    );

    let resources = AppResources { db, mailer, config };
    let admin_state = AdminState::new(&resources, limiter);

    start_webserver(admin_state, resources).await?;
    Ok(())
}
