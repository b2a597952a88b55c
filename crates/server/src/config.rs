use lettre::message::Mailbox;
use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Which transport delivers outbound email.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmailProviderKind {
    #[default]
    Resend,
    Smtp,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResendConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_resend_base_url")]
    pub base_url: String,
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_resend_base_url(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub provider: EmailProviderKind,
    /// Sender mailbox, e.g. `Tiki Taka <noreply@example.org>`.
    pub from: String,
    #[serde(default)]
    pub resend: ResendConfig,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

/// Retry/backoff knobs for rate-limited sends.
#[derive(Clone, Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause after every send except the last one of a run.
    #[serde(default = "default_inter_send_delay_ms")]
    pub inter_send_delay_ms: u64,
    /// Extra pause between two batches.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Correction runs use smaller batches.
    #[serde(default = "default_correction_batch_size")]
    pub correction_batch_size: usize,
    #[serde(default = "default_dispatch_retry")]
    pub retry: RetryConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_send_delay_ms: default_inter_send_delay_ms(),
            batch_pause_ms: default_batch_pause_ms(),
            correction_batch_size: default_correction_batch_size(),
            retry: default_dispatch_retry(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TestEmailConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    /// Name used in the greeting of test invitations.
    #[serde(default = "default_test_player_name")]
    pub player_name: String,
}

impl Default for TestEmailConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            player_name: default_test_player_name(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_burst_limit")]
    pub burst_limit: u32,
    /// JSON file the limiter state is persisted to. Memory only when unset.
    #[serde(default)]
    pub state_path: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            burst_limit: default_burst_limit(),
            state_path: None,
        }
    }
}

/// Details printed in invitations.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_team_name")]
    pub team_name: String,
    #[serde(default = "default_session_time")]
    pub time: String,
    #[serde(default = "default_session_location")]
    pub location: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            team_name: default_team_name(),
            time: default_session_time(),
            location: default_session_location(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Public site the response links point at.
    pub frontend_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Bearer token required on `/api/admin/*`. Admin routes are open when unset.
    #[serde(default)]
    pub admin_token: Option<String>,
    pub email: EmailConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub test_email: TestEmailConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl AppConfig {
    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database_url (DATABASE_URL) is not set".into(),
            ));
        }
        if self.frontend_url.trim().is_empty() {
            return Err(ConfigError::Validation("frontend_url must not be empty".into()));
        }
        if self.email.from.parse::<Mailbox>().is_err() {
            return Err(ConfigError::Validation(format!(
                "email.from is not a valid mailbox: {}",
                self.email.from
            )));
        }
        match self.email.provider {
            EmailProviderKind::Resend => {
                if self.email.resend.api_key.trim().is_empty() {
                    return Err(ConfigError::Validation(
                        "email.resend.api_key (RESEND_API_KEY) is not set".into(),
                    ));
                }
            }
            EmailProviderKind::Smtp => match &self.email.smtp {
                None => {
                    return Err(ConfigError::Validation(
                        "email.smtp must be configured when provider is smtp".into(),
                    ));
                }
                Some(smtp) if smtp.port == 0 => {
                    return Err(ConfigError::Validation("email.smtp.port must be > 0".into()));
                }
                Some(_) => {}
            },
        }
        if self.dispatch.batch_size == 0 {
            return Err(ConfigError::Validation(
                "dispatch.batch_size must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Frontend base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.frontend_url.trim_end_matches('/')
    }
}

fn default_resend_base_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_jitter_ms() -> u64 {
    250
}

fn default_batch_size() -> usize {
    10
}

fn default_inter_send_delay_ms() -> u64 {
    600 // stays under the provider's 2 req/s
}

fn default_batch_pause_ms() -> u64 {
    1000
}

fn default_correction_batch_size() -> usize {
    5
}

fn default_dispatch_retry() -> RetryConfig {
    RetryConfig {
        initial_backoff_ms: 600,
        ..RetryConfig::default()
    }
}

fn default_test_player_name() -> String {
    "Test Player".to_string()
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_burst_limit() -> u32 {
    1
}

fn default_team_name() -> String {
    "Tiki Taka".to_string()
}

fn default_session_time() -> String {
    "17:30".to_string()
}

fn default_session_location() -> String {
    "Kunststofbanen, Arsenalvej 2, København".to_string()
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// The file path can be changed with `TIKI_TAKA_CONFIG`; a missing file is not an
/// error so container deployments can run from the environment alone. Any key can be
/// overridden with an `APP__` prefixed variable using `__` between path segments
/// (e.g. `APP__DISPATCH__BATCH_SIZE`). The two secrets are also read from their
/// conventional names, `RESEND_API_KEY` and `DATABASE_URL`.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};

    let path = env::var("TIKI_TAKA_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let cfg = Config::builder()
        .add_source(File::with_name(&path).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .set_override_option("email.resend.api_key", env::var("RESEND_API_KEY").ok())?
        .set_override_option("database_url", env::var("DATABASE_URL").ok())?
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting the panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
