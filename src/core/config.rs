use std::env;
use std::time::Duration;

/// A fixed-window request budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub mailtm_base_url: String,
    pub cors_origin: Option<String>,
    pub admin_token: Option<String>,
    pub static_dir: String,
    pub provider_timeout: Duration,
    pub session_idle_ttl: Duration,
    pub sweep_interval: Duration,
    pub general_rate_limit: RateLimit,
    pub creation_rate_limit: RateLimit,
    pub message_rate_limit: RateLimit,
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for AppConfig {
    fn default() -> Self {
        let mailtm_base_url = env::var("TEMPMAIL_MAILTM_BASE_URL")
            .unwrap_or_else(|_| "https://api.mail.tm".to_string());
        let cors_origin = env::var("TEMPMAIL_CORS_ORIGIN").ok();
        // Admin stats are disabled entirely without a token
        let admin_token = env::var("TEMPMAIL_ADMIN_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        let static_dir = env::var("TEMPMAIL_STATIC_DIR").unwrap_or_else(|_| "./web".to_string());
        let provider_timeout = env_secs("TEMPMAIL_PROVIDER_TIMEOUT_SECS", 10);
        let session_idle_ttl = env_secs("TEMPMAIL_SESSION_IDLE_TTL_SECS", 60 * 60 * 24);
        let sweep_interval = env_secs("TEMPMAIL_SWEEP_INTERVAL_SECS", 60 * 60);

        let general_rate_limit = RateLimit::new(
            env_u32("TEMPMAIL_RATE_LIMIT_GENERAL", 100),
            Duration::from_secs(15 * 60),
        );
        let creation_rate_limit = RateLimit::new(
            env_u32("TEMPMAIL_RATE_LIMIT_CREATION", 5),
            Duration::from_secs(60 * 60),
        );
        let message_rate_limit = RateLimit::new(
            env_u32("TEMPMAIL_RATE_LIMIT_MESSAGES", 30),
            Duration::from_secs(60),
        );

        Self {
            mailtm_base_url,
            cors_origin,
            admin_token,
            static_dir,
            provider_timeout,
            session_idle_ttl,
            sweep_interval,
            general_rate_limit,
            creation_rate_limit,
            message_rate_limit,
        }
    }
}
