use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::rate_limit::RateLimiters;
use crate::core::AppConfig;
use crate::mailbox::Mailbox;
use crate::mailtm::{MailProvider, MailTmClient};
use crate::session::SessionStore;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AppConfig,
    pub mailbox: Mailbox,
    pub limits: RateLimiters,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// State backed by the real Mail.tm API at `config.mailtm_base_url`.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let provider = MailTmClient::new(&config.mailtm_base_url, config.provider_timeout)?;
        Ok(Self::with_provider(config, Arc::new(provider)))
    }

    pub fn with_provider(config: AppConfig, provider: Arc<dyn MailProvider>) -> Self {
        let sessions = SessionStore::new(config.session_idle_ttl);
        let limits = RateLimiters::new(&config);
        Self {
            mailbox: Mailbox::new(sessions, provider),
            limits,
            started_at: Utc::now(),
            config,
        }
    }
}
