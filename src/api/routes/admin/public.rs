//! Public types for the admin API
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub sessions: usize,
    pub oldest_session_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}
