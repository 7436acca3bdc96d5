use std::time::Duration;

use async_trait::async_trait;

use super::PeriodicJob;
use crate::api::SharedState;
use crate::core::AppConfig;

/// Evicts sessions nobody has used within the idle TTL.
#[derive(Debug)]
pub struct SweepIdleSessions {
    interval: Duration,
}

impl SweepIdleSessions {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            interval: config.sweep_interval,
        }
    }
}

#[async_trait]
impl PeriodicJob for SweepIdleSessions {
    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_job(&self, state: &SharedState) {
        let evicted = state.mailbox.sessions().sweep();
        if !evicted.is_empty() {
            tracing::info!(
                "Swept {} idle sessions, {} remaining",
                evicted.len(),
                state.mailbox.sessions().len()
            );
        }
    }
}
