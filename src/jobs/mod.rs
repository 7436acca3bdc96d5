//! Background jobs run for the life of the server

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::api::SharedState;

mod sweep_sessions;

pub use sweep_sessions::SweepIdleSessions;

#[async_trait]
pub trait PeriodicJob: std::fmt::Debug + Send + Sync + 'static {
    /// Time between runs. The first run happens one interval after spawning.
    fn interval(&self) -> Duration;

    async fn run_job(&self, state: &SharedState);
}

/// Run `job` in its own tokio task, forever.
pub fn spawn_periodic_job<J: PeriodicJob>(state: SharedState, job: J) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = job.interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        tracing::debug!("Scheduled job {:?} every {:?}", job, period);

        loop {
            ticker.tick().await;
            job.run_job(&state).await;
        }
    })
}
