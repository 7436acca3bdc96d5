use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::api::init_tracing;
use crate::client::{
    InboxEvent, InboxWatcher, PollPhase, PollState, PollingCoordinator, TempMailClient,
};

/// How many times a degraded watcher may be revived without the user.
#[derive(Debug)]
struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    fn new(retries: u32) -> Self {
        Self { remaining: retries }
    }

    /// Spend one retry if `state` has given up and any are left.
    fn spend(&mut self, state: &PollState) -> bool {
        if state.phase != PollPhase::Degraded || self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

pub async fn run(
    api_url: &str,
    address: &str,
    interval_secs: u64,
    auto_retries: u32,
) -> Result<()> {
    init_tracing();

    let client = Arc::new(TempMailClient::new(api_url)?);
    let (mut watcher, mut events) =
        InboxWatcher::new(client, PollingCoordinator::default(), address);
    watcher.set_interval(Duration::from_secs(interval_secs))?;
    watcher.init().await?;

    let mut updates = watcher.updates();
    let mut budget = RetryBudget::new(auto_retries);
    println!("Watching {} every {}s, Ctrl-C to stop", address, interval_secs);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = events.recv() => match event {
                InboxEvent::Refreshed { total, unread } => {
                    println!("{} messages, {} unread", total, unread);
                }
                InboxEvent::NewMessages { count, messages } => {
                    println!("{} new message(s)", count);
                    for message in messages {
                        let from = message
                            .from
                            .map(|f| f.address)
                            .unwrap_or_else(|| "unknown sender".to_string());
                        println!("  {} | {} | {}", message.id, from, message.subject);
                    }
                }
                InboxEvent::AccountExpired { error } => {
                    println!("Account expired: {}", error);
                    break;
                }
                InboxEvent::Recovered => println!("Account recovered"),
            },
            Ok(()) = async {
                match updates.as_mut() {
                    Some(rx) => rx.changed().await,
                    None => std::future::pending().await,
                }
            } => {
                let state = updates
                    .as_mut()
                    .map(|rx| rx.borrow_and_update().clone());
                if let Some(state) = state {
                    if state.phase == PollPhase::Degraded {
                        let reason = state
                            .last_error
                            .as_ref()
                            .map(|e| e.message.clone())
                            .unwrap_or_default();
                        if !budget.spend(&state) {
                            println!(
                                "Polling gave up after {} failures ({}), run watch again to retry",
                                state.retry_count, reason
                            );
                            break;
                        }
                        println!(
                            "Polling gave up after {} failures ({}), retrying ({} left)",
                            state.retry_count, reason, budget.remaining
                        );
                        watcher.retry_now();
                    } else if state.retry_count > 0 {
                        println!("Poll failed, retry {}/{}", state.retry_count, state.max_retries);
                    }
                }
            },
        }
    }

    watcher.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(phase: PollPhase) -> PollState {
        PollState {
            phase,
            interval: Duration::from_secs(15),
            last_poll_at: None,
            last_success_at: None,
            retry_count: 3,
            max_retries: 3,
            is_account_valid: true,
            last_error: None,
        }
    }

    #[test]
    fn it_stops_retrying_once_the_budget_is_spent() {
        let mut budget = RetryBudget::new(2);
        let degraded = state(PollPhase::Degraded);

        assert!(budget.spend(&degraded));
        assert!(budget.spend(&degraded));
        assert!(!budget.spend(&degraded));
    }

    #[test]
    fn it_only_retries_a_degraded_watcher() {
        let mut budget = RetryBudget::new(1);

        assert!(!budget.spend(&state(PollPhase::Polling)));
        assert!(!RetryBudget::new(0).spend(&state(PollPhase::Degraded)));
        assert!(budget.spend(&state(PollPhase::Degraded)));
    }
}
