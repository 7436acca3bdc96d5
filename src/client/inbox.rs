//! Inbox watcher for a single address
//!
//! Ties the backend client to the polling coordinator the way the web
//! frontend does: validate the account, poll its inbox, announce new
//! messages and stop for good once the account is gone.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::api::{AccountStatus, TempMailClient};
use super::polling::{
    DEFAULT_INTERVAL, FetchFn, MAX_INTERVAL, MIN_INTERVAL, PollHandle, PollState,
    PollingCoordinator, fetch_fn,
};
use super::ClientError;
use crate::api::public::email::InboxResponse;
use crate::mailtm::MessageSummary;

#[derive(Debug, Clone)]
pub enum InboxEvent {
    Refreshed { total: u64, unread: usize },
    NewMessages {
        count: usize,
        messages: Vec<MessageSummary>,
    },
    AccountExpired { error: ClientError },
    Recovered,
}

type KnownIds = Arc<Mutex<Option<HashSet<String>>>>;

pub struct InboxWatcher {
    client: Arc<TempMailClient>,
    coordinator: PollingCoordinator,
    address: String,
    interval: Duration,
    auto_refresh: bool,
    // None until the first successful load
    known: KnownIds,
    events: mpsc::UnboundedSender<InboxEvent>,
    handle: Option<PollHandle>,
}

impl InboxWatcher {
    pub fn new(
        client: Arc<TempMailClient>,
        coordinator: PollingCoordinator,
        address: &str,
    ) -> (Self, mpsc::UnboundedReceiver<InboxEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            client,
            coordinator,
            address: address.trim().to_string(),
            interval: DEFAULT_INTERVAL,
            auto_refresh: true,
            known: Arc::new(Mutex::new(None)),
            events,
            handle: None,
        };
        (watcher, rx)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    /// Check the account once, then start polling when auto refresh is on.
    pub async fn init(&mut self) -> Result<(), ClientError> {
        match self.client.check_account_status(&self.address).await {
            AccountStatus::Valid(_) => {}
            AccountStatus::Invalid(error) => {
                tracing::warn!("Account {} is no longer valid: {}", self.address, error);
                let _ = self.events.send(InboxEvent::AccountExpired {
                    error: error.clone(),
                });
                return Err(error);
            }
            // Polling retries on its own; the retry budget decides
            AccountStatus::Unreachable(error) => {
                tracing::warn!("Could not verify {}: {}", self.address, error);
            }
        }

        if self.auto_refresh {
            self.start_polling();
        }
        Ok(())
    }

    fn fetch(&self) -> FetchFn {
        let client = Arc::clone(&self.client);
        let address = self.address.clone();
        let known = Arc::clone(&self.known);
        let events = self.events.clone();

        fetch_fn(move || {
            let client = Arc::clone(&client);
            let address = address.clone();
            let known = Arc::clone(&known);
            let events = events.clone();
            async move {
                match client.get_inbox(&address, false).await {
                    Ok(inbox) => {
                        observe(&known, &events, &inbox);
                        Ok(())
                    }
                    Err(error) => {
                        if error.kind.is_terminal() {
                            let _ = events.send(InboxEvent::AccountExpired {
                                error: error.clone(),
                            });
                        }
                        Err(error)
                    }
                }
            }
        })
    }

    fn start_polling(&mut self) {
        // Replacing the handle drops the old one, which is inert by now
        self.handle = Some(
            self.coordinator
                .start(&self.address, self.fetch(), self.interval),
        );
    }

    /// Manual refresh, always from the network.
    pub async fn refresh(&self) -> Result<InboxResponse, ClientError> {
        match self.client.get_inbox(&self.address, true).await {
            Ok(inbox) => {
                observe(&self.known, &self.events, &inbox);
                Ok(inbox)
            }
            Err(error) => {
                if error.kind.is_terminal() {
                    self.coordinator.stop(&self.address);
                    let _ = self.events.send(InboxEvent::AccountExpired {
                        error: error.clone(),
                    });
                }
                Err(error)
            }
        }
    }

    /// Change the polling interval. Only 5 to 60 seconds is accepted.
    pub fn set_interval(&mut self, interval: Duration) -> Result<(), ClientError> {
        if !(MIN_INTERVAL..=MAX_INTERVAL).contains(&interval) {
            return Err(ClientError::invalid_input(format!(
                "Interval must be between {} and {} seconds",
                MIN_INTERVAL.as_secs(),
                MAX_INTERVAL.as_secs()
            )));
        }
        self.interval = interval;
        self.coordinator.update_interval(&self.address, interval);
        Ok(())
    }

    /// Pause or resume polling. Returns the new setting.
    pub fn toggle_auto_refresh(&mut self) -> bool {
        self.auto_refresh = !self.auto_refresh;
        if self.auto_refresh {
            let account_valid = self
                .state()
                .is_none_or(|state| state.is_account_valid);
            if account_valid {
                self.start_polling();
            }
        } else {
            self.stop();
        }
        tracing::info!(
            "Auto refresh for {} is {}",
            self.address,
            if self.auto_refresh { "on" } else { "off" }
        );
        self.auto_refresh
    }

    /// Retry after polling gave up on transient errors.
    pub fn retry_now(&self) -> bool {
        self.coordinator.retry_now(&self.address)
    }

    /// Check an expired account once more and resume polling if it is back.
    pub async fn recover(&mut self) -> Result<(), ClientError> {
        match self.client.check_account_status(&self.address).await {
            AccountStatus::Valid(_) => {
                tracing::info!("Account {} recovered", self.address);
                let _ = self.events.send(InboxEvent::Recovered);
                if self.auto_refresh {
                    self.start_polling();
                }
                Ok(())
            }
            AccountStatus::Invalid(error) | AccountStatus::Unreachable(error) => Err(error),
        }
    }

    pub fn state(&self) -> Option<PollState> {
        self.coordinator.status(&self.address)
    }

    /// Observe poll state changes, e.g. retry counts and degradation.
    pub fn updates(&self) -> Option<watch::Receiver<PollState>> {
        self.coordinator.subscribe(&self.address)
    }

    /// Stop polling if this watcher still owns the address's timer.
    pub fn stop(&mut self) {
        self.handle = None;
    }
}

/// Record the ids seen in `inbox` and announce any that are new. The
/// first load only establishes the baseline.
fn observe(
    known: &Mutex<Option<HashSet<String>>>,
    events: &mpsc::UnboundedSender<InboxEvent>,
    inbox: &InboxResponse,
) {
    let fresh: Vec<MessageSummary> = {
        let mut known = known.lock().unwrap_or_else(|e| e.into_inner());
        let ids = inbox.messages.iter().map(|m| m.id.clone());
        match known.as_mut() {
            // A late response may miss ids already announced, so the set
            // only ever grows
            Some(seen) => {
                let fresh: Vec<_> = inbox
                    .messages
                    .iter()
                    .filter(|m| !seen.contains(&m.id))
                    .cloned()
                    .collect();
                seen.extend(ids);
                fresh
            }
            None => {
                *known = Some(ids.collect());
                Vec::new()
            }
        }
    };

    if !fresh.is_empty() {
        tracing::info!("{} new message(s) for {}", fresh.len(), inbox.address);
        let _ = events.send(InboxEvent::NewMessages {
            count: fresh.len(),
            messages: fresh,
        });
    }
    let _ = events.send(InboxEvent::Refreshed {
        total: inbox.total,
        unread: inbox.unread,
    });
}
