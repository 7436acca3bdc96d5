//! Per-address inbox polling
//!
//! Each address owns at most one timer task. A tick runs the fetch
//! callback and folds the outcome into the address's [`PollState`]:
//!
//! - success resets the retry counter
//! - a terminal failure (the account is gone) invalidates the account
//!   and stops polling for good
//! - any other failure counts as a retry; once the retry budget is spent
//!   polling halts in the `Degraded` phase until [`PollingCoordinator::retry_now`]
//!
//! Fetches for one address never overlap. A tick that finds the
//! previous fetch still running is skipped, and the first fetch after a
//! restart waits for any fetch left over from the old timer.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::ClientError;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
pub const MIN_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), ClientError>> + Send + Sync>;

/// Wrap an async closure as a [`FetchFn`].
pub fn fetch_fn<F, Fut>(f: F) -> FetchFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ClientError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Polling,
    Degraded,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct PollState {
    pub phase: PollPhase,
    pub interval: Duration,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub is_account_valid: bool,
    pub last_error: Option<ClientError>,
}

impl PollState {
    fn new(interval: Duration, max_retries: u32) -> Self {
        Self {
            phase: PollPhase::Idle,
            interval,
            last_poll_at: None,
            last_success_at: None,
            retry_count: 0,
            max_retries,
            is_account_valid: true,
            last_error: None,
        }
    }

    /// Whether a timer is currently scheduled.
    pub fn active(&self) -> bool {
        self.phase == PollPhase::Polling
    }
}

struct Entry {
    fetch: FetchFn,
    // Identifies the PollHandle that owns this address
    owner: u64,
    // Identifies the timer task currently armed
    generation: u64,
    cancel: Option<watch::Sender<bool>>,
    busy: Arc<AsyncMutex<()>>,
    state: watch::Sender<PollState>,
}

impl Entry {
    fn disarm(&mut self) -> bool {
        match self.cancel.take() {
            Some(cancel) => {
                let _ = cancel.send(true);
                true
            }
            None => false,
        }
    }
}

struct Inner {
    max_retries: u32,
    next_id: AtomicU64,
    entries: Mutex<HashMap<String, Entry>>,
}

/// Everything a freshly armed timer task needs.
struct Armed {
    generation: u64,
    fetch: FetchFn,
    interval: Duration,
    busy: Arc<AsyncMutex<()>>,
    cancel: watch::Receiver<bool>,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Replace whatever timer the address has with a new one. Must be
    /// called with the entries lock held; the caller spawns the task.
    fn arm(
        &self,
        entries: &mut HashMap<String, Entry>,
        address: &str,
        fetch: FetchFn,
        interval: Duration,
        owner: Option<u64>,
        reset: bool,
    ) -> Armed {
        let interval = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        let generation = self.next_id();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let entry = entries.entry(address.to_string()).or_insert_with(|| {
            let (state, _) = watch::channel(PollState::new(interval, self.max_retries));
            Entry {
                fetch: fetch.clone(),
                owner: 0,
                generation: 0,
                cancel: None,
                busy: Arc::new(AsyncMutex::new(())),
                state,
            }
        });

        entry.disarm();
        entry.fetch = fetch.clone();
        entry.generation = generation;
        entry.cancel = Some(cancel_tx);
        if let Some(owner) = owner {
            entry.owner = owner;
        }
        entry.state.send_modify(|state| {
            state.phase = PollPhase::Polling;
            state.interval = interval;
            state.is_account_valid = true;
            if reset {
                state.retry_count = 0;
                state.last_error = None;
            }
        });

        Armed {
            generation,
            fetch,
            interval,
            busy: Arc::clone(&entry.busy),
            cancel: cancel_rx,
        }
    }

    /// Cancel the address's timer, only if `owner` still owns it when given.
    fn stop(&self, address: &str, owner: Option<u64>) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(address) else {
            return false;
        };
        if owner.is_some_and(|owner| owner != entry.owner) {
            return false;
        }

        let stopped = entry.disarm();
        entry.state.send_modify(|state| {
            if state.phase == PollPhase::Polling {
                state.phase = PollPhase::Stopped;
            }
        });
        if stopped {
            tracing::info!("Stopped polling for {}", address);
        }
        stopped
    }
}

/// Handle-based API around the per-address timers. Clones share state.
#[derive(Clone)]
pub struct PollingCoordinator {
    inner: Arc<Inner>,
}

impl PollingCoordinator {
    pub fn new(max_retries: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_retries,
                next_id: AtomicU64::new(0),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Poll `address` every `interval`, fetching once right away.
    ///
    /// Any timer already running for the address is cancelled first, so
    /// starting twice leaves exactly one timer. The interval is clamped
    /// to [`MIN_INTERVAL`]..=[`MAX_INTERVAL`].
    pub fn start(&self, address: &str, fetch: FetchFn, interval: Duration) -> PollHandle {
        let owner = self.inner.next_id();
        let armed = {
            let mut entries = self.inner.entries();
            self.inner
                .arm(&mut entries, address, fetch, interval, Some(owner), true)
        };
        self.spawn(address, armed);

        PollHandle {
            address: address.to_string(),
            owner,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Cancel the timer for `address`. A fetch already in flight runs to
    /// completion but its result is discarded.
    pub fn stop(&self, address: &str) -> bool {
        self.inner.stop(address, None)
    }

    /// Swap the interval of a running timer, keeping its fetch callback.
    /// Returns false when the address is not currently polling.
    pub fn update_interval(&self, address: &str, interval: Duration) -> bool {
        let armed = {
            let mut entries = self.inner.entries();
            let fetch = match entries.get(address) {
                Some(entry) if entry.state.borrow().active() => Arc::clone(&entry.fetch),
                _ => return false,
            };
            self.inner
                .arm(&mut entries, address, fetch, interval, None, false)
        };
        self.spawn(address, armed);
        true
    }

    /// Manual retry: restart polling with a fresh retry budget.
    ///
    /// Refused once the account has been invalidated, and for addresses
    /// that were stopped on purpose.
    pub fn retry_now(&self, address: &str) -> bool {
        let armed = {
            let mut entries = self.inner.entries();
            let (fetch, interval) = match entries.get(address) {
                Some(entry) => {
                    let state = entry.state.borrow();
                    let retryable = state.is_account_valid
                        && matches!(state.phase, PollPhase::Polling | PollPhase::Degraded);
                    if !retryable {
                        return false;
                    }
                    (Arc::clone(&entry.fetch), state.interval)
                }
                None => return false,
            };
            self.inner
                .arm(&mut entries, address, fetch, interval, None, true)
        };
        tracing::info!("Retrying polling for {}", address);
        self.spawn(address, armed);
        true
    }

    pub fn stop_all(&self) {
        let mut entries = self.inner.entries();
        for (address, entry) in entries.iter_mut() {
            if entry.disarm() {
                tracing::info!("Stopped polling for {}", address);
            }
            entry.state.send_modify(|state| {
                if state.phase == PollPhase::Polling {
                    state.phase = PollPhase::Stopped;
                }
            });
        }
    }

    /// Stop polling and drop all state kept for `address`.
    pub fn forget(&self, address: &str) {
        self.inner.stop(address, None);
        self.inner.entries().remove(address);
    }

    pub fn status(&self, address: &str) -> Option<PollState> {
        self.inner
            .entries()
            .get(address)
            .map(|entry| entry.state.borrow().clone())
    }

    pub fn is_polling(&self, address: &str) -> bool {
        self.status(address).is_some_and(|state| state.active())
    }

    /// Observe state changes for `address`.
    pub fn subscribe(&self, address: &str) -> Option<watch::Receiver<PollState>> {
        self.inner
            .entries()
            .get(address)
            .map(|entry| entry.state.subscribe())
    }

    fn spawn(&self, address: &str, armed: Armed) {
        tracing::info!("Started polling for {} every {:?}", address, armed.interval);
        tokio::spawn(run_timer(
            Arc::clone(&self.inner),
            address.to_string(),
            armed,
        ));
    }
}

impl Default for PollingCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

/// Ownership of an address's timer.
///
/// Dropping the handle stops polling, unless a later `start` for the
/// same address has taken the timer over.
#[must_use = "polling stops as soon as the handle is dropped"]
pub struct PollHandle {
    address: String,
    owner: u64,
    inner: Weak<Inner>,
}

impl PollHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// False once another `start` for this address superseded the handle.
    pub fn is_current(&self) -> bool {
        self.inner.upgrade().is_some_and(|inner| {
            inner
                .entries()
                .get(&self.address)
                .is_some_and(|entry| entry.owner == self.owner)
        })
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.stop(&self.address, Some(self.owner));
        }
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // A dropped sender means the entry disarmed itself
    let _ = cancel.wait_for(|stop| *stop).await;
}

async fn run_timer(inner: Arc<Inner>, address: String, armed: Armed) {
    let Armed {
        generation,
        fetch,
        interval,
        busy,
        mut cancel,
    } = armed;

    let guard = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => return,
        guard = busy.lock() => guard,
    };
    let keep_going = poll_once(&inner, &address, generation, &fetch, &cancel).await;
    drop(guard);
    if !keep_going {
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return,
            _ = ticker.tick() => {}
        }

        let Ok(guard) = busy.try_lock() else {
            tracing::debug!("Skipping poll tick for {}, previous fetch still running", address);
            continue;
        };
        let keep_going = poll_once(&inner, &address, generation, &fetch, &cancel).await;
        drop(guard);
        if !keep_going {
            return;
        }
    }
}

/// Run one fetch and record its outcome. Returns whether the timer
/// should keep going.
async fn poll_once(
    inner: &Inner,
    address: &str,
    generation: u64,
    fetch: &FetchFn,
    cancel: &watch::Receiver<bool>,
) -> bool {
    if *cancel.borrow() {
        return false;
    }

    let result = fetch().await;

    let mut entries = inner.entries();
    let Some(entry) = entries.get_mut(address) else {
        return false;
    };
    if entry.generation != generation || *cancel.borrow() {
        tracing::debug!("Discarding poll result for {}, polling was stopped", address);
        return false;
    }

    let now = Utc::now();
    let mut keep_going = true;
    entry.state.send_modify(|state| {
        state.last_poll_at = Some(now);
        match result {
            Ok(()) => {
                state.retry_count = 0;
                state.last_success_at = Some(now);
                state.last_error = None;
            }
            Err(err) if err.kind.is_terminal() => {
                tracing::warn!("Account {} is gone, stopping polling: {}", address, err);
                state.is_account_valid = false;
                state.phase = PollPhase::Stopped;
                state.last_error = Some(err);
                keep_going = false;
            }
            Err(err) => {
                state.retry_count += 1;
                if state.retry_count >= state.max_retries {
                    tracing::warn!(
                        "Polling {} failed {} times, giving up: {}",
                        address,
                        state.retry_count,
                        err
                    );
                    state.phase = PollPhase::Degraded;
                    keep_going = false;
                } else {
                    tracing::debug!(
                        "Polling {} failed ({}/{}): {}",
                        address,
                        state.retry_count,
                        state.max_retries,
                        err
                    );
                }
                state.last_error = Some(err);
            }
        }
    });

    if !keep_going {
        entry.cancel = None;
    }
    keep_going
}
