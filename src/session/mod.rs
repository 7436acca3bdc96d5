//! In-memory store of mailbox sessions
//!
//! A session is only ever inserted once the provider has both created
//! the account and issued a token for it. Records live until they are
//! deleted or go idle for longer than the configured TTL.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ErrorKind;
use crate::mailtm::{MailProvider, MailboxError};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub address: String,
    #[serde(skip_serializing)]
    pub auth_token: String,
    pub quota: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(session_id: &str, address: &str, auth_token: &str, quota: u64) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            address: address.to_string(),
            auth_token: auth_token.to_string(),
            quota,
            created_at: now,
            last_accessed_at: now,
        }
    }

    fn is_idle(&self, now: DateTime<Utc>, idle_ttl: chrono::Duration) -> bool {
        now - self.last_accessed_at > idle_ttl
    }
}

/// Result of a delete. The local record is gone either way.
#[derive(Debug)]
pub struct DeleteOutcome {
    pub record: SessionRecord,
    pub upstream_error: Option<MailboxError>,
}

/// Cheap to clone handle over the shared session map.
#[derive(Clone, Debug)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    // A poisoned lock only means another request panicked mid-update;
    // every update here is a single map operation so the data is intact.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the provider account, issue its token and only then
    /// record the session.
    pub async fn create(
        &self,
        provider: &dyn MailProvider,
        address: &str,
        password: &str,
    ) -> Result<SessionRecord, MailboxError> {
        if self.find_by_address(address).is_ok() {
            return Err(MailboxError::from(ErrorKind::Conflict));
        }

        let account = provider.create_account(address, password).await?;
        let token = provider.issue_token(address, password).await?;

        let record = SessionRecord::new(&account.id, &account.address, &token.token, account.quota);
        self.insert(record.clone())?;
        tracing::info!("Created session {} for {}", record.session_id, record.address);

        Ok(record)
    }

    /// Insert a fully formed record, refusing a second live session
    /// for the same id or address.
    pub fn insert(&self, record: SessionRecord) -> Result<(), MailboxError> {
        let mut sessions = self.write();
        let taken = sessions.contains_key(&record.session_id)
            || sessions.values().any(|s| s.address == record.address);
        if taken {
            tracing::warn!("Refusing duplicate session for {}", record.address);
            return Err(MailboxError::from(ErrorKind::Conflict));
        }
        sessions.insert(record.session_id.clone(), record);
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Result<SessionRecord, MailboxError> {
        self.read()
            .get(session_id)
            .cloned()
            .ok_or_else(MailboxError::session_not_found)
    }

    pub fn find_by_address(&self, address: &str) -> Result<SessionRecord, MailboxError> {
        self.read()
            .values()
            .find(|s| s.address == address)
            .cloned()
            .ok_or_else(MailboxError::session_not_found)
    }

    pub fn touch(&self, session_id: &str) {
        if let Some(record) = self.write().get_mut(session_id) {
            record.last_accessed_at = Utc::now();
        }
    }

    /// Delete the account upstream and drop the local record.
    ///
    /// Local state wins: the record is removed even when the provider
    /// call fails, and that failure is only reported in the outcome.
    pub async fn delete(
        &self,
        provider: &dyn MailProvider,
        session_id: &str,
    ) -> Result<DeleteOutcome, MailboxError> {
        let record = self.get(session_id)?;

        let upstream_error = provider
            .delete_account(&record.auth_token, &record.session_id)
            .await
            .err();
        if let Some(err) = &upstream_error {
            tracing::warn!(
                "Upstream delete failed for {} ({:?}): {}",
                record.address,
                err.kind,
                err
            );
        }

        // A concurrent delete may have removed it while the call was in flight
        let record = self.remove(session_id).unwrap_or(record);
        tracing::info!("Deleted session {} for {}", record.session_id, record.address);

        Ok(DeleteOutcome {
            record,
            upstream_error,
        })
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionRecord> {
        self.write().remove(session_id)
    }

    /// Evict every session idle longer than the TTL.
    pub fn sweep(&self) -> Vec<SessionRecord> {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> Vec<SessionRecord> {
        let idle_ttl = chrono::Duration::from_std(self.idle_ttl).unwrap_or(chrono::Duration::MAX);

        let mut sessions = self.write();
        let stale: Vec<String> = sessions
            .values()
            .filter(|s| s.is_idle(now, idle_ttl))
            .map(|s| s.session_id.clone())
            .collect();

        let evicted: Vec<SessionRecord> = stale
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect();
        for record in &evicted {
            tracing::info!("Cleaning up idle session: {}", record.address);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Creation time of the oldest live session.
    pub fn oldest_created_at(&self) -> Option<DateTime<Utc>> {
        self.read().values().map(|s| s.created_at).min()
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeProvider;
    use super::*;

    const DAY: Duration = Duration::from_secs(60 * 60 * 24);

    fn record_idle_for(id: &str, address: &str, idle: chrono::Duration) -> SessionRecord {
        let mut record = SessionRecord::new(id, address, "tok", 0);
        record.last_accessed_at = Utc::now() - idle;
        record
    }

    #[tokio::test]
    async fn it_creates_a_session() {
        let store = SessionStore::new(DAY);
        let provider = FakeProvider::default();

        let record = store
            .create(&provider, "foo@domain.com", "secret1")
            .await
            .unwrap();

        assert_eq!(record.address, "foo@domain.com");
        assert!(!record.session_id.is_empty());
        assert!(!record.auth_token.is_empty());
        assert_eq!(store.get(&record.session_id).unwrap().address, "foo@domain.com");
    }

    #[tokio::test]
    async fn it_stores_nothing_when_account_creation_fails() {
        let store = SessionStore::new(DAY);
        let provider = FakeProvider {
            fail_create: Some(ErrorKind::Conflict),
            ..Default::default()
        };

        let err = store
            .create(&provider, "foo@domain.com", "secret1")
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(store.is_empty());
        assert!(store.find_by_address("foo@domain.com").is_err());
    }

    #[tokio::test]
    async fn it_stores_nothing_when_token_issuance_fails() {
        let store = SessionStore::new(DAY);
        let provider = FakeProvider {
            fail_token: Some(ErrorKind::UpstreamUnreachable),
            ..Default::default()
        };

        let err = store
            .create(&provider, "foo@domain.com", "secret1")
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::UpstreamUnreachable);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn it_rejects_a_live_address_without_calling_the_provider() {
        let store = SessionStore::new(DAY);
        let provider = FakeProvider::default();
        store.create(&provider, "foo@domain.com", "secret1").await.unwrap();
        let calls = provider.calls();

        let err = store
            .create(&provider, "foo@domain.com", "secret1")
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(provider.calls(), calls);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn it_finds_sessions_by_address() {
        let store = SessionStore::new(DAY);
        store.insert(SessionRecord::new("a", "a@domain.com", "tok", 0)).unwrap();
        store.insert(SessionRecord::new("b", "b@domain.com", "tok", 0)).unwrap();

        assert_eq!(store.find_by_address("b@domain.com").unwrap().session_id, "b");
        let err = store.find_by_address("c@domain.com").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionNotFound);
    }

    #[test]
    fn it_ignores_touching_unknown_sessions() {
        let store = SessionStore::new(DAY);
        store.touch("nope");
        assert!(store.is_empty());
    }

    #[test]
    fn it_never_sweeps_a_freshly_touched_session() {
        let store = SessionStore::new(DAY);
        store
            .insert(record_idle_for("a", "a@domain.com", chrono::Duration::hours(30)))
            .unwrap();

        store.touch("a");
        let evicted = store.sweep();

        assert!(evicted.is_empty());
        assert!(store.get("a").is_ok());
    }

    #[test]
    fn it_sweeps_exactly_the_idle_sessions() {
        let store = SessionStore::new(DAY);
        store
            .insert(record_idle_for("a", "a@domain.com", chrono::Duration::hours(23)))
            .unwrap();
        store
            .insert(record_idle_for("b", "b@domain.com", chrono::Duration::hours(25)))
            .unwrap();

        let evicted = store.sweep();

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].session_id, "b");
        assert!(store.get("a").is_ok());
        assert!(store.get("b").is_err());
    }

    #[test]
    fn it_sweeps_relative_to_the_given_time() {
        let store = SessionStore::new(DAY);
        store.insert(SessionRecord::new("a", "a@domain.com", "tok", 0)).unwrap();

        assert!(store.sweep_at(Utc::now() + chrono::Duration::hours(23)).is_empty());
        assert_eq!(store.sweep_at(Utc::now() + chrono::Duration::hours(25)).len(), 1);
    }

    #[tokio::test]
    async fn it_deletes_idempotently() {
        let store = SessionStore::new(DAY);
        let provider = FakeProvider::default();
        let record = store.create(&provider, "foo@domain.com", "secret1").await.unwrap();

        let outcome = store.delete(&provider, &record.session_id).await.unwrap();
        assert!(outcome.upstream_error.is_none());
        assert!(provider.deleted.lock().unwrap().contains(&record.session_id));

        let err = store.delete(&provider, &record.session_id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionNotFound);
    }

    #[tokio::test]
    async fn it_removes_the_local_record_when_upstream_delete_fails() {
        let store = SessionStore::new(DAY);
        let provider = FakeProvider {
            fail_delete: Some(ErrorKind::UpstreamFailure),
            ..Default::default()
        };
        let record = store.create(&provider, "foo@domain.com", "secret1").await.unwrap();

        let outcome = store.delete(&provider, &record.session_id).await.unwrap();

        assert_eq!(outcome.upstream_error.unwrap().kind, ErrorKind::UpstreamFailure);
        assert!(store.is_empty());
        // The address can be reused right away
        assert!(store.create(&provider, "foo@domain.com", "secret1").await.is_ok());
    }

    #[test]
    fn it_never_serializes_the_token() {
        let record = SessionRecord::new("a", "a@domain.com", "super-secret", 0);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(json.contains("lastAccessedAt"));
    }
}
