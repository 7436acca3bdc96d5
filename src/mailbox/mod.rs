//! Session-scoped access to the mailbox provider
//!
//! Every operation on an existing mailbox resolves its session first so
//! an unknown session fails with `SessionNotFound` before any network
//! round trip. Successful reads refresh the session's idle timer.

use std::sync::Arc;

use serde::Serialize;

use crate::mailtm::{
    AttachmentDownload, Collection, Domain, MailProvider, MailboxError, MessageDetail,
    MessageSummary,
};
use crate::session::{DeleteOutcome, SessionRecord, SessionStore};

pub use crate::mailtm::Account as ProviderAccount;

/// Returned once, at creation. The only time the token leaves the server.
#[derive(Clone, Debug, Serialize)]
pub struct CreatedAccount {
    pub id: String,
    pub address: String,
    pub token: String,
    pub quota: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessageSummary>,
    pub total: u64,
}

impl MessagePage {
    pub fn unread(&self) -> usize {
        self.messages.iter().filter(|m| !m.seen).count()
    }
}

#[derive(Clone)]
pub struct Mailbox {
    sessions: SessionStore,
    provider: Arc<dyn MailProvider>,
}

impl Mailbox {
    pub fn new(sessions: SessionStore, provider: Arc<dyn MailProvider>) -> Self {
        Self { sessions, provider }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn create_account(
        &self,
        address: &str,
        password: &str,
    ) -> Result<CreatedAccount, MailboxError> {
        let record = self
            .sessions
            .create(self.provider.as_ref(), address, password)
            .await?;
        Ok(CreatedAccount {
            id: record.session_id,
            address: record.address,
            token: record.auth_token,
            quota: record.quota,
        })
    }

    pub async fn list_messages(
        &self,
        session_id: &str,
        page: u32,
    ) -> Result<MessagePage, MailboxError> {
        let session = self.sessions.get(session_id)?;
        let Collection {
            members,
            total_items,
        } = self.provider.list_messages(&session.auth_token, page).await?;
        self.sessions.touch(session_id);

        Ok(MessagePage {
            messages: members,
            total: total_items,
        })
    }

    pub async fn get_message(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Result<MessageDetail, MailboxError> {
        let session = self.sessions.get(session_id)?;
        let message = self
            .provider
            .get_message(&session.auth_token, message_id)
            .await?;
        self.sessions.touch(session_id);
        Ok(message)
    }

    pub async fn delete_account(&self, session_id: &str) -> Result<DeleteOutcome, MailboxError> {
        self.sessions
            .delete(self.provider.as_ref(), session_id)
            .await
    }

    pub async fn get_account_info(
        &self,
        session_id: &str,
    ) -> Result<(ProviderAccount, SessionRecord), MailboxError> {
        let session = self.sessions.get(session_id)?;
        let info = self
            .provider
            .get_account(&session.auth_token, &session.session_id)
            .await?;
        self.sessions.touch(session_id);
        // Re-read so the caller sees the refreshed access time
        let session = self.sessions.get(session_id).unwrap_or(session);
        Ok((info, session))
    }

    pub async fn download_attachment(
        &self,
        session_id: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentDownload, MailboxError> {
        let session = self.sessions.get(session_id)?;
        let download = self
            .provider
            .download_attachment(&session.auth_token, message_id, attachment_id)
            .await?;
        self.sessions.touch(session_id);
        Ok(download)
    }

    pub async fn list_domains(&self) -> Result<Collection<Domain>, MailboxError> {
        self.provider.list_domains().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use futures::TryStreamExt;

    use super::*;
    use crate::error::ErrorKind;
    use crate::session::fake::{FakeProvider, message};

    fn mailbox(provider: FakeProvider) -> (Mailbox, Arc<FakeProvider>) {
        let provider = Arc::new(provider);
        let store = SessionStore::new(Duration::from_secs(60 * 60 * 24));
        (Mailbox::new(store, provider.clone()), provider)
    }

    #[tokio::test]
    async fn it_fails_fast_on_unknown_sessions() {
        let (mailbox, provider) = mailbox(FakeProvider::default());

        let err = mailbox.list_messages("nope", 1).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionNotFound);
        let err = mailbox.get_message("nope", "m1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionNotFound);
        let err = mailbox.get_account_info("nope").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionNotFound);
        let err = mailbox
            .download_attachment("nope", "m1", "a1")
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::SessionNotFound);

        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn it_lists_messages_and_counts_unread() {
        let (mailbox, _) = mailbox(FakeProvider {
            messages: vec![message("m1", false), message("m2", true), message("m3", false)],
            ..Default::default()
        });
        let account = mailbox
            .create_account("foo@domain.com", "secret1")
            .await
            .unwrap();

        let page = mailbox.list_messages(&account.id, 1).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.unread(), 2);
    }

    #[tokio::test]
    async fn it_touches_the_session_on_successful_reads() {
        let (mailbox, _) = mailbox(FakeProvider::default());
        let account = mailbox
            .create_account("foo@domain.com", "secret1")
            .await
            .unwrap();

        let before = Utc::now();
        mailbox.list_messages(&account.id, 1).await.unwrap();
        let session = mailbox.sessions().get(&account.id).unwrap();
        assert!(session.last_accessed_at >= before);
    }

    #[tokio::test]
    async fn it_does_not_touch_on_failed_reads() {
        let (mailbox, _) = mailbox(FakeProvider {
            fail_reads: Some(ErrorKind::UpstreamFailure),
            ..Default::default()
        });
        let account = mailbox
            .create_account("foo@domain.com", "secret1")
            .await
            .unwrap();
        let before = mailbox.sessions().get(&account.id).unwrap().last_accessed_at;

        let err = mailbox.list_messages(&account.id, 1).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamFailure);
        let after = mailbox.sessions().get(&account.id).unwrap().last_accessed_at;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn it_streams_attachments() {
        let (mailbox, _) = mailbox(FakeProvider::default());
        let account = mailbox
            .create_account("foo@domain.com", "secret1")
            .await
            .unwrap();

        let download = mailbox
            .download_attachment(&account.id, "m1", "a1")
            .await
            .ok()
            .unwrap();
        let chunks: Vec<_> = download.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello world");
    }

    #[tokio::test]
    async fn it_forgets_deleted_accounts() {
        let (mailbox, _) = mailbox(FakeProvider::default());
        let account = mailbox
            .create_account("foo@domain.com", "secret1")
            .await
            .unwrap();

        mailbox.delete_account(&account.id).await.unwrap();

        let err = mailbox.list_messages(&account.id, 1).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionNotFound);
    }
}
