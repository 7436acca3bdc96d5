//! Mail.tm disposable mailbox provider

mod client;
mod error;
mod models;

pub use client::MailTmClient;
pub use error::MailboxError;
pub use models::*;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Attachment body streamed straight from the provider.
pub struct AttachmentDownload {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, MailboxError>>,
}

/// The provider REST contract this service consumes.
///
/// Implementations never surface raw transport errors: every failure is
/// a classified [`MailboxError`].
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn create_account(&self, address: &str, password: &str) -> Result<Account, MailboxError>;

    async fn issue_token(&self, address: &str, password: &str) -> Result<Token, MailboxError>;

    async fn list_messages(
        &self,
        token: &str,
        page: u32,
    ) -> Result<Collection<MessageSummary>, MailboxError>;

    async fn get_message(&self, token: &str, message_id: &str) -> Result<MessageDetail, MailboxError>;

    async fn get_account(&self, token: &str, account_id: &str) -> Result<Account, MailboxError>;

    async fn delete_account(&self, token: &str, account_id: &str) -> Result<(), MailboxError>;

    async fn download_attachment(
        &self,
        token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentDownload, MailboxError>;

    async fn list_domains(&self) -> Result<Collection<Domain>, MailboxError>;
}
