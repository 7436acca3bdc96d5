//! Public types for the email API
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mailbox::{CreatedAccount, ProviderAccount};
use crate::mailtm::{MessageDetail, MessageSummary};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub password: String,
}

/// Returned once on creation; the only response that carries the token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub id: String,
    pub address: String,
    pub token: String,
    pub quota: u64,
}

impl From<CreatedAccount> for GenerateResponse {
    fn from(account: CreatedAccount) -> Self {
        Self {
            id: account.id,
            address: account.address,
            token: account.token,
            quota: account.quota,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub page: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboxResponse {
    pub address: String,
    pub messages: Vec<MessageSummary>,
    pub total: u64,
    pub unread: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub address: String,
    pub message: MessageDetail,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub message: String,
    /// False when the provider could not be reached; the local session
    /// is gone regardless.
    pub upstream_deleted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub address: String,
    pub info: ProviderAccount,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}
