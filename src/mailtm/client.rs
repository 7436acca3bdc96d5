//! reqwest implementation of [`MailProvider`] against api.mail.tm

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use http::header;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{
    Account, AttachmentDownload, Collection, Domain, MailProvider, MailboxError, MessageDetail,
    MessageSummary, Token,
};

#[derive(Clone, Debug)]
pub struct MailTmClient {
    base_url: String,
    http: Client,
}

impl MailTmClient {
    /// Every request made by this client gives up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response, MailboxError> {
        let res = req.send().await.map_err(MailboxError::from_transport)?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            tracing::warn!("Mail.tm request failed: {} ({})", status, text);
            return Err(MailboxError::from_status(status, &text));
        }
        Ok(res)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, MailboxError> {
        let res = self.send(req).await?;
        let text = res.text().await.map_err(MailboxError::from_transport)?;
        serde_json::from_str(&text).map_err(|e| {
            MailboxError::new(
                crate::error::ErrorKind::Unknown,
                format!("Unexpected response from Mail.tm: {}", e),
            )
        })
    }
}

#[async_trait]
impl MailProvider for MailTmClient {
    async fn create_account(&self, address: &str, password: &str) -> Result<Account, MailboxError> {
        let req = self
            .http
            .post(self.url("/accounts"))
            .json(&json!({ "address": address, "password": password }));
        self.send_json(req).await
    }

    async fn issue_token(&self, address: &str, password: &str) -> Result<Token, MailboxError> {
        let req = self
            .http
            .post(self.url("/token"))
            .json(&json!({ "address": address, "password": password }));
        self.send_json(req).await
    }

    async fn list_messages(
        &self,
        token: &str,
        page: u32,
    ) -> Result<Collection<MessageSummary>, MailboxError> {
        let req = self
            .http
            .get(self.url("/messages"))
            .query(&[("page", page)])
            .bearer_auth(token);
        self.send_json(req).await
    }

    async fn get_message(&self, token: &str, message_id: &str) -> Result<MessageDetail, MailboxError> {
        let path = format!("/messages/{}", urlencoding::encode(message_id));
        let req = self.http.get(self.url(&path)).bearer_auth(token);
        self.send_json(req).await
    }

    async fn get_account(&self, token: &str, account_id: &str) -> Result<Account, MailboxError> {
        let path = format!("/accounts/{}", urlencoding::encode(account_id));
        let req = self.http.get(self.url(&path)).bearer_auth(token);
        self.send_json(req).await
    }

    async fn delete_account(&self, token: &str, account_id: &str) -> Result<(), MailboxError> {
        let path = format!("/accounts/{}", urlencoding::encode(account_id));
        let req = self.http.delete(self.url(&path)).bearer_auth(token);
        // Mail.tm answers 204 with no body
        self.send(req).await?;
        Ok(())
    }

    async fn download_attachment(
        &self,
        token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentDownload, MailboxError> {
        let path = format!(
            "/messages/{}/attachment/{}",
            urlencoding::encode(message_id),
            urlencoding::encode(attachment_id)
        );
        let req = self.http.get(self.url(&path)).bearer_auth(token);
        let res = self.send(req).await?;

        let header_str = |name: header::HeaderName| {
            res.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header_str(header::CONTENT_TYPE);
        let content_disposition = header_str(header::CONTENT_DISPOSITION);
        let content_length = res.content_length();

        let body = res
            .bytes_stream()
            .map_err(MailboxError::from_transport)
            .boxed();

        Ok(AttachmentDownload {
            content_type,
            content_disposition,
            content_length,
            body,
        })
    }

    async fn list_domains(&self) -> Result<Collection<Domain>, MailboxError> {
        let req = self.http.get(self.url("/domains"));
        self.send_json(req).await
    }
}
