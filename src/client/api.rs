//! HTTP client for the temp mail backend
//!
//! Idempotent reads go through a [`RequestCache`] so a manual refresh
//! landing next to a poll costs one request. Writes are never cached
//! and drop every cached read for the address they touch.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{ClientError, RequestCache};
use crate::api::public::admin::StatsResponse;
use crate::api::public::domains::DomainsResponse;
use crate::api::public::email::{
    DeleteResponse, GenerateResponse, InboxResponse, InfoResponse, MessageResponse,
};
use crate::api::public::{Envelope, ErrorEnvelope};
use crate::error::ErrorKind;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CacheMode {
    /// Serve a fresh entry if there is one, store the result
    Use,
    /// Always hit the network, store the result
    Refresh,
    /// Never read or store
    Bypass,
}

/// Outcome of probing whether an address still has a live session.
#[derive(Debug)]
pub enum AccountStatus {
    Valid(InfoResponse),
    /// The backend or Mail.tm no longer knows the account
    Invalid(ClientError),
    /// Could not tell, e.g. the backend is down
    Unreachable(ClientError),
}

pub struct TempMailClient {
    base_url: String,
    http: Client,
    cache: RequestCache<Value>,
}

impl TempMailClient {
    /// `base_url` is the API root, e.g. `http://127.0.0.1:2222/api`.
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            cache: RequestCache::new(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Addresses are case-insensitive on the backend, so paths and cache
    /// keys use the same lowercase form.
    fn email_path(address: &str) -> String {
        let address = address.trim().to_lowercase();
        format!("/email/{}", urlencoding::encode(&address))
    }

    /// Drop every cached read scoped to `address`.
    fn invalidate_address(&self, address: &str) {
        self.cache
            .invalidate_matching(&format!("{}/", Self::email_path(address)));
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let res = req.send().await.map_err(ClientError::from_transport)?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let err = error_from_body(status, &text);
            tracing::debug!("Backend request to {} failed: {} ({:?})", url, status, err.kind);
            return Err(err);
        }
        Ok(res)
    }

    async fn fetch_api<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        mode: CacheMode,
    ) -> Result<T, ClientError> {
        let url = self.url(endpoint);
        let key = RequestCache::<Value>::key(method.as_str(), &url);
        let cacheable = method == Method::GET && mode != CacheMode::Bypass;

        if cacheable && mode == CacheMode::Use {
            if let Some(data) = self.cache.get(&key) {
                tracing::debug!("Cache hit for {}", key);
                return decode(data);
            }
        }

        let res = self.send(method, &url, body).await?;
        let text = res.text().await.map_err(ClientError::from_transport)?;
        let envelope: Envelope<Value> = serde_json::from_str(&text).map_err(|e| {
            ClientError::new(ErrorKind::Unknown, format!("Invalid response: {}", e))
        })?;

        if cacheable {
            self.cache.set(&key, envelope.data.clone());
        }
        decode(envelope.data)
    }

    pub async fn generate_email(
        &self,
        address: &str,
        password: &str,
    ) -> Result<GenerateResponse, ClientError> {
        check_address(address)?;
        if password.is_empty() {
            return Err(ClientError::invalid_input("Password is required"));
        }

        let account: GenerateResponse = self
            .fetch_api(
                Method::POST,
                "/email/generate",
                Some(json!({ "address": address.trim(), "password": password })),
                CacheMode::Bypass,
            )
            .await?;
        self.invalidate_address(&account.address);
        Ok(account)
    }

    /// Fetch the first inbox page. `force_refresh` skips the cache but
    /// still stores the fresh result.
    pub async fn get_inbox(
        &self,
        address: &str,
        force_refresh: bool,
    ) -> Result<InboxResponse, ClientError> {
        self.get_inbox_page(address, 1, force_refresh).await
    }

    pub async fn get_inbox_page(
        &self,
        address: &str,
        page: u32,
        force_refresh: bool,
    ) -> Result<InboxResponse, ClientError> {
        check_address(address)?;
        let mut endpoint = format!("{}/inbox", Self::email_path(address));
        if page > 1 {
            endpoint.push_str(&format!("?page={}", page));
        }
        let mode = if force_refresh {
            CacheMode::Refresh
        } else {
            CacheMode::Use
        };
        self.fetch_api(Method::GET, &endpoint, None, mode).await
    }

    pub async fn get_message(
        &self,
        address: &str,
        message_id: &str,
    ) -> Result<MessageResponse, ClientError> {
        check_address(address)?;
        let endpoint = format!(
            "{}/message/{}",
            Self::email_path(address),
            urlencoding::encode(message_id)
        );
        self.fetch_api(Method::GET, &endpoint, None, CacheMode::Use)
            .await
    }

    pub async fn delete_address(&self, address: &str) -> Result<DeleteResponse, ClientError> {
        check_address(address)?;
        let result = self
            .fetch_api(
                Method::DELETE,
                &Self::email_path(address),
                None,
                CacheMode::Bypass,
            )
            .await;
        // Whatever happened upstream, cached reads for the address are stale
        self.invalidate_address(address);
        result
    }

    pub async fn get_account_info(&self, address: &str) -> Result<InfoResponse, ClientError> {
        check_address(address)?;
        let endpoint = format!("{}/info", Self::email_path(address));
        self.fetch_api(Method::GET, &endpoint, None, CacheMode::Use)
            .await
    }

    /// Probe the info endpoint, bypassing the cache.
    pub async fn check_account_status(&self, address: &str) -> AccountStatus {
        if let Err(err) = check_address(address) {
            return AccountStatus::Invalid(err);
        }
        let endpoint = format!("{}/info", Self::email_path(address));
        match self
            .fetch_api(Method::GET, &endpoint, None, CacheMode::Bypass)
            .await
        {
            Ok(info) => AccountStatus::Valid(info),
            Err(err) if err.kind.is_terminal() => AccountStatus::Invalid(err),
            Err(err) => AccountStatus::Unreachable(err),
        }
    }

    pub async fn get_domains(&self) -> Result<DomainsResponse, ClientError> {
        self.fetch_api(Method::GET, "/domains", None, CacheMode::Use)
            .await
    }

    /// Admin stats, authorized with the backend's admin token.
    pub async fn get_stats(&self, admin_token: &str) -> Result<StatsResponse, ClientError> {
        let url = self.url("/admin/stats");
        let res = self
            .http
            .get(&url)
            .bearer_auth(admin_token)
            .send()
            .await
            .map_err(ClientError::from_transport)?;
        let status = res.status();
        let text = res.text().await.map_err(ClientError::from_transport)?;
        if !status.is_success() {
            return Err(error_from_body(status, &text));
        }
        let envelope: Envelope<Value> = serde_json::from_str(&text).map_err(|e| {
            ClientError::new(ErrorKind::Unknown, format!("Invalid response: {}", e))
        })?;
        decode(envelope.data)
    }

    pub async fn download_attachment(
        &self,
        address: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Bytes, ClientError> {
        check_address(address)?;
        let url = self.url(&format!(
            "{}/message/{}/attachment/{}",
            Self::email_path(address),
            urlencoding::encode(message_id),
            urlencoding::encode(attachment_id)
        ));
        let res = self.send(Method::GET, &url, None).await?;
        res.bytes().await.map_err(ClientError::from_transport)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn check_address(address: &str) -> Result<(), ClientError> {
    if !address.trim().contains('@') {
        return Err(ClientError::invalid_input("Invalid email address"));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, ClientError> {
    serde_json::from_value(data)
        .map_err(|e| ClientError::new(ErrorKind::Unknown, format!("Invalid response: {}", e)))
}

/// Recover the error kind from the envelope `code`, falling back to the
/// HTTP status when the body is not an envelope.
fn error_from_body(status: StatusCode, text: &str) -> ClientError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(text).ok();
    let kind = envelope
        .as_ref()
        .and_then(|e| e.code)
        .unwrap_or_else(|| ErrorKind::from_status(status));
    let message = envelope
        .map(|e| e.error)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));
    ClientError::new(kind, message)
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;

    const INBOX_PATH: &str = r"^/api/email/foo(%40|@)domain\.com/inbox$";

    fn inbox_body(total: u64) -> String {
        json!({
            "success": true,
            "data": {
                "address": "foo@domain.com",
                "messages": [],
                "total": total,
                "unread": 0,
            }
        })
        .to_string()
    }

    fn client(server: &mockito::ServerGuard) -> TempMailClient {
        TempMailClient::new(&format!("{}/api", server.url())).unwrap()
    }

    #[tokio::test]
    async fn it_serves_repeated_reads_from_the_cache() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(INBOX_PATH.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(inbox_body(2))
            .expect(1)
            .create_async()
            .await;
        let client = client(&server);

        let first = client.get_inbox("foo@domain.com", false).await.unwrap();
        let second = client.get_inbox("foo@domain.com", false).await.unwrap();

        assert_eq!(first.total, 2);
        assert_eq!(second.total, 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_bypasses_the_cache_on_force_refresh() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(INBOX_PATH.to_string()))
            .with_status(200)
            .with_body(inbox_body(0))
            .expect(2)
            .create_async()
            .await;
        let client = client(&server);

        client.get_inbox("foo@domain.com", false).await.unwrap();
        client.get_inbox("foo@domain.com", true).await.unwrap();
        // The forced read was stored, so this one is a hit
        client.get_inbox("foo@domain.com", false).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_invalidates_cached_reads_on_delete() {
        let mut server = mockito::Server::new_async().await;
        let inbox = server
            .mock("GET", Matcher::Regex(INBOX_PATH.to_string()))
            .with_status(200)
            .with_body(inbox_body(0))
            .expect(2)
            .create_async()
            .await;
        let _delete = server
            .mock("DELETE", Matcher::Regex(r"^/api/email/foo(%40|@)domain\.com$".to_string()))
            .with_status(200)
            .with_body(
                json!({
                    "success": true,
                    "data": { "message": "Email account deleted successfully", "upstreamDeleted": true }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let client = client(&server);

        client.get_inbox("foo@domain.com", false).await.unwrap();
        let deleted = client.delete_address("foo@domain.com").await.unwrap();
        assert!(deleted.upstream_deleted);
        client.get_inbox("foo@domain.com", false).await.unwrap();

        inbox.assert_async().await;
    }

    #[tokio::test]
    async fn it_invalidates_cached_reads_on_delete_regardless_of_case() {
        let mut server = mockito::Server::new_async().await;
        let inbox = server
            .mock("GET", Matcher::Regex(INBOX_PATH.to_string()))
            .with_status(200)
            .with_body(inbox_body(0))
            .expect(2)
            .create_async()
            .await;
        let _delete = server
            .mock("DELETE", Matcher::Regex(r"^/api/email/foo(%40|@)domain\.com$".to_string()))
            .with_status(200)
            .with_body(
                json!({
                    "success": true,
                    "data": { "message": "Email account deleted successfully", "upstreamDeleted": true }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let client = client(&server);

        client.get_inbox("Foo@Domain.com", false).await.unwrap();
        client.delete_address("foo@domain.com").await.unwrap();
        client.get_inbox("Foo@Domain.com", false).await.unwrap();

        inbox.assert_async().await;
    }

    #[tokio::test]
    async fn it_reads_the_error_kind_from_the_envelope() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex(INBOX_PATH.to_string()))
            .with_status(404)
            .with_body(
                json!({
                    "success": false,
                    "error": "Email account not found. Please create an account first.",
                    "code": "session_not_found",
                })
                .to_string(),
            )
            .create_async()
            .await;
        let client = client(&server);

        let err = client.get_inbox("foo@domain.com", false).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionNotFound);
        assert!(err.message.contains("create an account"));
    }

    #[tokio::test]
    async fn it_falls_back_to_the_status_without_an_envelope() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex(INBOX_PATH.to_string()))
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;
        let client = client(&server);

        let err = client.get_inbox("foo@domain.com", false).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamFailure);
        assert_eq!(err.message, "HTTP error 502");
    }

    #[tokio::test]
    async fn it_reports_invalid_and_unreachable_accounts() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex(r"^/api/email/gone(%40|@)domain\.com/info$".to_string()))
            .with_status(404)
            .with_body(json!({ "success": false, "error": "gone", "code": "not_found" }).to_string())
            .create_async()
            .await;
        let client = client(&server);

        assert!(matches!(
            client.check_account_status("gone@domain.com").await,
            AccountStatus::Invalid(_)
        ));

        let down = TempMailClient::new("http://127.0.0.1:1/api").unwrap();
        assert!(matches!(
            down.check_account_status("foo@domain.com").await,
            AccountStatus::Unreachable(ClientError {
                kind: ErrorKind::UpstreamUnreachable,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn it_rejects_addresses_without_an_at_sign() {
        let client = TempMailClient::new("http://127.0.0.1:1/api").unwrap();
        let err = client.get_inbox("nope", false).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }
}
