//! mail.tm client: the disposable mailbox provider used for confirmation mail

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::email::{generate_password, generate_random_username};
use crate::error::MailApiError;
use crate::mailbox::{ConfirmationMessage, MailApi, MailboxHandle};

const MAILBOX_PASSWORD_LENGTH: usize = 16;

pub struct MailTmClient {
    api_base: String,
    http_client: reqwest::Client,
}

impl MailTmClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, MailApiError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T, MailApiError> {
        let status = response.status();
        if !status.is_success() {
            return Err(MailApiError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| MailApiError::Decode {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<T, MailApiError> {
        let mut request = self
            .http_client
            .get(self.url(path))
            .header(reqwest::header::ACCEPT, "application/ld+json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Self::decode(path, response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, MailApiError> {
        let response = self
            .http_client
            .post(self.url(path))
            .header(reqwest::header::ACCEPT, "application/ld+json")
            .json(body)
            .send()
            .await?;
        Self::decode(path, response).await
    }

    async fn active_domain(&self) -> Result<String, MailApiError> {
        let domains: HydraCollection<DomainRecord> = self.get("/domains", None).await?;
        domains
            .members
            .into_iter()
            .find(|d| d.is_active)
            .map(|d| d.domain)
            .ok_or(MailApiError::NoDomain)
    }

    async fn fetch_message(&self, token: &str, id: &str) -> Result<MessageRecord, MailApiError> {
        self.get(&format!("/messages/{}", id), Some(token)).await
    }
}

#[async_trait]
impl MailApi for MailTmClient {
    async fn create_account(&self) -> Result<MailboxHandle, MailApiError> {
        let domain = self.active_domain().await?;
        let credentials = Credentials {
            address: format!("{}@{}", generate_random_username(), domain),
            password: generate_password(MAILBOX_PASSWORD_LENGTH),
        };

        let account: AccountRecord = self.post("/accounts", &credentials).await?;
        debug!(address = %account.address, id = %account.id, "mail.tm account created");

        let token: TokenRecord = self.post("/token", &credentials).await?;

        Ok(MailboxHandle {
            id: account.id,
            address: account.address,
            password: credentials.password,
            token: token.token,
        })
    }

    async fn list_messages(&self, handle: &MailboxHandle) -> Result<Vec<ConfirmationMessage>, MailApiError> {
        let listing: HydraCollection<MessageSummary> = self.get("/messages?page=1", Some(&handle.token)).await?;

        // Only the first-arrived message is consumed, so only its body is fetched
        let Some(first) = earliest(listing.members) else {
            return Ok(Vec::new());
        };

        let full = self.fetch_message(&handle.token, &first.id).await?;
        Ok(vec![full.into_message()])
    }
}

fn earliest(summaries: Vec<MessageSummary>) -> Option<MessageSummary> {
    summaries.into_iter().min_by_key(|m| m.created_at)
}

#[derive(Debug, Serialize)]
struct Credentials {
    address: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct HydraCollection<T> {
    #[serde(rename = "hydra:member")]
    members: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DomainRecord {
    domain: String,
    #[serde(rename = "isActive")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct AccountRecord {
    id: String,
    address: String,
}

#[derive(Debug, Deserialize)]
struct TokenRecord {
    token: String,
}

#[derive(Debug, Deserialize)]
struct Sender {
    address: String,
}

#[derive(Debug, Deserialize)]
struct MessageSummary {
    id: String,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MessageRecord {
    id: String,
    from: Sender,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    html: Vec<String>,
}

impl MessageRecord {
    fn into_message(self) -> ConfirmationMessage {
        let body = if self.html.is_empty() {
            self.text.unwrap_or_default()
        } else {
            self.html.join("\n")
        };

        ConfirmationMessage {
            id: self.id,
            from: self.from.address,
            subject: self.subject,
            body,
        }
    }
}
