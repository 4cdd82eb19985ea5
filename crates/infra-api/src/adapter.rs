use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use mailshelter_domain::*;
use mailshelter_error::ShelterError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

pub struct ApiConfig {
    pub api_host: String,
    pub app_host: String,
    pub profile: Profile,
    pub timeout_secs: f64,
    pub max_retries: u32,
}

/// HTTP adapter of [`MailPort`]. One shared `reqwest::Client` carries the
/// profile headers on every request; safe for concurrent use by all workers.
pub struct ApiClient {
    api_host: String,
    app_host: String,
    max_retries: u32,
    client: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ShelterError> {
        let mut headers = HeaderMap::new();
        for (key, value) in config.profile.iter() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ShelterError::config(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ShelterError::config(format!("invalid value for '{key}': {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = Client::builder().default_headers(headers);
        if config.timeout_secs > 0.0 {
            builder = builder.timeout(Duration::from_secs_f64(config.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| ShelterError::config(format!("http client: {e}")))?;

        Ok(Self {
            api_host: config.api_host.trim_end_matches('/').to_string(),
            app_host: config.app_host.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client,
        })
    }

    /// GET with retry on transport errors and transient statuses (5xx, 429),
    /// doubling the backoff each attempt. Client errors are returned as-is.
    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, ShelterError> {
        let mut backoff = Duration::from_millis(500);
        let mut attempt = 0u32;
        loop {
            debug!(url, attempt, "GET");
            let result = self.client.get(url).query(query).send().await;
            let retryable = match &result {
                Ok(resp) => {
                    let status = resp.status();
                    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
                }
                Err(_) => true,
            };
            if !retryable || attempt >= self.max_retries {
                return result.map_err(|e| ShelterError::network(format!("GET {url}: {e}")));
            }
            match &result {
                Ok(resp) => warn!(url, status = %resp.status(), "retrying after transient status"),
                Err(e) => warn!(url, error = %e, "retrying after transport error"),
            }
            tokio::time::sleep(backoff).await;
            backoff *= 2;
            attempt += 1;
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ShelterError> {
        let resp = self.get_with_retry(url, query).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ShelterError::api(format!("GET {url}: status {status}")));
        }
        resp.json()
            .await
            .map_err(|e| ShelterError::api(format!("GET {url}: invalid json: {e}")))
    }
}

#[async_trait]
impl MailPort for ApiClient {
    async fn get_user(&self) -> Result<User, ShelterError> {
        let url = format!("{}/v1/users", self.api_host);
        let resp = self.get_json(&url, &[]).await?;
        parse_user(&resp["user"])
    }

    async fn get_inbox(&self, page: u32) -> Result<Inbox, ShelterError> {
        let url = format!("{}/v1/inbox", self.api_host);
        let query = [
            ("is_star", "0".to_string()),
            ("is_unread", "0".to_string()),
            ("page", page.to_string()),
        ];
        let resp = self.get_json(&url, &query).await?;

        let mails = resp["mails"]
            .as_array()
            .ok_or_else(|| ShelterError::api(format!("inbox page {page}: 'mails' missing")))?
            .iter()
            .map(|v| parse_mail(v, &self.app_host))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Inbox {
            page: resp["page"].as_u64().unwrap_or(page.into()) as u32,
            has_next_page: resp["has_next_page"].as_bool().unwrap_or(false),
            mails,
        })
    }

    async fn get_mail_detail(&self, mail: &Mail) -> Result<String, ShelterError> {
        let resp = self.get_with_retry(&mail.detail_url, &[]).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ShelterError::api(format!(
                "mail {}: detail fetch status {status}",
                mail.id
            )));
        }
        resp.text()
            .await
            .map_err(|e| ShelterError::network(format!("mail {}: {e}", mail.id)))
    }

    async fn get_asset(&self, url: &str) -> Result<Asset, ShelterError> {
        let resp = self.get_with_retry(url, &[]).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ShelterError::api(format!("GET {url}: status {status}")));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let data = resp
            .bytes()
            .await
            .map_err(|e| ShelterError::network(format!("GET {url}: {e}")))?
            .to_vec();
        Ok(Asset { content_type, data })
    }
}

fn parse_user(v: &Value) -> Result<User, ShelterError> {
    let id = v["id"]
        .as_str()
        .ok_or_else(|| ShelterError::api("user response: 'id' missing"))?;
    Ok(User {
        id: id.to_string(),
        nickname: v["nickname"].as_str().unwrap_or("").to_string(),
        gender: v["gender"].as_str().unwrap_or("").to_string(),
        country_code: v["country_code"].as_str().unwrap_or("").to_string(),
        prefecture_id: v["prefecture_id"].as_i64().unwrap_or(0),
        birthday: v["birthday"].as_str().unwrap_or("").to_string(),
        member_id: v["member_id"].as_i64().unwrap_or(0),
    })
}

fn parse_member(v: &Value) -> Member {
    Member {
        id: v["id"].as_i64().unwrap_or(0),
        name: v["name"].as_str().unwrap_or("").to_string(),
        image_url: v["image_url"].as_str().unwrap_or("").to_string(),
    }
}

/// The detail page is served by the app host, not the API host; the inbox
/// summary only carries the id.
fn parse_mail(v: &Value, app_host: &str) -> Result<Mail, ShelterError> {
    let id = v["id"]
        .as_str()
        .ok_or_else(|| ShelterError::api("mail summary: 'id' missing"))?;
    let received_raw = v["receive_datetime"]
        .as_str()
        .ok_or_else(|| ShelterError::api(format!("mail {id}: 'receive_datetime' missing")))?;
    Ok(Mail {
        member: parse_member(&v["member"]),
        id: id.to_string(),
        subject: v["subject"].as_str().unwrap_or("").to_string(),
        content: v["content"].as_str().unwrap_or("").to_string(),
        received: parse_received(received_raw)
            .ok_or_else(|| ShelterError::api(format!("mail {id}: bad timestamp '{received_raw}'")))?,
        detail_url: format!("{app_host}/mail/{id}"),
    })
}

/// The API emits ISO-8601 with an offset; older payloads use a space instead
/// of `T` and omit the colon in the offset.
fn parse_received(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    let normalized = s.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt);
    }
    DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%z").ok()
}
