// ============================
// crates/portal-lib/src/truenas/rest.rs
// ============================
//! REST transport: `/api/v2.0` with a bearer token.
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;
use truenas_passwd_common::{PasswordUpdate, UserRecord};

use super::AdminApi;
use crate::config::TrueNasSettings;
use crate::error::ApiError;

/// Longest slice of a remote error body kept in messages
const BODY_EXCERPT: usize = 200;

/// TrueNAS REST client
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: String,
}

impl RestClient {
    pub fn new(settings: &TrueNasSettings) -> Result<Self, ApiError> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", settings.api_key()))
            .map_err(|_| ApiError::Auth("API key contains invalid characters".to_string()))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout())
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()
            .map_err(|e| ApiError::Connectivity(e.to_string()))?;

        Ok(Self {
            http,
            base: format!("{}/api/v2.0", settings.http_base()),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base)
    }
}

#[async_trait::async_trait]
impl AdminApi for RestClient {
    async fn connect(&self) -> Result<(), ApiError> {
        let response = self
            .http
            .get(self.url("/system/info"))
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        Ok(())
    }

    async fn query_user(&self, username: &str) -> Result<UserRecord, ApiError> {
        let response = self
            .http
            .get(self.url("/user"))
            .query(&[("username", username)])
            .send()
            .await
            .map_err(transport_error)?;
        let users: Vec<UserRecord> = check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        // The filter is advisory on older releases; match exactly here
        users
            .into_iter()
            .find(|user| user.username == username)
            .ok_or_else(|| ApiError::NotFound(format!("user {username} not found")))
    }

    async fn set_password(&self, username: &str, new_password: &str) -> Result<(), ApiError> {
        let user = self.query_user(username).await?;
        let body = PasswordUpdate {
            password: new_password.to_string(),
        };
        let response = self
            .http
            .put(self.url(&format!("/user/id/{}", user.id)))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        tracing::debug!(username, id = user.id, "password updated over REST");
        Ok(())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), &body))
}

fn status_error(status: u16, body: &str) -> ApiError {
    match StatusCode::from_u16(status) {
        Ok(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            ApiError::Auth(format!("HTTP {status}"))
        },
        Ok(StatusCode::NOT_FOUND) => ApiError::NotFound(format!("HTTP {status}")),
        Ok(StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY) => {
            ApiError::Validation(remote_message(body))
        },
        _ => ApiError::Protocol(format!("HTTP {status}: {}", excerpt(body))),
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_decode() {
        ApiError::Protocol(e.to_string())
    } else {
        ApiError::Connectivity(e.to_string())
    }
}

/// Human readable text of a TrueNAS error body
///
/// Validation failures arrive as `{"attr": [{"message": ..., "errno": ...}]}`.
fn remote_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return excerpt(body).to_string();
    };
    let mut messages = Vec::new();
    collect_messages(&value, &mut messages);
    if messages.is_empty() {
        excerpt(body).to_string()
    } else {
        messages.join("; ")
    }
}

fn collect_messages(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_messages(item, out)),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) => out.push(message.clone()),
            _ => map.values().for_each(|item| collect_messages(item, out)),
        },
        _ => {},
    }
}

fn excerpt(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(BODY_EXCERPT) {
        Some((cut, _)) => &body[..cut],
        None => body,
    }
}
