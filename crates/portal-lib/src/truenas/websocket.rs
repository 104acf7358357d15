// ============================
// crates/portal-lib/src/truenas/websocket.rs
// ============================
//! JSON-RPC 2.0 transport over the TrueNAS WebSocket endpoint.
//!
//! Every operation opens its own connection, logs in with the admin key,
//! performs its calls and closes again.
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::Message, Connector, MaybeTlsStream, WebSocketStream,
};
use truenas_passwd_common::{
    username_filter, PasswordUpdate, RpcError, RpcRequest, RpcResponse, UserRecord,
};
use zeroize::Zeroizing;

use super::AdminApi;
use crate::config::TrueNasSettings;
use crate::error::ApiError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// TrueNAS JSON-RPC client
pub struct WebSocketClient {
    url: String,
    api_key: Zeroizing<String>,
    verify_tls: bool,
    timeout: Duration,
    next_id: AtomicU64,
}

impl WebSocketClient {
    pub fn new(settings: &TrueNasSettings) -> Self {
        Self {
            url: settings.ws_url(),
            api_key: Zeroizing::new(settings.api_key().to_string()),
            verify_tls: settings.verify_tls,
            timeout: settings.timeout(),
            next_id: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn connector(&self) -> Result<Option<Connector>, ApiError> {
        if !self.url.starts_with("wss:") {
            return Ok(None);
        }
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!self.verify_tls)
            .danger_accept_invalid_hostnames(!self.verify_tls)
            .build()
            .map_err(|e| ApiError::Connectivity(format!("TLS setup failed: {e}")))?;
        Ok(Some(Connector::NativeTls(tls)))
    }

    /// Connect and log in with the admin key
    async fn open(&self) -> Result<RpcSession<'_>, ApiError> {
        let (ws, _) = tokio_tungstenite::connect_async_tls_with_config(
            self.url.as_str(),
            None,
            false,
            self.connector()?,
        )
        .await
        .map_err(|e| ApiError::Connectivity(e.to_string()))?;

        let mut session = RpcSession { ws, client: self };
        let accepted = session
            .call("auth.login_with_api_key", vec![json!(self.api_key.as_str())])
            .await?;
        if accepted != Value::Bool(true) {
            session.close().await;
            return Err(ApiError::Auth("API key rejected".to_string()));
        }
        Ok(session)
    }

    /// Bound a whole operation, connection and login included, by the timeout
    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| ApiError::Connectivity(format!("no reply within {:?}", self.timeout)))?
    }
}

/// One authenticated connection
struct RpcSession<'c> {
    ws: WsStream,
    client: &'c WebSocketClient,
}

impl RpcSession<'_> {
    async fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value, ApiError> {
        let id = self.client.next_id();
        let request = RpcRequest::new(id.clone(), method, params);
        let text = serde_json::to_string(&request)
            .map_err(|e| ApiError::Protocol(e.to_string()))?;
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ApiError::Connectivity(e.to_string()))?;

        loop {
            let frame = self
                .ws
                .next()
                .await
                .ok_or_else(|| ApiError::Connectivity("connection closed".to_string()))?
                .map_err(|e| ApiError::Connectivity(e.to_string()))?;

            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => {
                    return Err(ApiError::Connectivity("closed by server".to_string()));
                },
                _ => continue,
            };

            let response: RpcResponse = serde_json::from_str(text.as_str())
                .map_err(|e| ApiError::Protocol(format!("bad frame: {e}")))?;
            // Notifications and replies to other requests
            if !response.answers(&id) {
                continue;
            }
            if let Some(error) = response.error {
                return Err(rpc_error(error));
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }

    async fn query_user(&mut self, username: &str) -> Result<UserRecord, ApiError> {
        let result = self.call("user.query", vec![username_filter(username)]).await?;
        let users: Vec<UserRecord> = serde_json::from_value(result)
            .map_err(|e| ApiError::Protocol(format!("unexpected user.query reply: {e}")))?;
        users
            .into_iter()
            .find(|user| user.username == username)
            .ok_or_else(|| ApiError::NotFound(format!("user {username} not found")))
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::trace!(error = %e, "websocket close failed");
        }
    }
}

#[async_trait::async_trait]
impl AdminApi for WebSocketClient {
    async fn connect(&self) -> Result<(), ApiError> {
        self.bounded(async {
            let mut session = self.open().await?;
            let result = session.call("core.ping", Vec::new()).await.map(drop);
            session.close().await;
            result
        })
        .await
    }

    async fn query_user(&self, username: &str) -> Result<UserRecord, ApiError> {
        self.bounded(async {
            let mut session = self.open().await?;
            let result = session.query_user(username).await;
            session.close().await;
            result
        })
        .await
    }

    async fn set_password(&self, username: &str, new_password: &str) -> Result<(), ApiError> {
        let update = PasswordUpdate {
            password: new_password.to_string(),
        };
        let body = serde_json::to_value(&update).map_err(|e| ApiError::Protocol(e.to_string()))?;

        self.bounded(async {
            let mut session = self.open().await?;
            let result = match session.query_user(username).await {
                Ok(user) => session
                    .call("user.update", vec![json!(user.id), body])
                    .await
                    .map(|_| user.id),
                Err(e) => Err(e),
            };
            session.close().await;
            let id = result?;
            tracing::debug!(username, id, "password updated over JSON-RPC");
            Ok(())
        })
        .await
    }
}

/// Map a JSON-RPC error on its `errname`
fn rpc_error(error: RpcError) -> ApiError {
    let data = error.data.unwrap_or_default();
    let reason = data.reason.clone().unwrap_or_else(|| error.message.clone());
    let validation = validation_messages(&data.extra);

    match data.errname.as_deref() {
        Some("ENOENT") => ApiError::NotFound(reason),
        Some("EACCES" | "EPERM" | "ENOTAUTHENTICATED") => ApiError::Auth(reason),
        Some("EINVAL") => ApiError::Validation(validation.unwrap_or(reason)),
        _ => match validation {
            Some(messages) => ApiError::Validation(messages),
            None => ApiError::Protocol(format!("error {}: {reason}", error.code)),
        },
    }
}

/// Messages of `[attribute, message, errno]` validation triples
fn validation_messages(extra: &[Value]) -> Option<String> {
    let messages: Vec<&str> = extra
        .iter()
        .filter_map(|item| item.get(1).and_then(Value::as_str))
        .collect();
    (!messages.is_empty()).then(|| messages.join("; "))
}
