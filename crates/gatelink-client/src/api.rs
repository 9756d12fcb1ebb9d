//! Typed wrappers for common gateway methods.
//!
//! Each wrapper is a thin layer over [`GatewayClient::call`]: params are
//! serialized from a struct, the payload is decoded into a result type, and
//! fields this client does not model are kept in `extra`.

use gatelink_core::errors::{ClientError, Result};
use gatelink_core::ids::IdempotencyKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::client::GatewayClient;

/// Gateway method names.
pub mod methods {
    /// Send a chat message.
    pub const CHAT_SEND: &str = "chat.send";
    /// Fetch chat history.
    pub const CHAT_HISTORY: &str = "chat.history";
    /// Abort a running chat turn.
    pub const CHAT_ABORT: &str = "chat.abort";
    /// List sessions.
    pub const SESSIONS_LIST: &str = "sessions.list";
    /// Delete a session.
    pub const SESSIONS_DELETE: &str = "sessions.delete";
    /// Patch session settings.
    pub const SESSIONS_PATCH: &str = "sessions.patch";
    /// List agents.
    pub const AGENTS_LIST: &str = "agents.list";
    /// Read gateway config.
    pub const CONFIG_GET: &str = "config.get";
    /// Patch gateway config.
    pub const CONFIG_PATCH: &str = "config.patch";
    /// Config JSON schema.
    pub const CONFIG_SCHEMA: &str = "config.schema";
    /// List models.
    pub const MODELS_LIST: &str = "models.list";
    /// List cron jobs.
    pub const CRON_LIST: &str = "cron.list";
    /// Update a cron job.
    pub const CRON_UPDATE: &str = "cron.update";
    /// Remove a cron job.
    pub const CRON_REMOVE: &str = "cron.remove";
    /// Gateway status summary.
    pub const STATUS: &str = "status";
    /// Gateway health.
    pub const HEALTH: &str = "health";
    /// Connected clients.
    pub const SYSTEM_PRESENCE: &str = "system-presence";
}

// ─────────────────────────────────────────────────────────────────────────────
// Params
// ─────────────────────────────────────────────────────────────────────────────

/// Params of `chat.send`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams {
    /// Target session.
    pub session_key: String,
    /// Message text.
    pub message: String,
    /// Thinking level override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Attachments, passed through as-is.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
    /// Deduplicates retries of the same message.
    pub idempotency_key: IdempotencyKey,
}

impl ChatSendParams {
    /// Message to a session with a fresh idempotency key.
    pub fn new(session_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            message: message.into(),
            thinking: None,
            attachments: Vec::new(),
            idempotency_key: IdempotencyKey::new(),
        }
    }
}

/// Params of `sessions.list`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsListParams {
    /// Maximum number of sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Only sessions active within this many minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_minutes: Option<u32>,
    /// Include the global session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_global: Option<bool>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// Acknowledgement of `chat.send`. The reply itself arrives as `chat` events.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendAck {
    /// Run started for the message.
    pub run_id: String,
    /// Run status (e.g. `started`, `in_flight`).
    #[serde(default)]
    pub status: Option<String>,
}

/// Result of `chat.history`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    /// Session the history belongs to.
    #[serde(default)]
    pub session_key: Option<String>,
    /// Messages, oldest first.
    #[serde(default)]
    pub messages: Vec<Value>,
    /// Current thinking level.
    #[serde(default)]
    pub thinking_level: Option<String>,
}

/// One entry of `sessions.list`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session key.
    pub key: String,
    /// Display label.
    #[serde(default)]
    pub label: Option<String>,
    /// Last update (ms since epoch).
    #[serde(default)]
    pub updated_at: Option<u64>,
    /// Model in use.
    #[serde(default)]
    pub model: Option<String>,
    /// Other fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of `sessions.list`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SessionsList {
    /// Sessions, most recent first.
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
    /// Total count reported by the gateway.
    #[serde(default)]
    pub count: Option<u64>,
}

/// One entry of `agents.list`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AgentSummary {
    /// Agent id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Other fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of `agents.list`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsList {
    /// Default agent.
    #[serde(default)]
    pub default_id: Option<String>,
    /// All agents.
    #[serde(default)]
    pub agents: Vec<AgentSummary>,
}

/// Result of `config.get`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ConfigSnapshot {
    /// Parsed config.
    #[serde(default)]
    pub config: Value,
    /// Hash to pass back as `baseHash` when patching.
    #[serde(default)]
    pub hash: Option<String>,
    /// Other fields (path, raw text, validation issues).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of `models.list`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelChoice {
    /// Model id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Provider id.
    #[serde(default)]
    pub provider: Option<String>,
    /// Context window in tokens.
    #[serde(default)]
    pub context_window: Option<u64>,
    /// Whether the model supports reasoning.
    #[serde(default)]
    pub reasoning: Option<bool>,
}

/// Result of `models.list`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ModelsList {
    /// Available models.
    #[serde(default)]
    pub models: Vec<ModelChoice>,
}

/// Result of `cron.list`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CronList {
    /// Jobs as reported by the gateway.
    #[serde(default)]
    pub jobs: Vec<Value>,
}

fn to_params<P: Serialize>(params: &P) -> Result<Option<Value>> {
    serde_json::to_value(params)
        .map(Some)
        .map_err(|e| ClientError::Encoding(e.to_string()))
}

impl GatewayClient {
    /// `chat.send`
    pub async fn chat_send(&self, params: &ChatSendParams) -> Result<ChatSendAck> {
        self.call(methods::CHAT_SEND, to_params(params)?).await
    }

    /// `chat.history`
    pub async fn chat_history(&self, session_key: &str, limit: Option<u32>) -> Result<ChatHistory> {
        let mut params = json!({ "sessionKey": session_key });
        if let Some(limit) = limit {
            params["limit"] = json!(limit);
        }
        self.call(methods::CHAT_HISTORY, Some(params)).await
    }

    /// `chat.abort`
    pub async fn chat_abort(&self, session_key: &str, run_id: Option<&str>) -> Result<Value> {
        let mut params = json!({ "sessionKey": session_key });
        if let Some(run_id) = run_id {
            params["runId"] = json!(run_id);
        }
        self.call(methods::CHAT_ABORT, Some(params)).await
    }

    /// `sessions.list`
    pub async fn sessions_list(&self, params: &SessionsListParams) -> Result<SessionsList> {
        self.call(methods::SESSIONS_LIST, to_params(params)?).await
    }

    /// `sessions.delete`
    pub async fn sessions_delete(&self, key: &str) -> Result<Value> {
        self.call(methods::SESSIONS_DELETE, Some(json!({ "key": key })))
            .await
    }

    /// `sessions.patch`: `patch` fields are merged next to `key`.
    pub async fn sessions_patch(&self, key: &str, patch: Map<String, Value>) -> Result<Value> {
        let mut params = patch;
        let _ = params.insert("key".into(), json!(key));
        self.call(methods::SESSIONS_PATCH, Some(Value::Object(params)))
            .await
    }

    /// `agents.list`
    pub async fn agents_list(&self) -> Result<AgentsList> {
        self.call(methods::AGENTS_LIST, None).await
    }

    /// `config.get`
    pub async fn config_get(&self) -> Result<ConfigSnapshot> {
        self.call(methods::CONFIG_GET, None).await
    }

    /// `config.patch`: `raw` is a JSON5 merge patch; `base_hash` guards
    /// against concurrent edits.
    pub async fn config_patch(&self, raw: &str, base_hash: Option<&str>) -> Result<Value> {
        let mut params = json!({ "raw": raw });
        if let Some(hash) = base_hash {
            params["baseHash"] = json!(hash);
        }
        self.call(methods::CONFIG_PATCH, Some(params)).await
    }

    /// `config.schema`
    pub async fn config_schema(&self) -> Result<Value> {
        self.call(methods::CONFIG_SCHEMA, None).await
    }

    /// `models.list`
    pub async fn models_list(&self) -> Result<ModelsList> {
        self.call(methods::MODELS_LIST, None).await
    }

    /// `cron.list`
    pub async fn cron_list(&self, include_disabled: bool) -> Result<CronList> {
        self.call(
            methods::CRON_LIST,
            Some(json!({ "includeDisabled": include_disabled })),
        )
        .await
    }

    /// `cron.update`
    pub async fn cron_update(&self, id: &str, patch: Value) -> Result<Value> {
        self.call(methods::CRON_UPDATE, Some(json!({ "id": id, "patch": patch })))
            .await
    }

    /// `cron.remove`
    pub async fn cron_remove(&self, id: &str) -> Result<Value> {
        self.call(methods::CRON_REMOVE, Some(json!({ "id": id })))
            .await
    }

    /// `status`
    pub async fn status(&self) -> Result<Value> {
        self.call(methods::STATUS, None).await
    }

    /// `health`
    pub async fn health(&self) -> Result<Value> {
        self.call(methods::HEALTH, None).await
    }

    /// `system-presence`
    pub async fn system_presence(&self) -> Result<Vec<Value>> {
        self.call(methods::SYSTEM_PRESENCE, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_send_params_wire_shape() {
        let params = ChatSendParams::new("main", "hello");
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["sessionKey"], "main");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["idempotencyKey"], params.idempotency_key.as_str());
        assert!(value.get("thinking").is_none());
        assert!(value.get("attachments").is_none());
    }

    #[test]
    fn sessions_list_params_skip_unset() {
        let value = serde_json::to_value(SessionsListParams {
            limit: Some(20),
            ..SessionsListParams::default()
        })
        .unwrap();
        assert_eq!(value, json!({ "limit": 20 }));
    }

    #[test]
    fn session_summary_keeps_extra_fields() {
        let list: SessionsList = serde_json::from_value(json!({
            "count": 1,
            "sessions": [{ "key": "main", "updatedAt": 5, "totalTokens": 900 }]
        }))
        .unwrap();
        assert_eq!(list.count, Some(1));
        assert_eq!(list.sessions[0].key, "main");
        assert_eq!(list.sessions[0].updated_at, Some(5));
        assert_eq!(list.sessions[0].extra["totalTokens"], 900);
    }

    #[test]
    fn models_list_decodes() {
        let list: ModelsList = serde_json::from_value(json!({
            "models": [{ "id": "m1", "provider": "p", "contextWindow": 200000, "reasoning": true }]
        }))
        .unwrap();
        assert_eq!(list.models[0].context_window, Some(200_000));
        assert_eq!(list.models[0].reasoning, Some(true));
    }
}
