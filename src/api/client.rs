use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{
    ChatMessage, Conversation, ConversationCreate, CreatedConversation, PendingProposals,
    PreferenceProposal, PreferencesSnapshot, ProposalDecision, StreamRequest, ToolCatalog,
    ToolDefinition, ToolRunRequest, ToolRunResult,
};
use crate::util::{endpoint_url, is_local_endpoint_url};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Everything the session core needs from the backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream>;
    async fn list_messages(&self, conversation_id: i64) -> Result<Vec<ChatMessage>>;
    async fn pending_proposals(&self, conversation_id: i64) -> Result<Vec<PreferenceProposal>>;
    async fn decide_proposal(&self, proposal_id: i64, decision: ProposalDecision) -> Result<()>;
    async fn preferences(&self, scope: &str) -> Result<PreferencesSnapshot>;
    async fn reset_preferences(&self, scope: &str) -> Result<()>;
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;
    async fn run_tool(&self, request: &ToolRunRequest) -> Result<ToolRunResult>;
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;
    async fn create_conversation(&self, title: Option<&str>) -> Result<i64>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.backend_url.trim().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        endpoint_url(&self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let request_url = self.url(path);
        let response = self
            .http
            .get(&request_url)
            .query(query)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;
        let response = ensure_success(response, &request_url).await?;
        response
            .json::<T>()
            .await
            .map_err(|error| anyhow!("unexpected response from '{request_url}': {error}"))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let request_url = self.url(path);
        let mut request = self.http.post(&request_url).query(query);
        if let Some(body) = body {
            if debug_payload_enabled() {
                if let Ok(payload) = serde_json::to_value(body) {
                    emit_debug_payload(&request_url, &payload);
                }
            }
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;
        ensure_success(response, &request_url).await
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream> {
        let response = match request {
            StreamRequest::Chat(body) => self.post("chat", &[], Some(body)).await?,
            StreamRequest::Regenerate(body) => self.post("regenerate", &[], Some(body)).await?,
        };

        let request_url = response.url().to_string();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url))
        });
        Ok(Box::pin(stream))
    }

    async fn list_messages(&self, conversation_id: i64) -> Result<Vec<ChatMessage>> {
        self.get_json(
            "messages",
            &[("conversation_id", conversation_id.to_string())],
        )
        .await
    }

    async fn pending_proposals(&self, conversation_id: i64) -> Result<Vec<PreferenceProposal>> {
        let body: PendingProposals = self
            .get_json(
                "preference-proposals",
                &[
                    ("conversation_id", conversation_id.to_string()),
                    ("status", "pending".to_string()),
                ],
            )
            .await?;
        Ok(body.proposals)
    }

    async fn decide_proposal(&self, proposal_id: i64, decision: ProposalDecision) -> Result<()> {
        let path = format!(
            "preference-proposals/{proposal_id}/{}",
            decision.path_segment()
        );
        self.post::<()>(&path, &[], None).await?;
        Ok(())
    }

    async fn preferences(&self, scope: &str) -> Result<PreferencesSnapshot> {
        self.get_json("preferences", &[("scope", scope.to_string())])
            .await
    }

    async fn reset_preferences(&self, scope: &str) -> Result<()> {
        self.post::<()>("preferences/reset", &[("scope", scope.to_string())], None)
            .await?;
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let catalog: ToolCatalog = self.get_json("tools", &[]).await?;
        Ok(catalog.into_tools())
    }

    async fn run_tool(&self, request: &ToolRunRequest) -> Result<ToolRunResult> {
        let response = self.post("tools/run", &[], Some(request)).await?;
        let request_url = response.url().to_string();
        response
            .json::<ToolRunResult>()
            .await
            .map_err(|error| anyhow!("unexpected response from '{request_url}': {error}"))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.get_json("conversations", &[]).await
    }

    async fn create_conversation(&self, title: Option<&str>) -> Result<i64> {
        let response = self
            .post("conversations", &[], Some(&ConversationCreate { title }))
            .await?;
        let created: CreatedConversation = response
            .json()
            .await
            .map_err(|error| anyhow!("unexpected create-conversation response: {error}"))?;
        Ok(created.id)
    }
}

/// Turns a non-2xx response into an error carrying the backend's `detail` text
/// when it sent one.
async fn ensure_success(response: reqwest::Response, request_url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body);
    Err(match detail {
        Some(detail) => anyhow!("backend '{request_url}' returned HTTP {status}: {detail}"),
        None => anyhow!("backend '{request_url}' returned HTTP {status}"),
    })
}

fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => match value.get("detail") {
            Some(serde_json::Value::String(detail)) => Some(detail.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(trimmed.to_string()),
        },
        Err(_) => Some(trimmed.to_string()),
    }
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local backend '{}': {}. Start the backend or update MYGPT_BACKEND_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach backend '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "backend '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("request to '{}' failed: {}", request_url, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_prefers_detail_field() {
        assert_eq!(
            error_detail(r#"{"detail":"Proposal is not pending"}"#).as_deref(),
            Some("Proposal is not pending")
        );
        assert_eq!(
            error_detail(r#"{"detail":[{"loc":["body"]}]}"#).as_deref(),
            Some(r#"[{"loc":["body"]}]"#)
        );
    }

    #[test]
    fn test_error_detail_falls_back_to_raw_body() {
        assert_eq!(error_detail("Internal Server Error").as_deref(), Some("Internal Server Error"));
        assert_eq!(error_detail("   "), None);
    }

    #[test]
    fn test_client_joins_endpoint_paths() {
        let config = Config {
            backend_url: "http://127.0.0.1:8000/".to_string(),
            ..Config::default()
        };
        let client = ApiClient::new(&config).expect("client should build");
        assert_eq!(client.url("messages"), "http://127.0.0.1:8000/messages");
        assert_eq!(
            client.url("preference-proposals/4/approve"),
            "http://127.0.0.1:8000/preference-proposals/4/approve"
        );
    }
}
