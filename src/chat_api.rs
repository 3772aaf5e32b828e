use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{BackendVersion, ChatConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("chat request failed: {0}")]
    Network(String),
    #[error("Invalid response format from API: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub answer: String,
}

/// Anything that can turn one user message into one answer.
pub trait ChatTransport {
    fn send_chat_message(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<ChatReply, ChatError>> + Send;
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatRequest<'a> {
    V1 {
        message: &'a str,
        twin_version_id: &'a str,
        session_id: i64,
    },
    V2 {
        query: &'a str,
        twin_version_id: &'a str,
        chat_instance_id: i64,
    },
}

impl<'a> ChatRequest<'a> {
    fn build(config: &'a ChatConfig, text: &'a str) -> Self {
        match config.backend {
            BackendVersion::V1 | BackendVersion::Auto => ChatRequest::V1 {
                message: text,
                twin_version_id: &config.twin_version_id,
                session_id: config.session_id,
            },
            BackendVersion::V2 => ChatRequest::V2 {
                query: text,
                twin_version_id: &config.twin_version_id,
                chat_instance_id: config.session_id,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyBody {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiBody {
    openai_response: Option<OpenAiContent>,
}

#[derive(Debug, Deserialize)]
struct OpenAiContent {
    content: Option<String>,
}

/// The answer shapes the known backends produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatResponse {
    /// `{"response": "..."}`
    Legacy(String),
    /// `{"openai_response": {"content": "..."}}`
    OpenAi(String),
}

impl ChatResponse {
    pub fn answer(&self) -> &str {
        match self {
            ChatResponse::Legacy(text) | ChatResponse::OpenAi(text) => text,
        }
    }

    pub fn into_answer(self) -> String {
        match self {
            ChatResponse::Legacy(text) | ChatResponse::OpenAi(text) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseShape {
    Legacy,
    OpenAi,
}

impl ResponseShape {
    fn accepted_by(backend: BackendVersion) -> &'static [ResponseShape] {
        match backend {
            BackendVersion::V1 => &[ResponseShape::Legacy],
            BackendVersion::V2 => &[ResponseShape::OpenAi],
            BackendVersion::Auto => &[ResponseShape::Legacy, ResponseShape::OpenAi],
        }
    }

    fn decode(self, value: &Value) -> Option<ChatResponse> {
        let answer = match self {
            ResponseShape::Legacy => serde_json::from_value::<LegacyBody>(value.clone())
                .ok()?
                .response?,
            ResponseShape::OpenAi => serde_json::from_value::<OpenAiBody>(value.clone())
                .ok()?
                .openai_response?
                .content?,
        };
        // An empty answer is as useless as a missing one.
        if answer.is_empty() {
            return None;
        }
        Some(match self {
            ResponseShape::Legacy => ChatResponse::Legacy(answer),
            ResponseShape::OpenAi => ChatResponse::OpenAi(answer),
        })
    }
}

/// Picks the answer out of a chat endpoint body according to the configured
/// backend version.
pub fn decode_response(backend: BackendVersion, body: &str) -> Result<ChatResponse, ChatError> {
    if body.trim().is_empty() {
        return Err(ChatError::InvalidResponse("empty body".to_string()));
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ChatError::InvalidResponse(format!("body is not JSON: {}", e)))?;

    ResponseShape::accepted_by(backend)
        .iter()
        .find_map(|shape| shape.decode(&value))
        .ok_or_else(|| ChatError::InvalidResponse("answer field missing".to_string()))
}

#[derive(Clone)]
pub struct ChatClient {
    config: ChatConfig,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn with_config(config: ChatConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    pub fn with_http_client(config: ChatConfig, client: reqwest::Client) -> Self {
        ChatClient { config, client }
    }

    pub fn backend(&self) -> BackendVersion {
        self.config.backend
    }
}

impl ChatTransport for ChatClient {
    async fn send_chat_message(&self, text: &str) -> Result<ChatReply, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let payload = ChatRequest::build(&self.config, text);
        tracing::debug!(endpoint = %self.config.endpoint, payload = ?payload, "sending chat message");

        let response = self
            .client
            .post(&self.config.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                ChatError::Network(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), body = %body, "chat endpoint returned an error");
            return Err(ChatError::Network(format!(
                "Request failed with status code {}",
                status.as_u16()
            )));
        }

        let decoded = decode_response(self.config.backend, &body).map_err(|e| {
            tracing::error!(body = %body, "invalid response format");
            e
        })?;
        tracing::debug!(shape = ?decoded, "chat answer received");

        Ok(ChatReply {
            answer: decoded.into_answer(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{closed_port_url, serve_once};

    fn config(endpoint: String, backend: BackendVersion) -> ChatConfig {
        ChatConfig {
            endpoint,
            twin_version_id: "twin-7".to_string(),
            session_id: 12,
            backend,
        }
    }

    fn client(endpoint: String, backend: BackendVersion) -> ChatClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        ChatClient::with_http_client(config(endpoint, backend), http)
    }

    #[test]
    fn test_decode_legacy_shape() {
        let decoded = decode_response(BackendVersion::V1, r#"{"response":"Hi there"}"#).unwrap();
        assert_eq!(decoded, ChatResponse::Legacy("Hi there".to_string()));
    }

    #[test]
    fn test_decode_openai_shape() {
        let body = r#"{"openai_response":{"content":"From v2","role":"assistant"}}"#;
        let decoded = decode_response(BackendVersion::V2, body).unwrap();
        assert_eq!(decoded.answer(), "From v2");
    }

    #[test]
    fn test_version_adapter_rejects_other_shape() {
        let body = r#"{"openai_response":{"content":"From v2"}}"#;
        assert!(matches!(
            decode_response(BackendVersion::V1, body),
            Err(ChatError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_auto_accepts_both_shapes() {
        assert_eq!(
            decode_response(BackendVersion::Auto, r#"{"response":"a"}"#).unwrap(),
            ChatResponse::Legacy("a".to_string())
        );
        assert_eq!(
            decode_response(BackendVersion::Auto, r#"{"openai_response":{"content":"b"}}"#).unwrap(),
            ChatResponse::OpenAi("b".to_string())
        );
    }

    #[test]
    fn test_missing_null_or_empty_answer_is_invalid() {
        for body in [
            "",
            "null",
            "{}",
            r#"{"response":null}"#,
            r#"{"response":""}"#,
            r#"{"response":7}"#,
            "not json",
        ] {
            assert!(
                matches!(
                    decode_response(BackendVersion::V1, body),
                    Err(ChatError::InvalidResponse(_))
                ),
                "body {:?} should be invalid",
                body
            );
        }
    }

    #[test]
    fn test_v2_request_uses_query_fields() {
        let cfg = config("http://x".to_string(), BackendVersion::V2);
        let json = serde_json::to_value(ChatRequest::build(&cfg, "hello")).unwrap();
        assert_eq!(json["query"], "hello");
        assert_eq!(json["chat_instance_id"], 12);
        assert_eq!(json["twin_version_id"], "twin-7");
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn test_send_extracts_answer() {
        let (url, server) = serve_once(200, r#"{"response":"Echo: Hello"}"#).await;
        let reply = client(url, BackendVersion::V1)
            .send_chat_message("Hello")
            .await
            .unwrap();
        assert_eq!(reply.answer, "Echo: Hello");

        let request = server.await.unwrap();
        assert!(request.head.starts_with("POST "));
        assert_eq!(request.header("accept").as_deref(), Some("application/json"));
        let sent: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(sent["message"], "Hello");
        assert_eq!(sent["twin_version_id"], "twin-7");
        assert_eq!(sent["session_id"], 12);
    }

    #[tokio::test]
    async fn test_missing_field_on_200_is_invalid_response() {
        let (url, server) = serve_once(200, r#"{"status":"ok"}"#).await;
        let err = client(url, BackendVersion::V1)
            .send_chat_message("Hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidResponse(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_network_error() {
        let (url, server) = serve_once(500, r#"{"detail":"boom"}"#).await;
        let err = client(url, BackendVersion::V1)
            .send_chat_message("Hello")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ChatError::Network("Request failed with status code 500".to_string())
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let url = closed_port_url().await;
        let err = client(url, BackendVersion::V1)
            .send_chat_message("Hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));
    }

    #[tokio::test]
    async fn test_blank_text_sends_nothing() {
        let url = closed_port_url().await;
        let err = client(url, BackendVersion::V1)
            .send_chat_message("   \n")
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::EmptyMessage);
    }
}
