use serde_json::Value;
use thiserror::Error;

use crate::config::SummaryProvider;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to send request to {provider}: {source}")]
    Request {
        provider: &'static str,
        source: reqwest::Error,
    },

    #[error("{provider} API error ({status}): {body}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to parse {provider} response: {source}")]
    Decode {
        provider: &'static str,
        source: reqwest::Error,
    },

    #[error("no content in {0} response")]
    NoContent(&'static str),
}

/// Shared HTTP client for chat-style LLM APIs.
pub struct LlmClient {
    provider: SummaryProvider,
    endpoint: String,
    pub model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

/// Parameters for a chat request.
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

impl LlmClient {
    pub fn new(provider: SummaryProvider, endpoint: String, model: String, api_key: Option<String>) -> Self {
        Self {
            provider,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn provider_name(&self) -> &'static str {
        match self.provider {
            SummaryProvider::OpenAi => "OpenAI",
            SummaryProvider::Ollama => "Ollama",
        }
    }

    /// Send a chat request and return the assistant message content.
    pub async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        let provider = self.provider_name();
        let messages = serde_json::json!([
            { "role": "system", "content": request.system_prompt },
            { "role": "user", "content": request.user_prompt }
        ]);

        let builder = match self.provider {
            SummaryProvider::OpenAi => {
                let body = serde_json::json!({
                    "model": self.model,
                    "messages": messages,
                });
                let builder = self
                    .client
                    .post(format!("{}/v1/chat/completions", self.endpoint))
                    .json(&body);
                match &self.api_key {
                    Some(key) => builder.bearer_auth(key),
                    None => builder,
                }
            }
            SummaryProvider::Ollama => {
                let body = serde_json::json!({
                    "model": self.model,
                    "messages": messages,
                    "stream": false,
                });
                self.client
                    .post(format!("{}/api/chat", self.endpoint))
                    .json(&body)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|source| LlmError::Request { provider, source })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                provider,
                status,
                body,
            });
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|source| LlmError::Decode { provider, source })?;

        let content = match self.provider {
            SummaryProvider::OpenAi => &response_json["choices"][0]["message"]["content"],
            SummaryProvider::Ollama => &response_json["message"]["content"],
        };

        content
            .as_str()
            .map(str::to_string)
            .ok_or(LlmError::NoContent(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            system_prompt: "system".to_string(),
            user_prompt: "user".to_string(),
        }
    }

    #[tokio::test]
    async fn test_openai_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "system"},
                    {"role": "user", "content": "user"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(
            SummaryProvider::OpenAi,
            format!("{}/", server.uri()),
            "gpt-4o-mini".to_string(),
            Some("sk-test".to_string()),
        );
        assert_eq!(client.chat(request()).await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_ollama_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "llama3", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "Ciao"}
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(SummaryProvider::Ollama, server.uri(), "llama3".to_string(), None);
        assert_eq!(client.chat(request()).await.unwrap(), "Ciao");
    }

    #[tokio::test]
    async fn test_request_body_uses_provider_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(
            SummaryProvider::OpenAi,
            format!("{}///", server.uri()),
            "gpt-4o-mini".to_string(),
            None,
        );
        client.chat(request()).await.unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("authorization").is_none());
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        let mut keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["messages", "model"]);
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = LlmClient::new(
            SummaryProvider::OpenAi,
            server.uri(),
            "gpt-4o-mini".to_string(),
            Some("sk-test".to_string()),
        );
        let err = client.chat(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { .. }));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_missing_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = LlmClient::new(
            SummaryProvider::OpenAi,
            server.uri(),
            "gpt-4o-mini".to_string(),
            Some("sk-test".to_string()),
        );
        assert!(matches!(
            client.chat(request()).await,
            Err(LlmError::NoContent("OpenAI"))
        ));
    }
}
