use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ mentions_quota, ChatClient, CompletionError };
use crate::llm::LlmConfig;

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    n: u32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

impl OpenAIChatClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self, CompletionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                CompletionError::generic(format!("Invalid API key format: {}", e))
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| CompletionError::generic(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, model, base_url })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        Self::new(config.api_key_or_placeholder(), config.model_or_default(), config.base_url_or_default())
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }
}

fn classify_transport(e: reqwest::Error) -> CompletionError {
    if e.is_timeout() || e.is_connect() {
        CompletionError::transient(format!("Network error: {}", e))
    } else {
        CompletionError::generic(format!("Request error: {}", e))
    }
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> CompletionError {
    let message = format!("Provider error {}: {}", status, body);
    if mentions_quota(body) {
        CompletionError::quota_exceeded(message)
    } else if status.is_server_error() {
        CompletionError::transient(message)
    } else {
        CompletionError::generic(message)
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError> {
        let req = OpenAIChatRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage { role: "system".to_string(), content: system.to_string() },
                OpenAIMessage { role: "user".to_string(), content: prompt.to_string() }
            ],
            n: 1,
        };

        let resp = self.http.post(self.endpoint()).json(&req).send().await.map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Completion request rejected with {}", status);
            return Err(classify_status(status, &body));
        }

        let body = resp
            .json::<OpenAIResponse>().await
            .map_err(|e| CompletionError::generic(format!("Malformed completion response: {}", e)))?;

        let content = body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::generic("No response from completion API"))?;

        debug!("Completion returned {} chars from {}", content.len(), self.model);
        Ok(content)
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::CompletionErrorKind;
    use wiremock::matchers::{ body_partial_json, header, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn client(server: &MockServer) -> OpenAIChatClient {
        OpenAIChatClient::from_config(
            &(LlmConfig {
                api_key: Some("sk-test".into()),
                completion_model: Some("gpt-4o".into()),
                base_url: Some(format!("{}/v1", server.uri())),
            })
        ).unwrap()
    }

    #[tokio::test]
    async fn sends_system_and_user_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(
                body_partial_json(
                    serde_json::json!({
                        "model": "gpt-4o",
                        "n": 1,
                        "messages": [
                            { "role": "system", "content": "persona" },
                            { "role": "user", "content": "question" }
                        ]
                    })
                )
            )
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    serde_json::json!({
                        "choices": [{ "message": { "role": "assistant", "content": "answer" } }]
                    })
                )
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server).complete("persona", "question").await.unwrap();
        assert_eq!(text, "answer");
    }

    #[tokio::test]
    async fn budget_marker_is_quota_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(402).set_body_string(
                    "{\"error\":{\"message\":\"FREE_CLOUD_BUDGET_EXCEEDED\"}}"
                )
            )
            .mount(&server)
            .await;

        let err = client(&server).complete("s", "p").await.unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::QuotaExceeded);
        assert!(err.message.contains("FREE_CLOUD_BUDGET_EXCEEDED"));
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server).complete("s", "p").await.unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::Transient);
    }

    #[tokio::test]
    async fn client_errors_and_empty_choices_are_generic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = client(&server).complete("s", "p").await.unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::Generic);

        let rejecting = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&rejecting)
            .await;

        let err = client(&rejecting).complete("s", "p").await.unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::Generic);
        assert!(err.message.contains("401"));
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        let config = LlmConfig {
            api_key: None,
            completion_model: None,
            base_url: Some("http://127.0.0.1:9".into()),
        };
        let err = OpenAIChatClient::from_config(&config).unwrap().complete("s", "p").await.unwrap_err();

        assert_eq!(err.kind, CompletionErrorKind::Transient);
    }
}
