//! WebhookAgent - HTTP implementation of the agent endpoint.
//!
//! Each user message is POSTed as JSON to a single webhook URL. The response
//! body is returned undecoded beyond JSON; its shape is interpreted by the
//! message store. Only a failed request or a non-2xx status is an error: a
//! 2xx body that is empty or not JSON comes back as `Value::Null`, which
//! renders as an empty reply.
//!
//! Configuration priority: config.toml `[agent]` section > `FANYA_AGENT_URL`
//! / `FANYA_AGENT_TOKEN` environment variables.

use async_trait::async_trait;
use fanya_core::agent::{AgentEndpoint, AgentRequest};
use fanya_core::config::AgentConfig;
use fanya_core::error::{FanyaError, Result};
use reqwest::Client;
use serde_json::Value;
use std::env;
use std::time::Duration;

const OPERATION: &str = "agent call";

#[derive(Clone)]
pub struct WebhookAgent {
    client: Client,
    url: String,
    auth_token: Option<String>,
    timeout: Option<Duration>,
}

impl WebhookAgent {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            auth_token: None,
            timeout: None,
        }
    }

    /// Builds the agent from the `[agent]` config section.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| FanyaError::config("agent.url is not set"))?;

        let mut agent = Self::new(url);
        agent.auth_token = config.auth_token.clone();
        agent.timeout = config.timeout_secs.map(Duration::from_secs);
        Ok(agent)
    }

    /// Loads the URL and token from `FANYA_AGENT_URL` and `FANYA_AGENT_TOKEN`.
    pub fn try_from_env() -> Result<Self> {
        let url = env::var("FANYA_AGENT_URL")
            .map_err(|_| FanyaError::config("FANYA_AGENT_URL not found in environment variables"))?;
        let mut agent = Self::new(url);
        agent.auth_token = env::var("FANYA_AGENT_TOKEN").ok();
        Ok(agent)
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_request(&self, request: &AgentRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(token) = &self.auth_token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

#[async_trait]
impl AgentEndpoint for WebhookAgent {
    async fn send(&self, request: &AgentRequest) -> Result<Value> {
        tracing::debug!(
            "[WebhookAgent] POST {} for session {}",
            self.url,
            request.session_id
        );

        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(|e| FanyaError::transport(OPERATION, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!("[WebhookAgent] {} returned {}", self.url, status);
            return Err(FanyaError::transport(
                OPERATION,
                format!("agent returned {}: {}", status, error_text),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FanyaError::transport(OPERATION, format!("reading body failed: {}", e)))?;
        Ok(decode_body(&body))
    }
}

fn decode_body(body: &str) -> Value {
    if body.trim().is_empty() {
        tracing::debug!("[WebhookAgent] Empty response body");
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|e| {
        tracing::warn!("[WebhookAgent] Response body is not JSON: {}", e);
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers a single request with `response` and returns the webhook URL.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                if request_complete(&received) {
                    break;
                }
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });
        format!("http://{}/webhook", addr)
    }

    fn request_complete(received: &[u8]) -> bool {
        let text = String::from_utf8_lossy(received);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        received.len() >= header_end + 4 + content_length
    }

    fn request() -> AgentRequest {
        AgentRequest::new("hello", "s-1", "u-1", &[]).unwrap()
    }

    #[test]
    fn test_request_carries_json_body_and_bearer() {
        let agent = WebhookAgent::new("https://agent.example/webhook")
            .with_auth_token("secret")
            .with_timeout(Duration::from_secs(5));
        let built = agent.build_request(&request()).build().unwrap();

        assert_eq!(built.method(), reqwest::Method::POST);
        assert_eq!(built.url().as_str(), "https://agent.example/webhook");
        assert_eq!(
            built.headers().get("Authorization").unwrap(),
            "Bearer secret"
        );
        assert_eq!(built.timeout(), Some(&Duration::from_secs(5)));

        let body = built.body().and_then(|b| b.as_bytes()).unwrap();
        let decoded: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(
            decoded,
            json!({"chatInput": "hello", "session_id": "s-1", "user_id": "u-1"})
        );
    }

    #[test]
    fn test_no_auth_header_without_token() {
        let agent = WebhookAgent::new("https://agent.example/webhook");
        let built = agent.build_request(&request()).build().unwrap();
        assert!(built.headers().get("Authorization").is_none());
        assert!(built.timeout().is_none());
    }

    #[test]
    fn test_from_config_requires_url() {
        let err = WebhookAgent::from_config(&AgentConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, FanyaError::Config(_)));

        let config = AgentConfig {
            url: Some("http://localhost:5678/webhook/chat".to_string()),
            auth_token: Some("t".to_string()),
            timeout_secs: Some(30),
        };
        let agent = WebhookAgent::from_config(&config).unwrap();
        assert_eq!(agent.url(), "http://localhost:5678/webhook/chat");
        assert_eq!(agent.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_decode_body_tolerates_empty_and_non_json() {
        assert_eq!(decode_body(""), Value::Null);
        assert_eq!(decode_body("  \n"), Value::Null);
        assert_eq!(decode_body("Workflow was started"), Value::Null);
        assert_eq!(decode_body("[]"), json!([]));
    }

    #[tokio::test]
    async fn test_empty_success_body_is_an_empty_reply() {
        let url = serve_once(concat!(
            "HTTP/1.1 200 OK\r\n",
            "Content-Length: 0\r\n",
            "Connection: close\r\n\r\n",
        ))
        .await;
        let body = WebhookAgent::new(url).send(&request()).await.unwrap();
        assert_eq!(body, Value::Null);
        assert_eq!(
            fanya_core::message::parse_agent_reply(&body),
            fanya_core::message::payload::REPLY_EMPTY
        );
    }

    #[tokio::test]
    async fn test_success_body_is_decoded() {
        let url = serve_once(concat!(
            "HTTP/1.1 200 OK\r\n",
            "Content-Type: application/json\r\n",
            "Content-Length: 2\r\n",
            "Connection: close\r\n\r\n[]",
        ))
        .await;
        let body = WebhookAgent::new(url).send(&request()).await.unwrap();
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let url = serve_once(concat!(
            "HTTP/1.1 500 Internal Server Error\r\n",
            "Content-Length: 4\r\n",
            "Connection: close\r\n\r\nboom",
        ))
        .await;
        let err = WebhookAgent::new(url).send(&request()).await.unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let agent = WebhookAgent::new("http://127.0.0.1:9/webhook")
            .with_timeout(Duration::from_secs(2));
        let err = agent.send(&request()).await.unwrap_err();
        assert!(err.is_transport());
    }
}
