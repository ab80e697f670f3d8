//! OpenAI-compatible chat-completions provider with structured output and
//! real SSE streaming.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{
    ApiProvider, ChatMessage, GenerationConfig, LLMConfig, LLMProvider, ProviderInfo,
    ResponseSchema, TokenStream,
};

pub struct ExternalProvider {
    provider: ApiProvider,
    api_key: String,
    model: String,
    client: Client,
}

impl ExternalProvider {
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        tracing::info!(
            provider = ?config.provider,
            model = %config.model,
            "Creating ExternalProvider"
        );

        Ok(Self {
            provider: config.provider.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
        })
    }

    /// Parse a response body as JSON, returning a clear error if the server returned HTML
    /// (e.g. a gateway error page) instead of valid JSON.
    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body from {}: {}", endpoint, e))?;

        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "Endpoint {} returned HTML instead of JSON (HTTP {}). Response: {}",
                endpoint,
                status,
                preview
            ));
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!(
                "Failed to parse JSON from {} (HTTP {}): {}. Response body: {}",
                endpoint,
                status,
                e,
                preview
            )
        })
    }

    async fn post(&self, request: &serde_json::Value) -> Result<reqwest::Response> {
        let endpoint = self.provider.endpoint();
        let mut builder = self.client.post(&endpoint).json(request);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::error!(endpoint = %endpoint, "Request timed out");
                anyhow!("Request to {} timed out, check network connectivity", endpoint)
            } else if e.is_connect() {
                tracing::error!(endpoint = %endpoint, error = %e, "Connection failed");
                anyhow!("Failed to connect to {}: {}", endpoint, e)
            } else {
                tracing::error!(endpoint = %endpoint, error = %e, "Request failed");
                anyhow!("Request to {} failed: {}", endpoint, e)
            }
        })
    }
}

#[async_trait]
impl LLMProvider for ExternalProvider {
    async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        schema: &ResponseSchema,
        config: &GenerationConfig,
    ) -> Result<String> {
        let endpoint = self.provider.endpoint();
        tracing::debug!(
            endpoint = %endpoint,
            model = %self.model,
            schema = %schema.name,
            "Sending structured completion request"
        );

        let request = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "stream": false,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                }
            }
        });

        let response = self.post(&request).await?;
        let status = response.status();
        if !status.is_success() {
            let error = response.text().await?;
            tracing::error!(endpoint = %endpoint, status = %status, error = %error, "API returned error");
            return Err(anyhow!("API error ({}): {}", status, error));
        }

        let result: OpenAIResponse = Self::parse_json_response(response, &endpoint).await?;
        let message = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow!("No choices returned from API"))?;

        match (message.content, message.refusal) {
            (Some(content), _) => Ok(content),
            (None, Some(refusal)) => Err(anyhow!("Model refused structured output: {}", refusal)),
            (None, None) => Err(anyhow!("API returned an empty message")),
        }
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<TokenStream> {
        let request = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "stream": true
        });

        let response = self.post(&request).await?;
        let status = response.status();
        // If the server returned HTML instead of SSE, bail early
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !status.is_success() || content_type.contains("text/html") {
            let error = response.text().await?;
            let preview: String = error.chars().take(300).collect();
            return Err(anyhow!(
                "API streaming error (HTTP {}, content-type: {}): {}",
                status,
                content_type,
                preview
            ));
        }

        let (sender, receiver) = tokio::sync::mpsc::channel::<Result<String>>(256);
        let mut byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            // Raw bytes: a chunk boundary may fall inside a multi-byte character.
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(error = %e, "Stream chunk error");
                        let _ = sender.send(Err(anyhow!("Stream interrupted: {}", e))).await;
                        return;
                    }
                };

                buffer.extend_from_slice(&chunk);

                // Process complete SSE lines
                while let Some(line) = take_line(&mut buffer) {
                    match parse_sse_line(&line) {
                        SseLine::Content(content) => {
                            // Receiver gone means the consumer stopped listening.
                            if sender.send(Ok(content)).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Done => return,
                        SseLine::Skip => {}
                    }
                }
            }

            // Final event without a trailing newline
            if let SseLine::Content(content) = parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                let _ = sender.send(Ok(content)).await;
            }
        });

        Ok(TokenStream::new(receiver))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.provider.name().to_string(),
            model: self.model.clone(),
            supports_streaming: true,
            supports_structured_output: !matches!(self.provider, ApiProvider::Ollama),
        }
    }
}

/// Remove and decode the first complete line, newline included.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let line_end = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=line_end).collect();
    Some(String::from_utf8_lossy(&line).into_owned())
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Content(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(parsed) => match parsed["choices"][0]["delta"]["content"].as_str() {
            Some(content) if !content.is_empty() => SseLine::Content(content.to_string()),
            _ => SseLine::Skip,
        },
        Err(_) => SseLine::Skip,
    }
}

/// Response structures
#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> ExternalProvider {
        provider_at(format!("{}/v1/chat/completions", server.uri()))
    }

    fn provider_at(endpoint: String) -> ExternalProvider {
        let config = LLMConfig {
            provider: ApiProvider::Custom { endpoint },
            api_key: "sk-test".to_string(),
            ..Default::default()
        };
        ExternalProvider::new(&config).unwrap()
    }

    async fn drain(mut stream: TokenStream) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    /// Read one request: headers, then as many body bytes as content-length says.
    async fn read_request(socket: &mut TcpStream) {
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        line.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if request.len() >= head_end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Serve one SSE response whose body goes out in two separate writes.
    async fn serve_split_body(first: Vec<u8>, second: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&first).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            socket.write_all(&second).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    fn schema() -> ResponseSchema {
        ResponseSchema {
            name: "works_query".to_string(),
            schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_parse_sse_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Content("Hel".to_string()));
    }

    #[test]
    fn test_parse_sse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]\n"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
    }

    #[tokio::test]
    async fn test_structured_request_sends_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "stream": false,
                "response_format": {"type": "json_schema", "json_schema": {"name": "works_query", "strict": true}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"requestUrl\":null}"}}]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let content = provider
            .complete_structured(
                &[ChatMessage::user("hi")],
                &schema(),
                &GenerationConfig::from(&LLMConfig::default()),
            )
            .await
            .unwrap();
        assert_eq!(content, "{\"requestUrl\":null}");
    }

    #[tokio::test]
    async fn test_structured_refusal_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null, "refusal": "cannot help"}}]
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete_structured(
                &[ChatMessage::user("hi")],
                &schema(),
                &GenerationConfig::from(&LLMConfig::default()),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot help"));
    }

    #[tokio::test]
    async fn test_structured_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete_structured(
                &[ChatMessage::user("hi")],
                &schema(),
                &GenerationConfig::from(&LLMConfig::default()),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_chat_stream_yields_deltas() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"First.\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"---\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Second.\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = provider_for(&server)
            .chat_stream(
                &[ChatMessage::user("summarize")],
                &GenerationConfig::from(&LLMConfig::default()),
            )
            .await
            .unwrap();
        assert_eq!(drain(stream).await.unwrap(), "First.---Second.");
    }

    #[test]
    fn test_take_line_waits_for_newline() {
        let mut buffer = "data: Schrö".as_bytes().to_vec();
        buffer.pop();
        assert_eq!(take_line(&mut buffer), None);

        buffer.extend_from_slice(&[0xb6, b'\n', b'x']);
        assert_eq!(take_line(&mut buffer).as_deref(), Some("data: Schrö\n"));
        assert_eq!(buffer, b"x");
    }

    #[tokio::test]
    async fn test_chat_stream_keeps_characters_split_across_chunks() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Schrödinger\"}}]}\n\ndata: [DONE]\n\n";
        let bytes = body.as_bytes();
        // Split between the two bytes of the umlaut.
        let split = body.find('ö').unwrap() + 1;
        let endpoint = serve_split_body(bytes[..split].to_vec(), bytes[split..].to_vec()).await;

        let stream = provider_at(endpoint)
            .chat_stream(
                &[ChatMessage::user("summarize")],
                &GenerationConfig::from(&LLMConfig::default()),
            )
            .await
            .unwrap();
        assert_eq!(drain(stream).await.unwrap(), "Schrödinger");
    }

    #[tokio::test]
    async fn test_chat_stream_final_event_without_newline() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Only.\"}}]}";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = provider_for(&server)
            .chat_stream(
                &[ChatMessage::user("summarize")],
                &GenerationConfig::from(&LLMConfig::default()),
            )
            .await
            .unwrap();
        assert_eq!(drain(stream).await.unwrap(), "Only.");
    }

    #[tokio::test]
    async fn test_chat_stream_html_error_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(502).set_body_raw("<html>Bad gateway</html>", "text/html"),
            )
            .mount(&server)
            .await;

        let result = provider_for(&server)
            .chat_stream(
                &[ChatMessage::user("summarize")],
                &GenerationConfig::from(&LLMConfig::default()),
            )
            .await;
        assert!(result.is_err());
    }
}
