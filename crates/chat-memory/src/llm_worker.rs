//!
//! Streams model responses from an OpenAI-compatible chat-completions
//! endpoint. The serving layer hands it the session working set and gets
//! back plain text deltas, ready for SSE re-emission or WebSocket frames.
use futures_util::StreamExt;
use tracing::debug;
use serde::{Deserialize, Serialize};
use crate::memory::Record;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<ChatDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
struct ChatDelta {
    content: Option<String>,
}

pub struct LlmWorker {
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl LlmWorker {
    pub fn new(base_url: String, model: String, timeout_seconds: u64) -> Self {
        Self {
            base_url,
            model,
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_default(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn to_chat_messages(records: &[Record]) -> Vec<ChatMessage> {
        records.iter().map(|r| ChatMessage {
            role: r.role.clone(),
            content: r.content.clone(),
        }).collect()
    }

    /// Stream a completion for the given context, yielding content deltas.
    pub async fn stream_chat(
        &self,
        context: Vec<Record>,
        max_tokens: u32,
        temperature: f32,
    ) -> anyhow::Result<impl futures_util::Stream<Item = Result<String, anyhow::Error>>> {
        debug!("Streaming completion for {} context records", context.len());
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: Self::to_chat_messages(&context),
            max_tokens,
            temperature,
            stream: true,
        };
        let response = self.http_client
            .post(self.completions_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("LLM backend request failed: {}", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LLM backend returned {}: {}", status, body));
        }
        let byte_stream = response.bytes_stream();
        let delta_stream = async_stream::try_stream! {
            let mut buffer = String::new();
            futures_util::pin_mut!(byte_stream);
            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = chunk_result
                    .map_err(|e| anyhow::anyhow!("Stream read error: {}", e))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].trim().to_string();
                    buffer = buffer[newline_pos + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(data) = line.strip_prefix("data: ") {
                        if data == "[DONE]" {
                            return;
                        }
                        let parsed: StreamChunk = serde_json::from_str(data)
                            .map_err(|e| anyhow::anyhow!("Malformed stream chunk: {}", e))?;
                        let finished = parsed.choices.iter()
                            .any(|c| c.finish_reason.is_some());
                        let delta = parsed.choices.into_iter()
                            .filter_map(|c| c.delta.and_then(|d| d.content))
                            .collect::<String>();
                        if !delta.is_empty() {
                            yield delta;
                        }
                        if finished {
                            return;
                        }
                    }
                }
            }
        };
        Ok(delta_stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn chunk(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}},\"finish_reason\":null}}]}}\n\n",
            content
        )
    }

    #[tokio::test]
    async fn stream_chat_yields_content_deltas_in_order() {
        let mut server = mockito::Server::new_async().await;
        let body = format!("{}{}data: [DONE]\n\n", chunk("Hel"), chunk("lo"));
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let worker = LlmWorker::new(server.url(), "local-llm".to_string(), 5);
        let stream = worker
            .stream_chat(vec![Record::user("hi")], 100, 0.7)
            .await
            .unwrap();

        let deltas: Vec<String> = stream.map(|d| d.unwrap()).collect().await;
        assert_eq!(deltas, vec!["Hel", "lo"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn stream_chat_stops_at_finish_reason() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(
            "{}data: {{\"choices\":[{{\"delta\":{{\"content\":\"!\"}},\"finish_reason\":\"stop\"}}]}}\n\n{}",
            chunk("done"),
            chunk("ignored")
        );
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let worker = LlmWorker::new(server.url(), "local-llm".to_string(), 5);
        let stream = worker
            .stream_chat(vec![Record::user("hi")], 100, 0.7)
            .await
            .unwrap();

        let deltas: Vec<String> = stream.map(|d| d.unwrap()).collect().await;
        assert_eq!(deltas, vec!["done", "!"]);
    }

    #[tokio::test]
    async fn backend_error_status_surfaces_as_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let worker = LlmWorker::new(server.url(), "local-llm".to_string(), 5);
        let err = worker
            .stream_chat(vec![Record::user("hi")], 100, 0.7)
            .await
            .err()
            .unwrap();

        assert!(err.to_string().contains("503"));
    }
}
