use crate::traits::{
    ChatDelta, ChatMessage, ChatProvider, ChatRequest, ProviderEvent, ProviderStream,
    ToolCallDelta, ToolDescriptor,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool<'a>>>,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest<'a> {
    id: &'a str,
    r#type: &'a str,
    function: OpenAIFunctionRequest<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionRequest<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAITool<'a> {
    r#type: &'a str,
    function: OpenAIToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<StreamToolCall>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

/// What one SSE line contributed to the stream.
#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Event(ProviderEvent),
    Finished(Option<ProviderEvent>),
}

/// Streaming chat client for any OpenAI-compatible `/chat/completions`
/// endpoint.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f64,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.7,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    fn convert_messages(messages: &[ChatMessage]) -> Vec<OpenAIMessage<'_>> {
        messages
            .iter()
            .map(|m| {
                let tool_calls = m.tool_calls.as_ref().map(|tool_calls| {
                    tool_calls
                        .iter()
                        .map(|tc| OpenAIToolCallRequest {
                            id: &tc.id,
                            r#type: "function",
                            function: OpenAIFunctionRequest {
                                name: &tc.name,
                                arguments: &tc.arguments,
                            },
                        })
                        .collect()
                });

                // Assistant turns that only carry tool calls are sent without content.
                let content = if m.content.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(m.content.as_str())
                };

                OpenAIMessage {
                    role: m.role.as_str(),
                    content,
                    tool_calls,
                    tool_call_id: m.tool_call_id.as_deref(),
                }
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolDescriptor]) -> Vec<OpenAITool<'_>> {
        tools
            .iter()
            .map(|t| OpenAITool {
                r#type: "function",
                function: OpenAIToolFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.input_schema,
                },
            })
            .collect()
    }

    fn parse_sse_line(line: &str) -> anyhow::Result<SseLine> {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            // Blank separators, comments and `event:` lines.
            return Ok(SseLine::Skip);
        };
        if data == "[DONE]" {
            return Ok(SseLine::Event(ProviderEvent::Done));
        }

        let response: StreamResponse = serde_json::from_str(data)
            .map_err(|e| anyhow::anyhow!("malformed stream chunk: {e}"))?;
        if let Some(error) = response.error {
            anyhow::bail!("OpenAI stream error: {}", error.message);
        }
        let Some(choice) = response.choices.into_iter().next() else {
            return Ok(SseLine::Skip);
        };

        let delta = ChatDelta {
            content: choice.delta.content.filter(|c| !c.is_empty()),
            tool_calls: choice
                .delta
                .tool_calls
                .into_iter()
                .map(|tc| {
                    let (name, arguments) = tc
                        .function
                        .map(|f| (f.name, f.arguments))
                        .unwrap_or_default();
                    ToolCallDelta {
                        index: tc.index,
                        id: tc.id,
                        name,
                        arguments,
                    }
                })
                .collect(),
        };
        let event = (delta.content.is_some() || !delta.tool_calls.is_empty())
            .then_some(ProviderEvent::Delta(delta));

        Ok(match choice.finish_reason {
            Some(_) => SseLine::Finished(event),
            None => event.map_or(SseLine::Skip, SseLine::Event),
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat_stream(&self, request: ChatRequest<'_>) -> anyhow::Result<ProviderStream> {
        let openai_request = OpenAIRequest {
            model: &self.model,
            messages: Self::convert_messages(request.messages),
            tools: request.tools.map(Self::convert_tools),
            temperature: self.temperature,
            stream: true,
        };

        debug!(model = %self.model, messages = request.messages.len(), "Opening chat stream");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&openai_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("OpenAI API error {}: {}", status, error_text));
        }

        let (tx, rx) = tokio::sync::mpsc::channel::<anyhow::Result<ProviderEvent>>(256);

        tokio::spawn(async move {
            use futures_util::StreamExt as _;
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut finished = false;

            loop {
                // Stop reading once the consumer drops the stream.
                let chunk_result = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Chat stream dropped, closing connection");
                        return;
                    }
                    next = stream.next() => match next {
                        Some(chunk_result) => chunk_result,
                        None => break,
                    },
                };
                let chunk = match chunk_result {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "Chat stream interrupted");
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw);

                    let outgoing = match Self::parse_sse_line(&line) {
                        Ok(SseLine::Skip) => continue,
                        Ok(SseLine::Event(event)) => Ok(event),
                        Ok(SseLine::Finished(event)) => {
                            finished = true;
                            match event {
                                Some(event) => Ok(event),
                                None => continue,
                            }
                        }
                        Err(e) => Err(e),
                    };
                    let is_terminal =
                        matches!(outgoing, Ok(ProviderEvent::Done) | Err(_));
                    if tx.send(outgoing).await.is_err() || is_terminal {
                        return;
                    }
                }
            }

            // Some compatible servers close without `[DONE]` after a finish reason.
            if finished {
                let _ = tx.send(Ok(ProviderEvent::Done)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ToolCall;
    use serde_json::json;

    #[test]
    fn text_chunk_becomes_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(
            OpenAIProvider::parse_sse_line(line).unwrap(),
            SseLine::Event(ProviderEvent::Delta(ChatDelta::text("Hel")))
        );
    }

    #[test]
    fn tool_call_fragments_keep_their_index() {
        let line = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"function":{"arguments":",\"b\":2}"}}]}}]}"#;
        let SseLine::Event(ProviderEvent::Delta(delta)) =
            OpenAIProvider::parse_sse_line(line).unwrap()
        else {
            panic!("expected a delta");
        };
        assert_eq!(
            delta.tool_calls,
            vec![ToolCallDelta {
                index: 1,
                id: None,
                name: None,
                arguments: Some(r#","b":2}"#.to_string()),
            }]
        );
    }

    #[test]
    fn done_marker_and_noise() {
        assert_eq!(
            OpenAIProvider::parse_sse_line("data: [DONE]\n").unwrap(),
            SseLine::Event(ProviderEvent::Done)
        );
        assert_eq!(OpenAIProvider::parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(OpenAIProvider::parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
    }

    #[test]
    fn finish_reason_is_reported() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(OpenAIProvider::parse_sse_line(line).unwrap(), SseLine::Finished(None));
    }

    #[test]
    fn error_payloads_fail() {
        let line = r#"data: {"error":{"message":"rate limited"}}"#;
        let err = OpenAIProvider::parse_sse_line(line).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert!(OpenAIProvider::parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn request_serializes_tool_history() {
        let messages = vec![
            ChatMessage::user("add"),
            ChatMessage::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: "c1".into(),
                    name: "calc__add".into(),
                    arguments: "{}".into(),
                }],
            ),
            ChatMessage::tool_result("c1", "3"),
        ];
        let tools = vec![ToolDescriptor {
            name: "calc__add".into(),
            description: "Adds".into(),
            input_schema: json!({"type": "object"}),
        }];
        let request = OpenAIRequest {
            model: "gpt-4o",
            messages: OpenAIProvider::convert_messages(&messages),
            tools: Some(OpenAIProvider::convert_tools(&tools)),
            temperature: 0.7,
            stream: true,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][1]["role"], "assistant");
        assert!(value["messages"][1].get("content").is_none());
        assert_eq!(value["messages"][1]["tool_calls"][0]["function"]["name"], "calc__add");
        assert_eq!(value["messages"][2]["tool_call_id"], "c1");
        assert_eq!(value["tools"][0]["function"]["parameters"]["type"], "object");
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_connection() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::time::{Duration, timeout};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Sends the SSE headers and then stalls without a body.
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                      transfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();

            timeout(Duration::from_secs(5), async {
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => continue,
                    }
                }
            })
            .await
            .is_ok()
        });

        let provider = OpenAIProvider::new("key").with_base_url(format!("http://{addr}"));
        let messages = vec![ChatMessage::user("hi")];
        let stream = provider
            .chat_stream(ChatRequest { messages: &messages, tools: None })
            .await
            .unwrap();
        drop(stream);

        assert!(server.await.unwrap(), "connection was still open after the stream was dropped");
    }
}
