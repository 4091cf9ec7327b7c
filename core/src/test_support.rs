//! Scripted collaborators shared by the unit tests.

use crate::traits::{
    CapabilityProvider, ChatDelta, ChatMessage, ChatProvider, ChatRequest, Embedder,
    ProviderEvent, ProviderStream, ToolCallDelta, ToolCallResult, ToolDescriptor,
};
use async_trait::async_trait;
use futures_util::stream;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Embeds text into a small deterministic vector. Texts registered through
/// [`MockEmbedder::with_vector`] get that exact vector; texts containing
/// `"fail"` error out.
#[derive(Default)]
pub struct MockEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    pub calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if text.contains("fail") {
            anyhow::bail!("embedding backend rejected '{text}'");
        }
        if let Some(vector) = self.vectors.get(text) {
            return Ok(vector.clone());
        }
        let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
        Ok(vec![text.len() as f32, vowels as f32, 1.0])
    }
}

pub enum Script {
    /// The stream opens and yields these items.
    Stream(Vec<anyhow::Result<ProviderEvent>>),
    /// Opening the stream fails.
    OpenError(String),
    /// The stream opens and never yields anything.
    Hang,
}

impl Script {
    pub fn text(text: &str) -> Self {
        Self::Stream(vec![
            Ok(ProviderEvent::Delta(ChatDelta::text(text))),
            Ok(ProviderEvent::Done),
        ])
    }

    pub fn tool_calls(calls: &[(&str, &str, &str)]) -> Self {
        let mut events: Vec<anyhow::Result<ProviderEvent>> = calls
            .iter()
            .enumerate()
            .map(|(index, (id, name, args))| {
                Ok(ProviderEvent::Delta(ChatDelta::tool_call(ToolCallDelta {
                    index,
                    id: Some(id.to_string()),
                    name: Some(name.to_string()),
                    arguments: Some(args.to_string()),
                })))
            })
            .collect();
        events.push(Ok(ProviderEvent::Done));
        Self::Stream(events)
    }

    pub fn broken(text: &str, error: &str) -> Self {
        Self::Stream(vec![
            Ok(ProviderEvent::Delta(ChatDelta::text(text))),
            Err(anyhow::anyhow!(error.to_string())),
        ])
    }
}

/// Replays one [`Script`] per `chat_stream` call and records what was sent.
#[derive(Default)]
pub struct ScriptedChat {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<(Vec<ChatMessage>, Vec<ToolDescriptor>)>>,
}

impl ScriptedChat {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, n: usize) -> (Vec<ChatMessage>, Vec<ToolDescriptor>) {
        self.requests.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat_stream(&self, request: ChatRequest<'_>) -> anyhow::Result<ProviderStream> {
        self.requests.lock().unwrap().push((
            request.messages.to_vec(),
            request.tools.map(<[_]>::to_vec).unwrap_or_default(),
        ));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::OpenError("script exhausted".into()));
        match script {
            Script::Stream(events) => Ok(Box::pin(stream::iter(events))),
            Script::OpenError(message) => Err(anyhow::anyhow!(message)),
            Script::Hang => Ok(Box::pin(stream::pending::<anyhow::Result<ProviderEvent>>())),
        }
    }
}

type Handler = Box<dyn Fn(&str, &Value) -> anyhow::Result<ToolCallResult> + Send + Sync>;

/// Capability provider with a fixed tool list and a pluggable call handler.
pub struct MockCapability {
    tools: Vec<ToolDescriptor>,
    handler: Handler,
    fail_init: bool,
    pub calls: Mutex<Vec<(String, Value)>>,
    pub closed: AtomicUsize,
}

impl MockCapability {
    pub fn new(tool_names: &[&str]) -> Self {
        Self {
            tools: tool_names
                .iter()
                .map(|name| ToolDescriptor {
                    name: name.to_string(),
                    description: format!("{name} tool"),
                    input_schema: json!({"type": "object"}),
                })
                .collect(),
            handler: Box::new(|name: &str, args: &Value| {
                Ok(ToolCallResult::success(format!("{name}:{args}")))
            }),
            fail_init: false,
            calls: Mutex::new(vec![]),
            closed: AtomicUsize::new(0),
        }
    }

    pub fn with_handler(
        mut self,
        handler: impl Fn(&str, &Value) -> anyhow::Result<ToolCallResult> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Box::new(handler);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn call_log(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CapabilityProvider for MockCapability {
    async fn init(&self) -> anyhow::Result<()> {
        if self.fail_init {
            anyhow::bail!("server binary not found");
        }
        Ok(())
    }

    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<ToolCallResult> {
        self.calls.lock().unwrap().push((name.to_string(), args.clone()));
        (self.handler)(name, &args)
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
