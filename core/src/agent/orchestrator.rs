use crate::agent::context::{DEFAULT_SYSTEM_PROMPT, augment_query};
use crate::agent::history::Conversation;
use crate::agent::registry::ToolRouter;
use crate::agent::retry::RetryPolicy;
use crate::agent::stream::{AssembledTurn, StreamAssembler};
use crate::error::{Error, Result};
use crate::retriever::Retriever;
use crate::traits::{
    CapabilityProvider, ChatMessage, ChatProvider, ChatRequest, ToolCall, ToolDescriptor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRIEVAL_LIMIT: usize = 5;
const DEFAULT_MAX_TOOL_ROUNDS: usize = 20;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub name: String,
    pub system_prompt: String,
    pub context: String,
    pub retry: RetryPolicy,
    /// Covers retrieval and the whole tool loop of one query.
    pub timeout: Duration,
    pub retrieval_limit: usize,
    pub max_tool_rounds: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            name: "strata".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            context: String::new(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            retrieval_limit: DEFAULT_RETRIEVAL_LIMIT,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyStore,
    NoMatches,
    Failed(String),
}

/// Whether retrieved knowledge was injected into the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Augmentation {
    Applied(usize),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub augmentation: Augmentation,
}

/// Drives one conversation: retrieval, prompt augmentation, the chat and
/// tool loop, and retries.
///
/// Queries take `&mut self`, so a single orchestrator handles one query at a
/// time. The retriever and router are shared and may back several
/// orchestrators running concurrently.
pub struct Orchestrator {
    chat: Arc<dyn ChatProvider>,
    retriever: Arc<Retriever>,
    router: Arc<ToolRouter>,
    history: Conversation,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        chat: Arc<dyn ChatProvider>,
        retriever: Arc<Retriever>,
        config: OrchestratorConfig,
    ) -> Self {
        let mut history = Conversation::with_system_prompt(&config.system_prompt);
        history.add_context(&config.context);
        Self {
            chat,
            retriever,
            router: Arc::new(ToolRouter::new()),
            history,
            config,
        }
    }

    pub fn with_router(mut self, router: Arc<ToolRouter>) -> Self {
        self.router = router;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn router(&self) -> &Arc<ToolRouter> {
        &self.router
    }

    pub async fn add_provider(
        &self,
        name: &str,
        provider: Arc<dyn CapabilityProvider>,
    ) -> Result<()> {
        self.router.register(name, provider).await
    }

    pub async fn remove_provider(&self, name: &str) -> Result<()> {
        self.router.unregister(name).await
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.router.provider_names()
    }

    pub async fn add_knowledge(&self, documents: &[String]) -> Result<usize> {
        self.retriever.add_documents(documents).await
    }

    pub fn history(&self) -> &[ChatMessage] {
        self.history.messages()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        info!("Conversation history cleared");
    }

    pub fn set_system_prompt(&mut self, prompt: &str) {
        self.config.system_prompt = prompt.to_string();
        self.history.set_system_prompt(prompt);
        info!("System prompt updated");
    }

    pub fn set_context(&mut self, context: &str) {
        self.config.context = context.to_string();
        self.history.add_context(context);
        info!("Context updated");
    }

    pub async fn query(&mut self, query: &str) -> Result<QueryResponse> {
        self.query_with_cancel(query, &CancellationToken::new()).await
    }

    /// Answers `query`. Cancelling `cancel` or hitting the configured timeout
    /// abandons in-flight network calls; history only gains messages from an
    /// attempt that completed.
    pub async fn query_with_cancel(
        &mut self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }
        info!(query, "Processing query");

        let timeout = self.config.timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Query cancelled");
                Err(Error::Cancelled)
            }
            outcome = tokio::time::timeout(timeout, self.run_query(query)) => {
                outcome.map_err(|_| Error::Timeout(timeout))?
            }
        }
    }

    async fn run_query(&mut self, query: &str) -> Result<QueryResponse> {
        let (chunks, augmentation) = self.retrieve_context(query).await;
        let prompt = augment_query(query, &chunks);
        let tools = self.router.catalogue().await;

        let this = &*self;
        let (turn, transcript) = self
            .config
            .retry
            .run(|attempt| this.run_attempt(&prompt, &tools, attempt))
            .await?;

        self.history.extend(transcript);
        info!("Query processed");

        Ok(QueryResponse {
            content: turn.content,
            tool_calls: turn.tool_calls,
            augmentation,
        })
    }

    async fn retrieve_context(&self, query: &str) -> (Vec<String>, Augmentation) {
        match self.retriever.retrieve(query, self.config.retrieval_limit).await {
            Ok(chunks) if chunks.is_empty() => {
                info!("No relevant documents found, skipping augmentation");
                (chunks, Augmentation::Skipped(SkipReason::NoMatches))
            }
            Ok(chunks) => {
                debug!(chunks = chunks.len(), "Augmenting query with retrieved documents");
                let count = chunks.len();
                (chunks, Augmentation::Applied(count))
            }
            Err(Error::EmptyStore) => {
                info!("Knowledge base is empty, skipping augmentation");
                (vec![], Augmentation::Skipped(SkipReason::EmptyStore))
            }
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without augmentation");
                (vec![], Augmentation::Skipped(SkipReason::Failed(e.to_string())))
            }
        }
    }

    /// One full attempt. Messages produced along the way are collected in a
    /// transcript that is committed to history only if the attempt succeeds.
    async fn run_attempt(
        &self,
        prompt: &str,
        tools: &[ToolDescriptor],
        attempt: usize,
    ) -> Result<(AssembledTurn, Vec<ChatMessage>)> {
        debug!(attempt, "Starting attempt");
        let mut transcript = vec![ChatMessage::user(prompt)];
        let mut turn = self.send(&transcript, tools).await?;
        transcript.push(turn.to_message());

        let mut rounds = 0;
        while turn.has_tool_calls() {
            rounds += 1;
            if rounds > self.config.max_tool_rounds {
                return Err(Error::ToolLoopLimit(self.config.max_tool_rounds));
            }

            debug!(calls = turn.tool_calls.len(), round = rounds, "Executing tool calls");
            // Sequential: each result is appended in emission order.
            for call in &turn.tool_calls {
                let result = self.router.dispatch(call).await;
                transcript.push(ChatMessage::tool_result(&call.id, result.to_message_text()));
            }

            turn = self.send(&transcript, tools).await?;
            transcript.push(turn.to_message());
        }

        Ok((turn, transcript))
    }

    async fn send(
        &self,
        transcript: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<AssembledTurn> {
        let messages: Vec<ChatMessage> = self
            .history
            .messages()
            .iter()
            .chain(transcript)
            .cloned()
            .collect();
        let request = ChatRequest {
            messages: &messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
        };

        let stream = self
            .chat
            .chat_stream(request)
            .await
            .map_err(Error::provider)?;
        StreamAssembler::new().assemble(stream).await
    }

    /// Closes every registered capability provider.
    pub async fn close(&self) -> Result<()> {
        self.router.close_all().await?;
        info!("All capability providers closed");
        Ok(())
    }
}
