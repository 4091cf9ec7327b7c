pub mod context;
pub mod history;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod stream;

pub use context::{DEFAULT_SYSTEM_PROMPT, augment_query};
pub use history::Conversation;
pub use orchestrator::{Augmentation, Orchestrator, OrchestratorConfig, QueryResponse, SkipReason};
pub use registry::ToolRouter;
pub use retry::RetryPolicy;
pub use stream::{AssembledTurn, AssemblerState, StreamAssembler};
