pub mod anthropic;
pub mod chat_logger;
pub mod executor;
pub mod github;
pub mod http;
pub mod llm;
pub mod openai;
pub mod planner;
pub mod repo;
pub mod retrieval;
pub mod telemetry;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAIAdapter;
