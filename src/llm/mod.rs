//! LLM 层：客户端抽象与实现（Anthropic / OpenAI 兼容 / Mock）

pub mod anthropic;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use message::{normalize_content, split_system, ChatMessage, Role};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError, RetryConfig, RetryingLlmClient, TokenStream, TokenUsage};
