//! Completion-endpoint client layer: chat turn types, the [`LlmClient`]
//! contract, and an OpenAI-compatible HTTP implementation with bounded
//! retry.

mod openai;
pub mod retry;
mod types;

pub use openai::{OpenAiAuthScheme, OpenAiClient, OpenAiConfig};
pub use types::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    ToolCall, ToolDefinition,
};
