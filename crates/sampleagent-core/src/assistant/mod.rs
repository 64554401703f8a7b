//! The remote assistant boundary.
//!
//! `Assistant` takes a prompt plus generation settings and returns free text
//! or an `AssistantError`. There is no retry: a failure is surfaced once and
//! the caller shows its fallback reply.

pub mod client;
pub mod error;
pub mod prompt;

use futures::future::BoxFuture;

pub use client::GeminiClient;
pub use error::AssistantError;
pub use prompt::{build_prompt, completion_request};

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

pub trait Assistant: Send + Sync {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String, AssistantError>>;
}
