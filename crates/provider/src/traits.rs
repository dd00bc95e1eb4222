use std::pin::Pin;

use tl_domain::error::Result;
use tl_domain::message::Message;
use tl_domain::tool::ToolDefinition;

/// A boxed async stream, used for streaming completion responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// A provider-agnostic streaming completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: String,
    /// The system prompt, already assembled.
    pub system: String,
    /// Conversation messages (no system message; that travels separately).
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Events emitted while streaming one completion.
///
/// `Stop` closes the sequence; the engine relies on that.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A chunk of assistant text.
    TextDelta { text: String },
    /// A fully-assembled tool invocation.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// End of response.
    Stop,
    /// Stream-level failure.
    Error { message: String },
}

/// Trait every completion backend implements.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Open a streaming completion. The returned stream is finite and ends
    /// after `Stop` (or an error item).
    async fn stream(
        &self,
        req: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<ProviderEvent>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
