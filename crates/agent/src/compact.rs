//! Context compaction — keeps the token estimate under budget by
//! collapsing or dropping the oldest part of the log.
//!
//! Strategies are pluggable and ordered; the engine applies them one at a
//! time until the estimate fits or the list is exhausted. The split point
//! is always pair-safe: a message containing a `tool_use` is never
//! separated from its `tool_result`, they move (or go) together.

use async_trait::async_trait;

use tl_domain::config::CompactionConfig;
use tl_domain::error::Result;
use tl_domain::message::Message;

/// Produces the summary text used by [`SummarizeStrategy`]. The real
/// implementation calls an LLM; tests substitute a canned one.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

#[async_trait]
pub trait CompactionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return a reduced log, or `None` when this strategy cannot shrink
    /// the input any further.
    async fn compact(
        &self,
        messages: &[Message],
        config: &CompactionConfig,
    ) -> Result<Option<Vec<Message>>>;
}

/// The index separating "old enough to compact" from "recent, keep".
///
/// Starts `keep_recent` from the end, then advances past any tool results
/// so a `tool_use` in the prefix always keeps its `tool_result` in the
/// prefix too.
pub fn pair_safe_split(messages: &[Message], keep_recent: usize) -> usize {
    let mut cut = messages.len().saturating_sub(keep_recent);
    while cut < messages.len() && messages[cut].has_tool_result() {
        cut += 1;
    }
    cut
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summarize
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replace the compactable prefix with a single summary message.
pub struct SummarizeStrategy {
    summarizer: std::sync::Arc<dyn Summarizer>,
}

impl SummarizeStrategy {
    pub fn new(summarizer: std::sync::Arc<dyn Summarizer>) -> Self {
        Self { summarizer }
    }
}

#[async_trait]
impl CompactionStrategy for SummarizeStrategy {
    fn name(&self) -> &'static str {
        "summarize"
    }

    async fn compact(
        &self,
        messages: &[Message],
        config: &CompactionConfig,
    ) -> Result<Option<Vec<Message>>> {
        let cut = pair_safe_split(messages, config.keep_recent);
        if cut == 0 {
            return Ok(None);
        }
        let summary = self.summarizer.summarize(&messages[..cut]).await?;
        tracing::info!(replaced = cut, summary_len = summary.len(), "log summarized");

        let mut compacted = Vec::with_capacity(messages.len() - cut + 1);
        compacted.push(Message::user(format!(
            "[Summary of {cut} earlier messages]\n{summary}"
        )));
        compacted.extend_from_slice(&messages[cut..]);
        Ok(Some(compacted))
    }
}

/// Summarizer backed by a completion provider.
pub struct ProviderSummarizer {
    provider: std::sync::Arc<dyn tl_provider::Provider>,
    model: String,
}

impl ProviderSummarizer {
    pub fn new(provider: std::sync::Arc<dyn tl_provider::Provider>, model: String) -> Self {
        Self { provider, model }
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        use futures_util::StreamExt;

        let mut conversation = String::new();
        for msg in messages {
            let text = msg.text();
            // Long tool results would dominate the prompt.
            let mut end = text.len().min(2000);
            while end > 0 && !text.is_char_boundary(end) {
                end -= 1;
            }
            conversation.push_str(&format!("{:?}: {}\n", msg.role, &text[..end]));
        }

        let prompt = format!(
            "Summarize the following conversation history concisely, preserving:\n\
             1. The current goal or plan being worked on\n\
             2. Key decisions made\n\
             3. Open questions or threads\n\
             4. Tool state (files touched, commands run, pending work)\n\n\
             Write in present tense. Omit pleasantries.\n\n\
             CONVERSATION:\n{conversation}"
        );

        let request = tl_provider::CompletionRequest {
            model: self.model.clone(),
            system: String::new(),
            messages: vec![Message::user(prompt)],
            tools: Vec::new(),
            max_tokens: 2000,
            temperature: 0.1,
        };

        let mut stream = self.provider.stream(&request).await?;
        let mut summary = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                tl_provider::ProviderEvent::TextDelta { text } => summary.push_str(&text),
                tl_provider::ProviderEvent::Stop => break,
                tl_provider::ProviderEvent::Error { message } => {
                    return Err(tl_domain::Error::Provider(message));
                }
                tl_provider::ProviderEvent::ToolUse { .. } => {}
            }
        }
        Ok(summary)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Truncate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drop the compactable prefix outright. The fallback when summarization
/// is unavailable or was not enough.
pub struct TruncateStrategy;

#[async_trait]
impl CompactionStrategy for TruncateStrategy {
    fn name(&self) -> &'static str {
        "truncate"
    }

    async fn compact(
        &self,
        messages: &[Message],
        config: &CompactionConfig,
    ) -> Result<Option<Vec<Message>>> {
        let cut = pair_safe_split(messages, config.keep_recent);
        if cut == 0 {
            return Ok(None);
        }
        tracing::info!(dropped = cut, "log truncated");
        Ok(Some(messages[cut..].to_vec()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
