//! Offline development provider.
//!
//! Vendor adapters implement [`tl_provider::Provider`] outside this
//! repository; the binary links one in at integration time. This fallback
//! keeps the full pipeline drivable without network credentials: it streams
//! a canned acknowledgement of the last user message.

use async_stream::stream;

use tl_domain::error::Result;
use tl_provider::{BoxStream, CompletionRequest, Provider, ProviderEvent};

pub struct DevProvider;

impl DevProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Provider for DevProvider {
    async fn stream(
        &self,
        req: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<ProviderEvent>>> {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == tl_domain::message::Role::User)
            .map(|m| m.text())
            .unwrap_or_default();
        let tool_count = req.tools.len();

        let reply = format!(
            "[dev provider] No model is configured; this is a canned reply. \
             I received your message ({} chars) and can see {tool_count} tools. \
             Wire a real provider to get answers.",
            last_user.len()
        );

        Ok(Box::pin(stream! {
            for chunk in reply.split_inclusive(' ') {
                yield Ok(ProviderEvent::TextDelta { text: chunk.to_string() });
            }
            yield Ok(ProviderEvent::Stop);
        }))
    }

    fn provider_id(&self) -> &str {
        "dev"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tl_domain::message::Message;

    #[tokio::test]
    async fn streams_text_then_stop() {
        let provider = DevProvider::new();
        let req = CompletionRequest {
            messages: vec![Message::user("hello")],
            ..Default::default()
        };
        let mut stream = provider.stream(&req).await.unwrap();
        let mut text = String::new();
        let mut stopped = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                ProviderEvent::TextDelta { text: t } => text.push_str(&t),
                ProviderEvent::Stop => {
                    stopped = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(stopped);
        assert!(text.contains("canned reply"));
    }
}
