//! A deterministic [`Provider`] for tests.
//!
//! Each call to [`Provider::stream`] pops the next script from a queue and
//! replays it. Scripts can emit events, fail mid-stream, refuse the
//! connection, or hang forever (for cancellation tests).

use std::collections::VecDeque;

use parking_lot::Mutex;

use tl_domain::error::{Error, Result};

use crate::traits::{BoxStream, CompletionRequest, Provider, ProviderEvent};

/// One step of a scripted response.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Event(ProviderEvent),
    /// Yield a stream-item error.
    Err(String),
    /// Never resolve. The reader must be cancelled from outside.
    Hang,
}

/// One scripted call to `stream`.
#[derive(Debug, Clone)]
pub enum Script {
    Events(Vec<ScriptStep>),
    /// Fail before any event is produced (connection-level fault).
    ConnectError(String),
}

impl Script {
    /// Text deltas followed by `Stop`.
    pub fn text(chunks: &[&str]) -> Self {
        let mut steps: Vec<ScriptStep> = chunks
            .iter()
            .map(|c| ScriptStep::Event(ProviderEvent::TextDelta { text: (*c).into() }))
            .collect();
        steps.push(ScriptStep::Event(ProviderEvent::Stop));
        Script::Events(steps)
    }

    /// A single tool call followed by `Stop`.
    pub fn tool_use(id: &str, name: &str, input: serde_json::Value) -> Self {
        Script::Events(vec![
            ScriptStep::Event(ProviderEvent::ToolUse {
                id: id.into(),
                name: name.into(),
                input,
            }),
            ScriptStep::Event(ProviderEvent::Stop),
        ])
    }
}

#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining_scripts(&self) -> usize {
        self.scripts.lock().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    async fn stream(
        &self,
        req: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<ProviderEvent>>> {
        self.requests.lock().push(req.clone());

        let script = self
            .scripts
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Provider("scripted provider exhausted".into()))?;

        let steps = match script {
            Script::ConnectError(msg) => return Err(Error::Provider(msg)),
            Script::Events(steps) => steps,
        };

        let stream = async_stream::stream! {
            for step in steps {
                match step {
                    ScriptStep::Event(ev) => yield Ok(ev),
                    ScriptStep::Err(msg) => {
                        yield Err(Error::Provider(msg));
                        return;
                    }
                    ScriptStep::Hang => {
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}
