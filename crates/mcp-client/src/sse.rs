//! HTTP Server-Sent Events transport.
//!
//! The server is reached in two halves: a long-lived GET on the SSE URL for
//! receiving, and JSON POSTs for sending. The first SSE event must be
//! `endpoint`, whose data is the POST URL *resolved as a URL reference
//! against the SSE URL* — string concatenation breaks servers that return
//! absolute paths. Subsequent `message` events carry JSON-RPC responses.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::protocol::JsonRpcMessage;
use crate::transport::{Transport, TransportError};

/// Bound on buffered, not-yet-consumed responses.
const RESPONSE_CAPACITY: usize = 16;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE framing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// The `event:` field; `message` when absent, per the SSE default.
    pub name: String,
    /// Concatenated `data:` lines.
    pub data: String,
}

/// Incremental SSE parser.
///
/// Events are delimited by a blank line. The buffer is drained in place;
/// a trailing partial event stays for the next [`SseParser::feed`].
#[derive(Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and return every event completed by them.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos).collect();
            self.buffer.drain(..2);

            let mut name = String::from("message");
            let mut data_lines: Vec<&str> = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = value.trim().to_string();
                } else if let Some(value) = line.strip_prefix("data:") {
                    data_lines.push(value.trim());
                }
                // id: and retry: fields are irrelevant here.
            }

            let data = data_lines.join("\n");
            if !data.is_empty() {
                events.push(SseEvent { name, data });
            }
        }

        events
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// SSE transport: GET stream for receiving, JSON POST for sending.
pub struct SseTransport {
    http: reqwest::Client,
    endpoint: url::Url,
    inbound: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl SseTransport {
    /// Open the SSE stream and wait for the `endpoint` event.
    ///
    /// Failure (or stream end) before that event arrives is fatal
    /// initialisation failure: [`TransportError::ClosedBeforeEndpoint`].
    pub async fn connect(sse_url: &str, cancel: CancellationToken) -> Result<Self, TransportError> {
        let base = url::Url::parse(sse_url).map_err(|e| TransportError::Http(e.to_string()))?;
        let http = reqwest::Client::new();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            sent = http.get(base.clone()).send() => {
                sent.map_err(|e| TransportError::Http(e.to_string()))?
            }
        };
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status().as_u16()));
        }

        let mut response = response;
        let mut parser = SseParser::new();

        // Phase 1: read until the endpoint event names the POST URL.
        let endpoint = 'endpoint: loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                chunk = response.chunk() => chunk,
            };
            match chunk {
                Ok(Some(bytes)) => {
                    for event in parser.feed(&String::from_utf8_lossy(&bytes)) {
                        if event.name == "endpoint" {
                            let resolved = base
                                .join(&event.data)
                                .map_err(|e| TransportError::Http(e.to_string()))?;
                            break 'endpoint resolved;
                        }
                        tracing::debug!(event = %event.name, "SSE event before endpoint, ignoring");
                    }
                }
                Ok(None) => return Err(TransportError::ClosedBeforeEndpoint),
                Err(e) => {
                    tracing::debug!(error = %e, "SSE stream failed before endpoint");
                    return Err(TransportError::ClosedBeforeEndpoint);
                }
            }
        };
        tracing::debug!(endpoint = %endpoint, "SSE endpoint resolved");

        // Phase 2: background reader dispatches message events.
        let (tx, rx) = mpsc::channel::<JsonRpcMessage>(RESPONSE_CAPACITY);
        let reader_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut parser = parser;
            loop {
                let chunk = tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    chunk = response.chunk() => chunk,
                };
                match chunk {
                    Ok(Some(bytes)) => {
                        for event in parser.feed(&String::from_utf8_lossy(&bytes)) {
                            if event.name != "message" {
                                continue;
                            }
                            match serde_json::from_str::<JsonRpcMessage>(&event.data) {
                                Ok(msg) => {
                                    if tx.send(msg).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "unparseable SSE message event");
                                }
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "SSE stream dropped");
                        break;
                    }
                }
            }
            // tx drops here; receive() then reports end-of-stream.
        });

        Ok(Self {
            http,
            endpoint,
            inbound: Mutex::new(rx),
            reader: Mutex::new(Some(handle)),
            cancel,
            closed: AtomicBool::new(false),
        })
    }

    /// The resolved POST endpoint (exposed for diagnostics).
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&self, msg: &JsonRpcMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransportError::Cancelled),
            sent = self.http.post(self.endpoint.clone()).json(msg).send() => {
                sent.map_err(|e| TransportError::Http(e.to_string()))?
            }
        };
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }

    async fn receive(&self) -> Result<JsonRpcMessage, TransportError> {
        let mut inbound = self.inbound.lock().await;
        // Biased: cancellation also stops the reader, and must win the
        // race against the channel closing behind it.
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            msg = inbound.recv() => msg.ok_or(TransportError::Closed),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
