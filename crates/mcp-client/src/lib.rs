//! MCP client: JSON-RPC 2.0 over child stdio or HTTP Server-Sent Events.
//!
//! Layering, bottom up:
//! - [`transport`] / [`sse`] — framed, cancellable message I/O (stdio child
//!   process or SSE endpoint).
//! - [`client`] — request/response correlation, the `initialize` handshake,
//!   `tools/list` and `tools/call`.
//! - [`remote`] — wraps each discovered remote tool as a local
//!   [`tl_tools::tool::Tool`] under the name `mcp_<server>_<name>`.

pub mod client;
pub mod protocol;
pub mod remote;
pub mod sse;
pub mod transport;

pub use client::{McpClient, ProtocolError};
pub use remote::McpTool;
pub use sse::SseTransport;
pub use transport::{StdioTransport, Transport, TransportError};
