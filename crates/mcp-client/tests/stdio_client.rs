//! RPC client correlation over a real child process.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use tl_mcp_client::{McpClient, ProtocolError, StdioTransport, TransportError};

fn client_for_script(script: &str) -> McpClient {
    let transport = StdioTransport::spawn(
        "sh",
        &["-c".to_string(), script.to_string()],
        &HashMap::new(),
        CancellationToken::new(),
    )
    .expect("spawn sh");
    McpClient::new("stub", Box::new(transport))
}

#[tokio::test]
async fn stale_responses_and_notifications_are_discarded() {
    // The server answers with a notification, a response nobody asked for,
    // and a stale id before the real thing. Only id=1 may come back.
    let script = r#"printf '%s\n' \
 '{"jsonrpc":"2.0","method":"notifications/progress","params":{"n":1}}' \
 '{"jsonrpc":"2.0","id":999,"result":{"bogus":true}}' \
 '{"jsonrpc":"2.0","id":7,"result":{"stale":true}}' \
 '{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"ping","description":"Ping it"}]}}'
cat >/dev/null"#;

    let client = client_for_script(script);
    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "ping");
    client.close().await;
}

#[tokio::test]
async fn server_exit_mid_request_is_end_of_stream() {
    let client = client_for_script("exit 0");
    let err = client.list_tools().await.unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Transport(TransportError::Closed)
    ));
    client.close().await;
}

#[tokio::test]
async fn rpc_error_from_child_is_typed() {
    let script = r#"printf '%s\n' \
 '{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}'
cat >/dev/null"#;

    let client = client_for_script(script);
    match client.list_tools().await.unwrap_err() {
        ProtocolError::Rpc(err) => assert_eq!(err.code, -32601),
        other => panic!("expected rpc error, got {other:?}"),
    }
    client.close().await;
}
