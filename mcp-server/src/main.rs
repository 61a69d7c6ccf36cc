// Breakpoint MCP Server - breakpoint resolution via Model Context Protocol
//
// Exposes targets, breakpoints and source maps as LLM-friendly tools

use anyhow::Result;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

mod handlers;
mod protocol;
mod session;
mod tools;

use handlers::RequestHandler;
use protocol::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing to stderr only - stdout is reserved for JSON-RPC protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bkpt_mcp=info".parse()?)
                .add_directive("bkpt_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting breakpoint MCP server...");

    let handler = RequestHandler::new();

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    info!("Breakpoint MCP server ready, waiting for requests...");

    // One JSON-RPC message per line
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("Client disconnected");
                break;
            }
            Ok(_) => {
                let message = line.trim();
                if message.is_empty() {
                    continue;
                }
                debug!("Received: {}", message);

                if let Some(response) = dispatch(&handler, message).await {
                    write_response(&mut stdout, &response).await?;
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }

    info!("Breakpoint MCP server shutting down");
    Ok(())
}

/// Route one message; notifications produce no response
async fn dispatch(handler: &RequestHandler, message: &str) -> Option<JsonRpcResponse> {
    let value = match serde_json::from_str::<Value>(message) {
        Ok(value) => value,
        Err(e) => {
            error!("Parse error: {}", e);
            return Some(error_response(PARSE_ERROR, "Parse error"));
        }
    };

    // Requests carry an id, notifications do not
    if value.get("id").is_none() {
        match serde_json::from_value::<JsonRpcNotification>(value) {
            Ok(notification) => handler.handle_notification(notification).await,
            Err(e) => error!("Invalid notification: {}", e),
        }
        return None;
    }

    match serde_json::from_value::<JsonRpcRequest>(value) {
        Ok(request) => Some(handler.handle_request(request).await),
        Err(e) => {
            error!("Invalid request: {}", e);
            Some(error_response(INVALID_REQUEST, "Invalid request"))
        }
    }
}

fn error_response(code: i32, message: &str) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: Value::Null,
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.to_string(),
            data: None,
        }),
    }
}

async fn write_response<W: AsyncWrite + Unpin>(out: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let encoded = serde_json::to_string(response)?;
    debug!("Sending: {}", encoded);
    out.write_all(encoded.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}
