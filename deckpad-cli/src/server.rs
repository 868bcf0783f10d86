//! Newline-delimited JSON-RPC 2.0 over stdio.
//!
//! Requests carry an `id` and always get exactly one response line;
//! notifications (no `id`) never do. Tool failures are reported inside a
//! successful `tools/call` result with `isError: true`, so the caller sees
//! the error kind and message rather than a protocol error.

use anyhow::{Context, Result};
use deckpad_core::DeckError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::tools::{Toolbox, TOOLS};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct Request {
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl Response {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

fn tool_result(outcome: Result<Value, DeckError>) -> Value {
    let (payload, is_error) = match outcome {
        Ok(value) => (value, false),
        Err(err) => (
            json!({ "kind": err.kind(), "message": err.to_string() }),
            true,
        ),
    };
    let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

/// Handles one decoded message. Returns `None` for notifications.
fn dispatch(toolbox: &mut Toolbox, request: Request) -> Option<Response> {
    let Some(id) = request.id else {
        debug!(method = %request.method, "notification");
        return None;
    };
    if request.jsonrpc.as_deref() != Some("2.0") {
        return Some(Response::failure(
            id,
            INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ));
    }

    let response = match request.method.as_str() {
        "initialize" => {
            let version = request
                .params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(PROTOCOL_VERSION)
                .to_string();
            Response::success(
                id,
                json!({
                    "protocolVersion": version,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": "deckpad",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
        }
        "ping" => Response::success(id, json!({})),
        "tools/list" => Response::success(id, json!({ "tools": &*TOOLS })),
        "tools/call" => match serde_json::from_value::<CallParams>(request.params) {
            Ok(params) => {
                let outcome = toolbox.call(&params.name, params.arguments);
                if let Err(err) = &outcome {
                    warn!(tool = %params.name, kind = err.kind(), %err, "tool failed");
                }
                Response::success(id, tool_result(outcome))
            }
            Err(err) => Response::failure(id, INVALID_PARAMS, format!("invalid params: {err}")),
        },
        other => Response::failure(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
    };
    Some(response)
}

/// Decodes one line and produces the response line, if any.
fn handle_line(toolbox: &mut Toolbox, line: &str) -> Option<String> {
    let response = match serde_json::from_str::<Request>(line) {
        Ok(request) => dispatch(toolbox, request)?,
        Err(err) => {
            warn!(?err, "unparseable message");
            Response::failure(Value::Null, PARSE_ERROR, format!("parse error: {err}"))
        }
    };
    match serde_json::to_string(&response) {
        Ok(line) => Some(line),
        Err(err) => {
            warn!(?err, "failed to encode response");
            None
        }
    }
}

/// Serves until the input closes.
pub async fn serve<R, W>(mut toolbox: Toolbox, input: R, mut output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("serving on stdio");
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(response) = handle_line(&mut toolbox, line) {
            output.write_all(response.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
    }
    if toolbox.session().state() != deckpad_core::SessionState::Empty {
        warn!(state = ?toolbox.session().state(), "input closed with a presentation still open");
    }
    info!("input closed; shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use deckpad_core::{Document, PackageCodec, Rgb, Session};
    use deckpad_icons::IconLibrary;

    struct NullCodec;

    impl PackageCodec for NullCodec {
        fn load(&self, path: &Path) -> Result<Document> {
            anyhow::bail!("cannot load {:?}", path)
        }

        fn save(&self, _document: &Document, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn toolbox() -> Toolbox {
        Toolbox::new(
            Session::new(Arc::new(NullCodec)),
            Arc::new(IconLibrary::empty()),
            Rgb::new(0, 0, 0),
        )
    }

    fn reply(toolbox: &mut Toolbox, line: &str) -> Value {
        let response = handle_line(toolbox, line).expect("response");
        serde_json::from_str(&response).unwrap()
    }

    #[test]
    fn initialize_echoes_protocol_version() {
        let mut toolbox = toolbox();
        let response = reply(
            &mut toolbox,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#,
        );
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(response["result"]["serverInfo"]["name"], "deckpad");
    }

    #[test]
    fn notifications_get_no_reply() {
        let mut toolbox = toolbox();
        assert!(handle_line(
            &mut toolbox,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#
        )
        .is_none());
    }

    #[test]
    fn protocol_errors_use_rpc_codes() {
        let mut toolbox = toolbox();
        assert_eq!(reply(&mut toolbox, "{not json")["error"]["code"], PARSE_ERROR);
        assert_eq!(
            reply(&mut toolbox, r#"{"jsonrpc":"2.0","id":"a","method":"nope"}"#)["error"]["code"],
            METHOD_NOT_FOUND
        );
        assert_eq!(
            reply(&mut toolbox, r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{}}"#)
                ["error"]["code"],
            INVALID_PARAMS
        );
    }

    #[test]
    fn tool_failures_are_results() {
        let mut toolbox = toolbox();
        let response = reply(
            &mut toolbox,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_presentation_info"}}"#,
        );
        assert_eq!(response["result"]["isError"], true);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["kind"], "NoOpenDocumentError");
    }

    #[tokio::test]
    async fn serves_until_input_closes() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve(toolbox(), input.as_bytes(), &mut output).await.unwrap();
        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["result"]["tools"].as_array().unwrap().len(), 17);
        assert_eq!(lines[1]["id"], 2);
    }
}
