//! JSON-RPC lifecycle: initialize, tools/list, tools/call.

use serde_json::{Value, json};

use crate::{JsonRpcRequest, McpServer, json_rpc_error, json_rpc_response, tools};

impl McpServer {
    pub(crate) fn handle(&mut self, request: JsonRpcRequest) -> Option<Value> {
        let method = request.method.as_str();
        let expects_response = !matches!(request.id.as_ref(), None | Some(Value::Null));

        if method == "initialize" {
            // Remain forward-compatible by echoing the client's declared
            // protocol version, falling back to our baseline when absent.
            let protocol_version = request
                .params
                .as_ref()
                .and_then(|params| params.get("protocolVersion"))
                .and_then(Value::as_str)
                .unwrap_or(crate::MCP_VERSION);

            return Some(json_rpc_response(
                request.id,
                json!({
                    "protocolVersion": protocol_version,
                    "serverInfo": {
                        "name": crate::SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": { "tools": {} },
                }),
            ));
        }

        // The protocol says `notifications/initialized`; some clients send
        // a plain `initialized`. Accept both, never respond.
        if method == "notifications/initialized" || method == "initialized" {
            self.initialized = true;
            return None;
        }

        if !self.initialized {
            // Allow auto-initialization on the first real request to avoid
            // client startup races.
            if matches!(method, "tools/call" | "tools/list" | "ping") {
                self.initialized = true;
            } else if expects_response {
                return Some(json_rpc_error(request.id, -32002, "Server not initialized"));
            } else {
                return None;
            }
        }

        if method == "ping" {
            return Some(json_rpc_response(request.id, json!({})));
        }

        if method == "tools/list" {
            return Some(json_rpc_response(
                request.id,
                json!({ "tools": tools::tool_definitions() }),
            ));
        }

        if method == "tools/call" {
            let Some(params) = request.params.as_ref().and_then(Value::as_object) else {
                return Some(json_rpc_error(
                    request.id,
                    -32602,
                    "params must be an object",
                ));
            };
            let tool_name = params.get("name").and_then(Value::as_str).unwrap_or("");
            // Some clients send `"arguments": null` for empty-args tools.
            let arguments = params
                .get("arguments")
                .cloned()
                .filter(|value| !value.is_null())
                .unwrap_or_else(|| json!({}));

            let payload = match tools::dispatch(self, tool_name, &arguments) {
                Ok(text) => json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": false,
                }),
                Err(failure) => json!({
                    "content": [{ "type": "text", "text": failure.message }],
                    "isError": true,
                }),
            };
            return Some(json_rpc_response(request.id, payload));
        }

        if expects_response {
            return Some(json_rpc_error(request.id, -32601, "Method not found"));
        }
        None
    }
}
