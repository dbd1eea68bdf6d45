//! JSON-RPC 2.0 / MCP adapter for [`CohortTools`].
//!
//! Minimal on purpose: lifecycle, tool listing and calls, and the
//! `memory://{key}` resource used to redeem staged cohorts.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::filter::FilterArgs;
use crate::tools::CohortTools;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "patient-cohort-query";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const MEMORY_SCHEME: &str = "memory://";

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    /// Absent or null for notifications.
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
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

    pub fn parse_error() -> Self {
        Self::error(Value::Null, -32700, "Parse error")
    }

    pub fn invalid_request(id: Value, message: impl Into<String>) -> Self {
        Self::error(id, -32600, message)
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::error(id, -32601, format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: Value, message: impl Into<String>) -> Self {
        Self::error(id, -32602, message)
    }
}

pub struct McpServer {
    tools: CohortTools,
}

impl McpServer {
    pub fn new(tools: CohortTools) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &CohortTools {
        &self.tools
    }

    /// Handles one raw line. Returns `None` when nothing should be written
    /// back (notifications).
    pub fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "unparseable JSON-RPC message");
                return Some(RpcResponse::parse_error());
            }
        };
        let id = raw.get("id").cloned().unwrap_or(Value::Null);

        let request: RpcRequest = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "malformed JSON-RPC request");
                return Some(RpcResponse::invalid_request(id, "Invalid Request"));
            }
        };
        if request.jsonrpc != "2.0" {
            warn!(version = %request.jsonrpc, "unsupported JSON-RPC version");
            return Some(RpcResponse::invalid_request(
                id,
                format!("Unsupported jsonrpc version: {:?}", request.jsonrpc),
            ));
        }

        let response = self.dispatch(&request);
        (!request.is_notification()).then_some(response)
    }

    pub fn dispatch(&self, req: &RpcRequest) -> RpcResponse {
        debug!(method = %req.method, "dispatching");
        let id = req.id.clone();

        match req.method.as_str() {
            "initialize" => {
                info!(client = ?req.params.get("clientInfo"), "initialize");
                RpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {
                            "tools": { "listChanged": false },
                            "resources": { "subscribe": false, "listChanged": false }
                        },
                        "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION }
                    }),
                )
            }
            "notifications/initialized" | "initialized" | "shutdown" | "ping" => {
                RpcResponse::success(id, json!({}))
            }
            "tools/list" => RpcResponse::success(id, json!({ "tools": tool_definitions() })),
            "tools/call" => self.call_tool(id, &req.params),
            "resources/list" => RpcResponse::success(id, json!({ "resources": [] })),
            "resources/templates/list" => RpcResponse::success(
                id,
                json!({
                    "resourceTemplates": [{
                        "uriTemplate": "memory://{key}",
                        "name": "cohort",
                        "description": "Full result staged by fetch_records or summarize_by_category",
                        "mimeType": "application/json"
                    }]
                }),
            ),
            "resources/read" => self.read_resource(id, &req.params),
            other => {
                warn!(method = other, "unknown method");
                RpcResponse::method_not_found(id, other)
            }
        }
    }

    fn call_tool(&self, id: Value, params: &Value) -> RpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return RpcResponse::invalid_params(id, "Missing 'name' parameter");
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        info!(tool = name, arguments = %arguments, "tool call");

        let result = match name {
            "ping" => serde_json::to_value(self.tools.ping()),
            "fetch_records" | "get_patient_clinical_data" => {
                serde_json::to_value(self.tools.fetch_records(&FilterArgs::from_json(&arguments)))
            }
            "summarize_by_category" | "get_department_summary" => {
                serde_json::to_value(self.tools.summarize_by_category())
            }
            "dataset_stats" => serde_json::to_value(self.tools.dataset_stats()),
            other => return RpcResponse::invalid_params(id, format!("Unknown tool: {other}")),
        };

        let payload = result.unwrap_or_else(|err| {
            warn!(tool = name, error = %err, "tool result could not be serialized");
            json!({})
        });

        RpcResponse::success(
            id,
            json!({
                "content": [{
                    "type": "text",
                    "text": payload.to_string()
                }]
            }),
        )
    }

    fn read_resource(&self, id: Value, params: &Value) -> RpcResponse {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return RpcResponse::invalid_params(id, "Missing 'uri' parameter");
        };
        let Some(key) = uri.strip_prefix(MEMORY_SCHEME) else {
            return RpcResponse::invalid_params(id, format!("Invalid URI: {uri}"));
        };

        let entry = self.tools.redeem(key);
        let text = serde_json::to_string(&*entry).unwrap_or_else(|_| "{}".to_string());
        RpcResponse::success(
            id,
            json!({
                "contents": [{
                    "uri": uri,
                    "mimeType": "application/json",
                    "text": text
                }]
            }),
        )
    }
}

fn tool_definitions() -> Value {
    json!([
        {
            "name": "ping",
            "description": "Report that the server is online.",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "fetch_records",
            "description": "Filter patient records. Returns a small sample inline and a cache_key; \
                            read memory://{cache_key} for the full cohort.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "description": "Department substring, case-insensitive. 'all' matches every department."
                    },
                    "risk_threshold": {
                        "type": "number",
                        "description": "Minimum risk score, either 0-1 or 0-100."
                    },
                    "min_oxygen": { "type": "integer", "description": "Minimum oxygen saturation." },
                    "max_heart_rate": { "type": "integer", "description": "Maximum heart rate." }
                }
            }
        },
        {
            "name": "summarize_by_category",
            "description": "Patient count, average risk and high-risk count per department.",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "dataset_stats",
            "description": "Record count, high-risk count and average risk across the whole dataset.",
            "inputSchema": { "type": "object", "properties": {} }
        }
    ])
}
