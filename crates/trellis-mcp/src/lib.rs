//! Trellis MCP - issue graph tool over stdio JSON-RPC
//!
//! Exposes a single `issue_graph` tool. Each call crawls the relationship
//! graph around one issue or pull request and returns the rendered text
//! block. Requests are newline-delimited JSON-RPC 2.0 on stdin; responses
//! go to stdout, logs to stderr.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trellis_core::{CrawlConfig, IssueRef};
use trellis_graph::{
    build_issue_graph, format_graph_output, FocusTarget, IssueGraphRequest, Sources,
};

const PROTOCOL_VERSION: &str = "2024-11-05";
const TOOL_NAME: &str = "issue_graph";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

#[derive(Serialize, Deserialize, Debug)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

impl JsonRpcResponse {
    fn reply(id: Option<Value>, outcome: Result<Value, JsonRpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            jsonrpc: "2.0".to_string(),
            result,
            error,
            id,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Validated `issue_graph` arguments.
#[derive(Debug, PartialEq)]
struct IssueGraphArgs {
    target: IssueRef,
    focus: FocusTarget,
    verbose: bool,
}

impl IssueGraphArgs {
    fn parse(arguments: &Value) -> Result<Self, JsonRpcError> {
        let text = |name: &str| {
            arguments
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    JsonRpcError::new(INVALID_PARAMS, format!("Missing '{}' parameter", name))
                })
        };
        let owner = text("owner")?;
        let repo = text("repo")?;

        let number = arguments
            .get("issue_number")
            .and_then(|v| {
                v.as_u64().or_else(|| {
                    v.as_f64()
                        .filter(|f| f.fract() == 0.0 && *f > 0.0)
                        .map(|f| f as u64)
                })
            })
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                JsonRpcError::new(INVALID_PARAMS, "'issue_number' must be a positive integer")
            })?;

        let focus = match arguments.get("focus").and_then(Value::as_str) {
            Some(raw) => FocusTarget::from_str(raw)
                .map_err(|e| JsonRpcError::new(INVALID_PARAMS, e.to_string()))?,
            None => FocusTarget::Provided,
        };
        let verbose = arguments
            .get("verbose")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            target: IssueRef::new(owner, repo, number),
            focus,
            verbose,
        })
    }
}

pub struct McpServer {
    sources: Sources,
    config: CrawlConfig,
    shutdown: CancellationToken,
}

impl McpServer {
    pub fn new(sources: Sources, config: CrawlConfig) -> Self {
        Self {
            sources,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that aborts in-flight crawls when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run_stdio(&self) -> Result<()> {
        info!("MCP server listening on stdio");
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serves newline-delimited requests until `reader` is exhausted.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(req) => self.handle_request(req).await,
                Err(e) => {
                    warn!("Failed to parse input: {}", e);
                    Some(JsonRpcResponse::reply(
                        None,
                        Err(JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e))),
                    ))
                }
            };

            if let Some(response) = response {
                let json = serde_json::to_string(&response)?;
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!("stdin closed, shutting down");
        self.shutdown.cancel();
        Ok(())
    }

    /// Notifications (requests without an id) get no response.
    async fn handle_request(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling {}", req.method);
        let outcome = match req.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "trellis-mcp",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            "notifications/initialized" => Ok(json!({})),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(req.params.unwrap_or(Value::Null)).await,
            method => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            )),
        };

        req.id.map(|id| JsonRpcResponse::reply(Some(id), outcome))
    }

    fn list_tools(&self) -> Value {
        json!({
            "tools": [
                {
                    "name": TOOL_NAME,
                    "description": "Get a graph of related issues and pull requests around one item: parents, sub-issues, tasklist links and cross-references. Use focus to centre the graph on the nearest epic or batch.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "owner": { "type": "string", "description": "Repository owner" },
                            "repo": { "type": "string", "description": "Repository name" },
                            "issue_number": {
                                "type": "number",
                                "description": "Issue or pull request number to build the graph from"
                            },
                            "focus": {
                                "type": "string",
                                "enum": ["provided", "epic", "batch"],
                                "default": "provided",
                                "description": "Centre the graph on the provided item, or on the nearest epic or batch"
                            },
                            "verbose": {
                                "type": "boolean",
                                "default": false,
                                "description": "Append crawl statistics"
                            }
                        },
                        "required": ["owner", "repo", "issue_number"]
                    }
                }
            ]
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, JsonRpcError> {
        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "Missing 'name' parameter"))?;

        if name != TOOL_NAME {
            return Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Tool not found: {}", name),
            ));
        }

        let arguments = params.get("arguments").unwrap_or(&Value::Null);
        let args = IssueGraphArgs::parse(arguments)?;
        info!("issue_graph for {} (focus {})", args.target, args.focus);

        let request = IssueGraphRequest::new(args.target)
            .with_focus(args.focus)
            .verbose(args.verbose);
        let cancel = self.shutdown.child_token();

        match build_issue_graph(self.sources.clone(), self.config.clone(), &request, &cancel).await
        {
            Ok(graph) => Ok(text_content(format_graph_output(&graph), false)),
            Err(err) => Ok(text_content(format!("Failed to build issue graph: {}", err), true)),
        }
    }
}

fn text_content(text: String, is_error: bool) -> Value {
    let mut content = json!({
        "content": [
            {
                "type": "text",
                "text": text
            }
        ]
    });
    if is_error {
        content["isError"] = Value::Bool(true);
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use trellis_core::{
        ApiError, Comment, Issue, IssueSource, ListOptions, Page, SubIssue, TimelineEvent,
    };

    struct SingleIssue;

    #[async_trait]
    impl IssueSource for SingleIssue {
        async fn get_issue(
            &self,
            _owner: &str,
            _repo: &str,
            number: u64,
        ) -> Result<Issue, ApiError> {
            if number != 42 {
                return Err(ApiError::status(404, None, "Not Found"));
            }
            Ok(Issue {
                number,
                title: "Test Issue".to_string(),
                body: "Body text".to_string(),
                state: "open".to_string(),
                ..Default::default()
            })
        }

        async fn list_sub_issues(
            &self,
            _owner: &str,
            _repo: &str,
            _number: u64,
            _opts: ListOptions,
        ) -> Result<Page<SubIssue>, ApiError> {
            Ok(Page::single(Vec::new()))
        }

        async fn list_comments(
            &self,
            _owner: &str,
            _repo: &str,
            _number: u64,
            _opts: ListOptions,
        ) -> Result<Page<Comment>, ApiError> {
            Ok(Page::single(Vec::new()))
        }

        async fn list_timeline(
            &self,
            _owner: &str,
            _repo: &str,
            _number: u64,
            _opts: ListOptions,
        ) -> Result<Page<TimelineEvent>, ApiError> {
            Ok(Page::single(Vec::new()))
        }
    }

    fn server() -> McpServer {
        McpServer::new(Sources::new(Arc::new(SingleIssue)), CrawlConfig::default())
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: Some(params),
            id: Some(json!(1)),
        }
    }

    #[tokio::test]
    async fn test_initialize() {
        let response = server()
            .handle_request(request("initialize", json!({})))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "trellis-mcp");
        assert_eq!(response.id, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_tools_list_schema() {
        let response = server()
            .handle_request(request("tools/list", json!({})))
            .await
            .unwrap();
        let tools = response.result.unwrap();
        let tool = &tools["tools"][0];
        assert_eq!(tool["name"], "issue_graph");
        assert_eq!(
            tool["inputSchema"]["properties"]["focus"]["enum"],
            json!(["provided", "epic", "batch"])
        );
        assert_eq!(
            tool["inputSchema"]["required"],
            json!(["owner", "repo", "issue_number"])
        );
    }

    #[tokio::test]
    async fn test_issue_graph_call() {
        let params = json!({
            "name": "issue_graph",
            "arguments": { "owner": "octo", "repo": "app", "issue_number": 42, "verbose": true }
        });
        let response = server()
            .handle_request(request("tools/call", params))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert!(result.get("isError").is_none());
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("GRAPH SUMMARY\n"));
        assert!(text.contains("#42|task|open|Test Issue [FOCUS]"));
        assert!(text.contains("CRAWL STATISTICS"));
    }

    #[tokio::test]
    async fn test_unknown_method_and_tool() {
        let srv = server();
        let response = srv
            .handle_request(request("resources/list", json!({})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);

        let response = srv
            .handle_request(request("tools/call", json!({ "name": "nope" })))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let mut req = request("notifications/initialized", json!({}));
        req.id = None;
        assert!(server().handle_request(req).await.is_none());
    }

    #[test]
    fn test_argument_validation() {
        let args = IssueGraphArgs::parse(&json!({
            "owner": "octo", "repo": "app", "issue_number": 7.0, "focus": "epic"
        }))
        .unwrap();
        assert_eq!(args.target, IssueRef::new("octo", "app", 7));
        assert_eq!(args.focus, FocusTarget::Epic);
        assert!(!args.verbose);

        let missing = IssueGraphArgs::parse(&json!({ "owner": "octo", "issue_number": 7 }));
        assert_eq!(missing.unwrap_err().code, INVALID_PARAMS);

        let bad_number = IssueGraphArgs::parse(&json!({
            "owner": "octo", "repo": "app", "issue_number": -3
        }));
        assert_eq!(bad_number.unwrap_err().code, INVALID_PARAMS);

        let bad_focus = IssueGraphArgs::parse(&json!({
            "owner": "octo", "repo": "app", "issue_number": 7, "focus": "milestone"
        }));
        assert!(bad_focus.unwrap_err().message.contains("milestone"));
    }

    #[tokio::test]
    async fn test_serve_round_trip() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"method\":\"initialize\",\"id\":1}\n",
            "\n",
            "not json\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"tools/list\",\"id\":2}\n",
        );
        let mut output = Vec::new();
        let srv = server();
        srv.serve(input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["error"]["code"], PARSE_ERROR);
        assert_eq!(lines[2]["id"], 2);
        assert!(srv.shutdown_token().is_cancelled());
    }
}
