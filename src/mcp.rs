//! Model Context Protocol tool server: newline-delimited JSON-RPC 2.0 over
//! stdio exposing `create_custom_audience` and `create_ad_campaign`.
//!
//! Tool failures are answered as regular results whose mapping carries an
//! `error` key, so callers can branch on it instead of parsing text.

use crate::audience::{self, AudienceError};
use crate::campaign::{self, CampaignChain, CampaignError, CampaignRequest};
use crate::constants::{SERVER_NAME, SERVER_VERSION};
use crate::facebook::{FacebookApiError, GraphApi};
use crate::identifiers::{self, NormalizeReport, RawPolicy};
use crate::models::{AdAccountRef, Objective, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

fn respond_ok(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

fn respond_err(id: Value, code: i64, message: &str) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(json!({ "code": code, "message": message })),
    }
}

#[derive(Debug, Deserialize)]
struct AudienceArgs {
    act_id: String,
    hashed_content: String,
    audience_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    hash_raw_phones: bool,
}

#[derive(Debug, Deserialize)]
struct CampaignArgs {
    act_id: String,
    name: String,
    objective: String,
    custom_audience_id: String,
    daily_budget: f64,
    page_id: String,
    ad_link: String,
    ad_message: String,
    #[serde(default)]
    ad_title: Option<String>,
    #[serde(default)]
    bid_amount: Option<f64>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    targeting: Option<Map<String, Value>>,
}

fn error_mapping(message: impl ToString, stage: &str) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("error".to_string(), json!(message.to_string()));
    out.insert("stage".to_string(), json!(stage));
    out
}

fn insert_remote_status(out: &mut Map<String, Value>, remote: Option<&FacebookApiError>) {
    if let Some(status) = remote.and_then(FacebookApiError::status) {
        out.insert("status".to_string(), json!(status));
    }
}

fn identifier_summary(report: &NormalizeReport) -> Value {
    json!({
        "total": report.total_lines(),
        "accepted": report.accepted,
        "rejected": report.rejected,
        "distinct": report.identifiers.len(),
    })
}

fn tools_list() -> Value {
    json!({
      "tools": [
        {
          "name": "create_custom_audience",
          "description": "Creates a custom audience from content containing pre-hashed (SHA-256) phone numbers, one per line or as the second column of a CSV, and uploads the members in one batch.",
          "inputSchema": {
            "type": "object",
            "properties": {
              "act_id": { "type": "string", "description": "Ad account id (act_<id>)" },
              "hashed_content": { "type": "string", "description": "Lines of SHA-256 hex phone hashes" },
              "audience_name": { "type": "string", "description": "Audience name (1-100 characters)" },
              "description": { "type": "string" },
              "hash_raw_phones": { "type": "boolean", "description": "Hash lines that are raw phone numbers instead of rejecting them" }
            },
            "required": ["act_id", "hashed_content", "audience_name"]
          }
        },
        {
          "name": "create_ad_campaign",
          "description": "Creates a paused campaign, ad set, link creative and ad targeting a custom audience. On failure the result lists every id created before the failing step.",
          "inputSchema": {
            "type": "object",
            "properties": {
              "act_id": { "type": "string" },
              "name": { "type": "string" },
              "objective": { "type": "string", "description": "OUTCOME_AWARENESS, OUTCOME_TRAFFIC, OUTCOME_ENGAGEMENT, OUTCOME_LEADS, OUTCOME_SALES, OUTCOME_APP_PROMOTION, or a legacy name such as REACH or LINK_CLICKS" },
              "custom_audience_id": { "type": "string" },
              "daily_budget": { "type": "number", "description": "Daily budget in account currency units" },
              "page_id": { "type": "string" },
              "ad_link": { "type": "string" },
              "ad_message": { "type": "string" },
              "ad_title": { "type": "string", "description": "Defaults to the campaign name" },
              "bid_amount": { "type": "number" },
              "start_time": { "type": "string", "description": "YYYY-MM-DDThh:mm:ss+0000" },
              "end_time": { "type": "string", "description": "YYYY-MM-DDThh:mm:ss+0000" },
              "targeting": { "type": "object", "description": "Extra ad set targeting keys" }
            },
            "required": ["act_id", "name", "objective", "custom_audience_id", "daily_budget", "page_id", "ad_link", "ad_message"]
          }
        }
      ]
    })
}

pub struct ToolServer<A> {
    api: A,
}

impl<A: GraphApi> ToolServer<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Runs a tool and returns its result mapping. Never fails: errors are
    /// reported under the `error` key.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Map<String, Value> {
        match name {
            "create_custom_audience" => match serde_json::from_value(arguments) {
                Ok(args) => self.create_custom_audience(args).await,
                Err(e) => error_mapping(format!("Invalid arguments: {e}"), "validation"),
            },
            "create_ad_campaign" => match serde_json::from_value(arguments) {
                Ok(args) => self.create_ad_campaign(args).await,
                Err(e) => error_mapping(format!("Invalid arguments: {e}"), "validation"),
            },
            other => error_mapping(format!("Unknown tool: {other}"), "validation"),
        }
    }

    async fn create_custom_audience(&self, args: AudienceArgs) -> Map<String, Value> {
        let account = match AdAccountRef::parse(&args.act_id) {
            Ok(account) => account,
            Err(e) => return error_mapping(e, "validation"),
        };

        let policy = if args.hash_raw_phones {
            RawPolicy::HashPhones
        } else {
            RawPolicy::HashedOnly
        };
        let report = identifiers::normalize(args.hashed_content.lines(), policy);

        let result = if report.identifiers.is_empty() {
            Err(AudienceError::from(ValidationError::NoIdentifiers {
                rejected: report.rejected,
            }))
        } else {
            audience::create_custom_audience(
                &self.api,
                &account,
                &report.identifiers,
                &args.audience_name,
                args.description.as_deref(),
            )
            .await
        };

        let mut out = match result {
            Ok(audience) => {
                let mut out = Map::new();
                out.insert("audience".to_string(), json!(audience));
                out
            }
            Err(e) => {
                let mut out = error_mapping(&e, e.stage());
                insert_remote_status(&mut out, e.remote());
                if let Some(id) = e.audience_id() {
                    out.insert("audience_id".to_string(), json!(id));
                }
                out
            }
        };
        out.insert("identifiers".to_string(), identifier_summary(&report));
        out
    }

    async fn create_ad_campaign(&self, args: CampaignArgs) -> Map<String, Value> {
        let parsed = AdAccountRef::parse(&args.act_id)
            .and_then(|account| Ok((account, args.objective.parse::<Objective>()?)));
        let (account, objective) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return error_mapping(e, "validation"),
        };

        let request = CampaignRequest {
            account,
            name: args.name,
            objective,
            custom_audience_id: args.custom_audience_id,
            daily_budget: args.daily_budget,
            page_id: args.page_id,
            ad_link: args.ad_link,
            ad_message: args.ad_message,
            ad_title: args.ad_title,
            bid_amount: args.bid_amount,
            start_time: args.start_time,
            end_time: args.end_time,
            targeting: args.targeting,
        };

        match campaign::create_ad_campaign(&self.api, request).await {
            Ok(chain) => chain_mapping(&chain),
            Err(e) => campaign_error_mapping(&e),
        }
    }

    pub async fn handle(&self, req: RpcRequest) -> Option<RpcResponse> {
        let id = req.id?;

        match req.method.as_str() {
            "initialize" => {
                let proto = req
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");

                Some(respond_ok(
                    id,
                    json!({
                      "protocolVersion": proto,
                      "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
                      "capabilities": { "tools": {} }
                    }),
                ))
            }

            "tools/list" => Some(respond_ok(id, tools_list())),

            "tools/call" => {
                let Some(params) = req.params.as_ref() else {
                    return Some(respond_err(id, -32602, "Missing params"));
                };

                let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");

                let args = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));

                info!(tool = name, "tool call");
                let mapping = self.call_tool(name, args).await;
                let is_error = mapping.contains_key("error");
                if is_error {
                    warn!(tool = name, error = ?mapping.get("error"), "tool call failed");
                }

                let text = serde_json::to_string_pretty(&mapping).unwrap_or_default();
                Some(respond_ok(
                    id,
                    json!({
                      "content": [{ "type": "text", "text": text }],
                      "structuredContent": mapping,
                      "isError": is_error
                    }),
                ))
            }

            "ping" => Some(respond_ok(id, json!({}))),

            _ => Some(respond_err(id, -32601, "Method not found")),
        }
    }

    /// Reads one request per line and writes one response per line until
    /// the input closes.
    pub async fn serve<R, W>(&self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let req = match serde_json::from_str::<RpcRequest>(&line) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "ignoring malformed request");
                    continue;
                }
            };

            // Notifications have no id => no response.
            let Some(resp) = self.handle(req).await else {
                continue;
            };

            let out = serde_json::to_string(&resp)?;
            output.write_all(out.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }

        Ok(())
    }
}

fn chain_mapping(chain: &CampaignChain) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("campaign".to_string(), json!(chain.campaign));
    out.insert("adset".to_string(), json!(chain.ad_set));
    out.insert("creative".to_string(), json!(chain.creative));
    out.insert("ad".to_string(), json!(chain.ad));
    out
}

fn campaign_error_mapping(e: &CampaignError) -> Map<String, Value> {
    let stage = e
        .stage()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "validation".to_string());
    let mut out = error_mapping(e, &stage);
    insert_remote_status(&mut out, e.remote());

    if let Some(created) = e.created() {
        out.insert("partial".to_string(), json!(e.is_partial()));
        if let Ok(Value::Object(ids)) = serde_json::to_value(created) {
            out.extend(ids);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facebook::mock::{api_error, created, uploaded, MockGraphApi, Reply};

    fn hex(n: u8) -> String {
        format!("{:064x}", n)
    }

    fn campaign_args() -> Value {
        json!({
            "act_id": "act_111",
            "name": "Launch",
            "objective": "REACH",
            "custom_audience_id": "aud_9",
            "daily_budget": 25.0,
            "page_id": "page_5",
            "ad_link": "https://x.test",
            "ad_message": "Hi",
            "ad_title": "Hello"
        })
    }

    #[tokio::test]
    async fn tools_list_contains_both_tools() {
        let server = ToolServer::new(MockGraphApi::new(vec![]));
        let req = RpcRequest {
            jsonrpc: Some("2.0".to_string()),
            id: Some(json!(1)),
            method: "tools/list".to_string(),
            params: None,
        };
        let resp = server.handle(req).await.unwrap();
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(names, vec!["create_custom_audience", "create_ad_campaign"]);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let server = ToolServer::new(MockGraphApi::new(vec![]));
        let req = RpcRequest {
            jsonrpc: Some("2.0".to_string()),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        };
        assert!(server.handle(req).await.is_none());
    }

    #[tokio::test]
    async fn campaign_tool_returns_full_chain() {
        let server = ToolServer::new(MockGraphApi::new(vec![
            created("c1"),
            created("as1"),
            created("cr1"),
            created("ad1"),
        ]));

        let out = server.call_tool("create_ad_campaign", campaign_args()).await;

        assert!(!out.contains_key("error"));
        assert_eq!(out["campaign"]["id"], "c1");
        assert_eq!(out["campaign"]["status"], "PAUSED");
        assert_eq!(out["adset"]["id"], "as1");
        assert_eq!(out["adset"]["daily_budget"], 2500);
        assert_eq!(out["adset"]["status"], "PAUSED");
        assert_eq!(out["creative"]["id"], "cr1");
        assert_eq!(out["ad"]["id"], "ad1");
        assert_eq!(out["ad"]["status"], "PAUSED");
    }

    #[tokio::test]
    async fn campaign_tool_accepts_outcome_objectives() {
        let server = ToolServer::new(MockGraphApi::new(vec![
            created("c1"),
            created("as1"),
            created("cr1"),
            created("ad1"),
        ]));
        let mut args = campaign_args();
        args["objective"] = json!("OUTCOME_TRAFFIC");

        let out = server.call_tool("create_ad_campaign", args).await;

        assert!(!out.contains_key("error"));
        assert_eq!(out["campaign"]["objective"], "OUTCOME_TRAFFIC");
        assert_eq!(server.api.calls()[0].params()["objective"], "OUTCOME_TRAFFIC");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let server = ToolServer::new(MockGraphApi::new(vec![]));
        let req = RpcRequest {
            jsonrpc: Some("2.0".to_string()),
            id: Some(json!(7)),
            method: "tools/call".to_string(),
            params: Some(json!({ "name": "delete_everything", "arguments": {} })),
        };

        let resp = server.handle(req).await.unwrap();

        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["stage"], "validation");
        assert!(result["structuredContent"]["error"]
            .as_str()
            .unwrap()
            .contains("delete_everything"));
        assert!(server.api.calls().is_empty());
    }

    #[tokio::test]
    async fn campaign_tool_failure_lists_created_ids() {
        let server = ToolServer::new(MockGraphApi::new(vec![
            created("c1"),
            created("as1"),
            Reply::Created(Err(api_error("Page not found"))),
        ]));

        let out = server.call_tool("create_ad_campaign", campaign_args()).await;

        assert_eq!(out["stage"], "creative");
        assert_eq!(out["campaign_id"], "c1");
        assert_eq!(out["adset_id"], "as1");
        assert!(!out.contains_key("creative_id"));
        assert_eq!(out["partial"], true);
        assert_eq!(out["status"], 400);
        assert!(out["error"].as_str().unwrap().contains("Page not found"));
    }

    #[tokio::test]
    async fn campaign_tool_rejects_unknown_objective_without_calls() {
        let mut args = campaign_args();
        args["objective"] = json!("WORLD_DOMINATION");
        let server = ToolServer::new(MockGraphApi::new(vec![]));

        let out = server.call_tool("create_ad_campaign", args).await;

        assert_eq!(out["stage"], "validation");
        assert!(out["error"].as_str().unwrap().contains("WORLD_DOMINATION"));
        assert!(server.api.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_arguments_are_an_error_mapping() {
        let server = ToolServer::new(MockGraphApi::new(vec![]));
        let out = server
            .call_tool("create_ad_campaign", json!({ "act_id": "act_1" }))
            .await;
        assert!(out["error"].as_str().unwrap().starts_with("Invalid arguments"));
    }

    #[tokio::test]
    async fn audience_tool_reports_identifier_counts() {
        let server = ToolServer::new(MockGraphApi::new(vec![
            created("aud_1"),
            uploaded("aud_1", 2),
        ]));
        let content = format!("{}\nnot-a-hash\n{}\n{}\n", hex(1), hex(2), hex(1));

        let out = server
            .call_tool(
                "create_custom_audience",
                json!({ "act_id": "123", "hashed_content": content, "audience_name": "VIPs" }),
            )
            .await;

        assert_eq!(out["audience"]["id"], "aud_1");
        assert_eq!(out["audience"]["member_count"], 2);
        assert_eq!(out["identifiers"]["total"], 4);
        assert_eq!(out["identifiers"]["accepted"], 3);
        assert_eq!(out["identifiers"]["rejected"], 1);
        assert_eq!(out["identifiers"]["distinct"], 2);
        assert_eq!(server.api.calls()[0].path(), "act_123/customaudiences");
    }

    #[tokio::test]
    async fn audience_tool_with_no_valid_lines_makes_no_calls() {
        let server = ToolServer::new(MockGraphApi::new(vec![]));

        let out = server
            .call_tool(
                "create_custom_audience",
                json!({ "act_id": "act_1", "hashed_content": "foo\nbar", "audience_name": "VIPs" }),
            )
            .await;

        assert_eq!(out["stage"], "validation");
        assert_eq!(out["identifiers"]["rejected"], 2);
        assert!(server.api.calls().is_empty());
    }

    #[tokio::test]
    async fn audience_upload_failure_keeps_audience_id() {
        let server = ToolServer::new(MockGraphApi::new(vec![
            created("aud_3"),
            Reply::Uploaded(Err(api_error("Too many requests"))),
        ]));

        let out = server
            .call_tool(
                "create_custom_audience",
                json!({ "act_id": "act_1", "hashed_content": hex(9), "audience_name": "VIPs" }),
            )
            .await;

        assert_eq!(out["stage"], "upload");
        assert_eq!(out["audience_id"], "aud_3");
    }

    #[tokio::test]
    async fn serve_answers_one_line_per_request() {
        let server = ToolServer::new(MockGraphApi::new(vec![]));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            "garbage\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"nope"}"#,
            "\n"
        );
        let mut output = Vec::new();

        server
            .serve(tokio::io::BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let replies: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], "meta-ads-mcp-server");
        assert_eq!(replies[1]["error"]["code"], -32601);
    }
}
