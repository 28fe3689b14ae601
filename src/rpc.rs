use crate::indexer::Engine;
use crate::retriever;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

/// Line-delimited JSON-RPC 2.0 over stdio. The response stream carries
/// frames only; every diagnostic goes to stderr through tracing, so a
/// client parser never sees interleaved noise.
pub async fn serve(engine: Engine) -> Result<()> {
    info!("serving on stdio");
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Value>(&line) {
            Ok(message) => handle_message(&engine, message).await,
            Err(err) => Some(jsonrpc_error(
                Value::Null,
                -32700,
                &format!("parse error: {err}"),
            )),
        };
        if let Some(payload) = response {
            stdout
                .write_all(format!("{}\n", serde_json::to_string(&payload)?).as_bytes())
                .await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

/// One-shot dispatch used by the `request` CLI subcommand.
pub async fn call(engine: &Engine, method: &str, params_raw: &str, id: &str) -> Result<String> {
    let params: Value = if params_raw.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(params_raw)?
    };
    let message = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    });
    let response = handle_message(engine, message)
        .await
        .ok_or_else(|| anyhow!("no response for method {method}"))?;
    Ok(serde_json::to_string_pretty(&response)?)
}

async fn handle_message(engine: &Engine, message: Value) -> Option<Value> {
    let id = message.get("id").cloned();
    let Some(method) = message.get("method").and_then(|value| value.as_str()) else {
        return id.map(|id| jsonrpc_error(id, -32600, "invalid request"));
    };
    let params = message.get("params").cloned().unwrap_or_else(|| json!({}));

    if method == "ping" {
        return id.map(|id| jsonrpc_result(id, json!({})));
    }

    let id = id?;
    match handle_method(engine, method, params).await {
        Ok(result) => Some(jsonrpc_result(id, result)),
        Err(err) => {
            error!(method, "request failed: {err:#}");
            Some(jsonrpc_error(id, -32000, &format!("{err:#}")))
        }
    }
}

#[derive(Deserialize)]
struct RefreshParams {
    root_path: String,
    #[serde(default)]
    force_full_scan: bool,
    #[serde(default)]
    include: Option<Value>,
    #[serde(default)]
    exclude: Option<Value>,
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    root_path: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    include: Option<Value>,
    #[serde(default)]
    exclude: Option<Value>,
}

fn default_limit() -> usize {
    10
}

#[derive(Deserialize)]
struct StatsParams {
    root_path: String,
}

#[derive(Deserialize)]
struct DefinitionParams {
    symbol: String,
    root_path: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    line: Option<i64>,
}

#[derive(Deserialize)]
struct ReferencesParams {
    symbol: String,
    root_path: String,
}

pub async fn handle_method(engine: &Engine, method: &str, params: Value) -> Result<Value> {
    match method {
        "refresh_index" => {
            let params: RefreshParams = parse_params(params)?;
            let root = engine.resolve_root(&params.root_path)?;
            let summary = engine
                .refresh_index(
                    &root,
                    params.force_full_scan,
                    &glob_list(params.include.as_ref()),
                    &glob_list(params.exclude.as_ref()),
                )
                .await?;
            Ok(serde_json::to_value(summary)?)
        }
        "search_code" => {
            let params: SearchParams = parse_params(params)?;
            let root = engine.resolve_root(&params.root_path)?;
            let hits = retriever::search_code(
                engine,
                &root,
                &params.query,
                params.limit,
                &glob_list(params.include.as_ref()),
                &glob_list(params.exclude.as_ref()),
            )
            .await?;
            Ok(serde_json::to_value(hits)?)
        }
        "get_stats" => {
            let params: StatsParams = parse_params(params)?;
            let root = engine.resolve_root(&params.root_path)?;
            let stats = retriever::get_stats(engine, &root).await?;
            Ok(serde_json::to_value(stats)?)
        }
        "find_definition" => {
            let params: DefinitionParams = parse_params(params)?;
            let root = engine.resolve_root(&params.root_path)?;
            let hits = retriever::find_definition(
                engine,
                &root,
                &params.symbol,
                params.filename.as_deref(),
                params.line,
            )?;
            Ok(serde_json::to_value(hits)?)
        }
        "find_references" => {
            let params: ReferencesParams = parse_params(params)?;
            let root = engine.resolve_root(&params.root_path)?;
            let hits = retriever::find_references(engine, &root, &params.symbol)?;
            Ok(serde_json::to_value(hits)?)
        }
        _ => Err(anyhow!("method not found: {method}")),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|err| anyhow!("invalid params: {err}"))
}

/// Accept a glob scope as a single string or a list of strings.
fn glob_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(one)) => vec![one.clone()],
        Some(Value::Array(many)) => many
            .iter()
            .filter_map(|item| item.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

fn jsonrpc_result(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn jsonrpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_list_accepts_string_or_array() {
        assert_eq!(
            glob_list(Some(&json!("tests/**"))),
            vec!["tests/**".to_string()]
        );
        assert_eq!(
            glob_list(Some(&json!(["a/**", "b/**"]))),
            vec!["a/**".to_string(), "b/**".to_string()]
        );
        assert!(glob_list(None).is_empty());
    }

    #[test]
    fn error_frames_have_jsonrpc_shape() {
        let frame = jsonrpc_error(json!(7), -32700, "parse error");
        assert_eq!(frame["jsonrpc"], "2.0");
        assert_eq!(frame["id"], 7);
        assert_eq!(frame["error"]["code"], -32700);
    }
}
