//! In-process mock of the graph server's transactional HTTP endpoint.
//!
//! Speaks just enough HTTP/1.1 for the client under test: begin hands out a
//! transaction URL via `Location`, statements run against staged state,
//! commit promotes staged entities, rollback (DELETE) discards them, and
//! unknown paths answer 404 with a classname-style error body.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value as Json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

const EXPIRES: &str = "Tue, 10 May 2016 12:42:14 +0000";

#[derive(Default)]
struct ServerState {
    next_tx: u64,
    next_node: i64,
    /// Open transaction id -> node ids staged inside it.
    open: HashMap<u64, Vec<i64>>,
    committed: HashSet<i64>,
}

pub struct MockGraphServer {
    base_url: String,
    state: Arc<Mutex<ServerState>>,
}

impl MockGraphServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");
        let state = Arc::new(Mutex::new(ServerState::default()));

        let accept_state = state.clone();
        let accept_base = base_url.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(serve_conn(stream, accept_state.clone(), accept_base.clone()));
            }
        });

        Self { base_url, state }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forget every open transaction, as the server does on expiry.
    pub async fn expire_all_transactions(&self) {
        self.state.lock().await.open.clear();
    }
}

async fn serve_conn(mut stream: TcpStream, state: Arc<Mutex<ServerState>>, base: String) {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let header_end = loop {
            if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                break pos;
            }
            let mut chunk = [0u8; 4096];
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next().unwrap_or_default().to_string();
        let mut content_length = 0usize;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }

        let body_start = header_end + 4;
        while buf.len() < body_start + content_length {
            let mut chunk = [0u8; 4096];
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        let body: Vec<u8> = buf[body_start..body_start + content_length].to_vec();
        buf.drain(..body_start + content_length);

        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or("").to_string();
        let path = parts.next().unwrap_or("").to_string();

        let response = route(&method, &path, &body, &state, &base).await;
        if stream.write_all(&response).await.is_err() {
            return;
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn route(
    method: &str,
    path: &str,
    body: &[u8],
    state: &Mutex<ServerState>,
    base: &str,
) -> Vec<u8> {
    let statements = parse_statements(body);

    if method == "POST" && path == "/db/data/transaction" {
        let mut state = state.lock().await;
        state.next_tx += 1;
        let tx_id = state.next_tx;
        state.open.insert(tx_id, Vec::new());
        let (results, errors) = run_statements(&mut state, tx_id, &statements, base);
        let tx_url = format!("{base}/db/data/transaction/{tx_id}");
        let body = json!({
            "commit": format!("{tx_url}/commit"),
            "results": results,
            "errors": errors,
            "transaction": {"expires": EXPIRES},
        });
        return http_response(201, "Created", Some(&tx_url), Some(&body));
    }

    if let Some(rest) = path.strip_prefix("/db/data/transaction/") {
        let (tx_part, is_commit) = match rest.strip_suffix("/commit") {
            Some(tx_part) => (tx_part, true),
            None => (rest, false),
        };
        if let Ok(tx_id) = tx_part.parse::<u64>() {
            return transaction_route(method, tx_id, is_commit, &statements, state, base).await;
        }
    }

    not_found(path)
}

async fn transaction_route(
    method: &str,
    tx_id: u64,
    is_commit: bool,
    statements: &[Json],
    state: &Mutex<ServerState>,
    base: &str,
) -> Vec<u8> {
    let mut state = state.lock().await;
    if !state.open.contains_key(&tx_id) {
        let body = json!({
            "errors": [{
                "code": "org.neo4j.server.rest.transaction.TransactionNotFoundException",
                "message": format!("transaction {tx_id} not found"),
            }],
        });
        return http_response(404, "Not Found", None, Some(&body));
    }

    match (method, is_commit) {
        ("POST", true) => {
            let (results, errors) = run_statements(&mut state, tx_id, statements, base);
            if let Some(staged) = state.open.remove(&tx_id) {
                state.committed.extend(staged);
            }
            let body = json!({ "results": results, "errors": errors });
            http_response(200, "OK", None, Some(&body))
        }
        ("POST", false) => {
            let (results, errors) = run_statements(&mut state, tx_id, statements, base);
            let body = json!({
                "commit": format!("{base}/db/data/transaction/{tx_id}/commit"),
                "results": results,
                "errors": errors,
                "transaction": {"expires": EXPIRES},
            });
            http_response(200, "OK", None, Some(&body))
        }
        ("DELETE", false) => {
            state.open.remove(&tx_id);
            let body = json!({ "results": [], "errors": [] });
            http_response(200, "OK", None, Some(&body))
        }
        _ => not_found(&format!("/db/data/transaction/{tx_id}")),
    }
}

fn parse_statements(body: &[u8]) -> Vec<Json> {
    serde_json::from_slice::<Json>(body)
        .ok()
        .and_then(|json| json.get("statements").and_then(Json::as_array).cloned())
        .unwrap_or_default()
}

fn run_statements(
    state: &mut ServerState,
    tx_id: u64,
    statements: &[Json],
    base: &str,
) -> (Vec<Json>, Vec<Json>) {
    let mut results = Vec::new();
    let mut errors = Vec::new();
    for entry in statements {
        let text = entry.get("statement").and_then(Json::as_str).unwrap_or("");
        let params = entry.get("parameters").cloned().unwrap_or(json!({}));
        match run_statement(state, tx_id, text, &params, base) {
            Ok(result) => results.push(result),
            Err(error) => {
                errors.push(error);
                break;
            }
        }
    }
    (results, errors)
}

fn run_statement(
    state: &mut ServerState,
    tx_id: u64,
    text: &str,
    params: &Json,
    base: &str,
) -> Result<Json, Json> {
    if text.contains("UNWIND") {
        return Ok(json!({
            "columns": ["n"],
            "data": [{"rest": [1]}, {"rest": [2]}, {"rest": [3]}],
        }));
    }
    if text.starts_with("CREATE") {
        state.next_node += 1;
        let id = state.next_node;
        if let Some(staged) = state.open.get_mut(&tx_id) {
            staged.push(id);
        }
        let labels: Vec<&str> = if text.contains(":Person") {
            vec!["Person"]
        } else {
            vec![]
        };
        let data = match params {
            Json::Object(map) if !map.is_empty() => params.clone(),
            _ => json!({}),
        };
        if text.contains("RETURN id(a)") {
            return Ok(json!({"columns": ["id(a)"], "data": [{"rest": [id]}]}));
        }
        let node = json!({
            "self": format!("{base}/db/data/node/{id}"),
            "metadata": {"id": id, "labels": labels},
            "data": data,
        });
        return Ok(json!({"columns": ["a"], "data": [{"rest": [node]}]}));
    }
    if text.contains("count(a)") {
        let id = params.get("x").and_then(Json::as_i64).unwrap_or(-1);
        let count = i64::from(state.committed.contains(&id));
        return Ok(json!({"columns": ["count(a)"], "data": [{"rest": [count]}]}));
    }
    Err(json!({
        "code": "Neo.ClientError.Statement.SyntaxError",
        "message": format!("Invalid input '{text}'"),
    }))
}

fn not_found(path: &str) -> Vec<u8> {
    let body = json!({
        "errors": [{
            "code": "org.neo4j.server.rest.web.NodeNotFoundException",
            "message": format!("Cannot find resource at {path}"),
        }],
    });
    http_response(404, "Not Found", None, Some(&body))
}

fn http_response(status: u16, reason: &str, location: Option<&str>, body: Option<&Json>) -> Vec<u8> {
    let body_bytes = body
        .map(|b| serde_json::to_vec(b).unwrap_or_default())
        .unwrap_or_default();
    let mut head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
        body_bytes.len()
    );
    if let Some(location) = location {
        head.push_str(&format!("Location: {location}\r\n"));
    }
    head.push_str("\r\n");
    let mut response = head.into_bytes();
    response.extend_from_slice(&body_bytes);
    response
}
