// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

//! The JSON HTTP API in front of a [`VoteLedger`].
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /api/vote` | record `{sessionId, index, address}` |
//! | `GET /api/votes/winner?sessionId=` | leading index and counts |
//! | `GET /api/votes?sessionId=` | ballots of a session |
//! | `GET /api/vote/status?sessionId=&address=` | whether an address voted |
//! | `GET /api/sessions` | sessions with at least one vote |
//!
//! Errors are answered as `{"error": "<message>"}`: `400` for bad input and
//! duplicate votes, `500` when the ledger itself failed.

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::ledger::VoteLedger;
use crate::storage::Storage;
use crate::SessionId;
use hyper::body::HttpBody;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use slog::Logger;
use std::convert::Infallible;
use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const VOTE_PATH: &str = "/api/vote";
const WINNER_PATH: &str = "/api/votes/winner";
const VOTES_PATH: &str = "/api/votes";
const STATUS_PATH: &str = "/api/vote/status";
const SESSIONS_PATH: &str = "/api/sessions";

/// Shared by every connection of one server.
pub struct ServerState<T: Storage> {
    ledger: Arc<VoteLedger<T>>,
    max_body_bytes: usize,
    logger: Logger,
}

impl<T: Storage> ServerState<T> {
    /// Wraps a ledger for serving with the limits from `cfg`.
    pub fn new(cfg: &Config, ledger: Arc<VoteLedger<T>>, logger: &Logger) -> ServerState<T> {
        ServerState {
            ledger,
            max_body_bytes: cfg.max_body_bytes,
            logger: logger.new(o!("component" => "http")),
        }
    }
}

#[derive(Debug, PartialEq)]
enum ApiError {
    BadRequest(String),
    PayloadTooLarge,
    MethodNotAllowed(&'static str),
    NotFound,
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> ApiError {
        if e.is_client_error() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

impl ApiError {
    fn into_response(self) -> Response<Body> {
        let (status, msg) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body too large".to_owned(),
            ),
            ApiError::MethodNotAllowed(allow) => {
                let mut resp = json_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    &json!({ "error": "method not allowed" }),
                );
                resp.headers_mut()
                    .insert(ALLOW, HeaderValue::from_static(allow));
                return resp;
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_owned()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        json_response(status, &json!({ "error": msg }))
    }
}

type ApiResult = std::result::Result<Value, ApiError>;

fn json_response(status: StatusCode, body: &Value) -> Response<Body> {
    let mut resp = Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

/// Binds `cfg.listen_addr` and serves until `shutdown` resolves.
pub async fn serve<T, F>(
    cfg: &Config,
    ledger: Arc<VoteLedger<T>>,
    shutdown: F,
    logger: &Logger,
) -> Result<()>
where
    T: Storage + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    cfg.validate()?;
    let listener = TcpListener::bind(cfg.socket_addr()?)?;
    serve_on(listener, cfg, ledger, shutdown, logger).await
}

/// Serves on an already bound listener until `shutdown` resolves. In-flight
/// requests are allowed to finish.
pub async fn serve_on<T, F>(
    listener: TcpListener,
    cfg: &Config,
    ledger: Arc<VoteLedger<T>>,
    shutdown: F,
    logger: &Logger,
) -> Result<()>
where
    T: Storage + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    let state = Arc::new(ServerState::new(cfg, ledger, logger));
    let addr = listener.local_addr()?;

    let make_svc = make_service_fn(move |_| {
        let state = Arc::clone(&state);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                handle_request(req, Arc::clone(&state))
            }))
        }
    });

    let server = Server::from_tcp(listener)?.serve(make_svc);
    info!(logger, "vote ledger listening"; "addr" => %addr);
    server.with_graceful_shutdown(shutdown).await?;
    info!(logger, "vote ledger stopped"; "addr" => %addr);
    Ok(())
}

/// Routes one request. Never fails; errors become JSON error responses.
pub async fn handle_request<T>(
    req: Request<Body>,
    state: Arc<ServerState<T>>,
) -> std::result::Result<Response<Body>, Infallible>
where
    T: Storage + Send + Sync + 'static,
{
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().unwrap_or("").to_owned();
    debug!(state.logger, "request"; "method" => %method, "path" => &path);

    let res = match (path.as_str(), &method) {
        (VOTE_PATH, &Method::POST) => match read_body(req.into_body(), state.max_body_bytes).await {
            Ok(body) => blocking(&state, move |ledger| post_vote(ledger, &body)).await,
            Err(e) => Err(e),
        },
        (VOTE_PATH, _) => Err(ApiError::MethodNotAllowed("POST")),
        (WINNER_PATH, &Method::GET) => blocking(&state, move |l| get_winner(l, &query)).await,
        (VOTES_PATH, &Method::GET) => blocking(&state, move |l| get_votes(l, &query)).await,
        (STATUS_PATH, &Method::GET) => blocking(&state, move |l| get_status(l, &query)).await,
        (SESSIONS_PATH, &Method::GET) => {
            blocking(&state, |l| Ok(json!({ "sessions": l.sessions() }))).await
        }
        (WINNER_PATH, _) | (VOTES_PATH, _) | (STATUS_PATH, _) | (SESSIONS_PATH, _) => {
            Err(ApiError::MethodNotAllowed("GET"))
        }
        _ => Err(ApiError::NotFound),
    };

    Ok(match res {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(ApiError::Internal(msg)) => {
            error!(state.logger, "request failed"; "method" => %method, "path" => &path, "err" => &msg);
            ApiError::Internal(msg).into_response()
        }
        Err(e) => e.into_response(),
    })
}

/// Runs a handler on the blocking pool. The ledger guards its index with a
/// std lock held across storage writes and syncs, which must not stall the
/// reactor threads.
async fn blocking<T, F>(state: &Arc<ServerState<T>>, f: F) -> ApiResult
where
    T: Storage + Send + Sync + 'static,
    F: FnOnce(&VoteLedger<T>) -> ApiResult + Send + 'static,
{
    let ledger = Arc::clone(&state.ledger);
    tokio::task::spawn_blocking(move || f(&ledger))
        .await
        .map_err(|e| ApiError::Internal(format!("request handler failed: {}", e)))?
}

async fn read_body(mut body: Body, limit: usize) -> std::result::Result<Vec<u8>, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk =
            chunk.map_err(|e| ApiError::BadRequest(format!("failed to read body: {}", e)))?;
        if buf.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteRequest {
    #[serde(default)]
    session_id: Value,
    #[serde(default)]
    index: Value,
    #[serde(default)]
    address: Value,
}

fn post_vote<T: Storage>(ledger: &VoteLedger<T>, body: &[u8]) -> ApiResult {
    let req: VoteRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))?;
    let session_id = parse_u64("sessionId", &req.session_id)?;
    let index = parse_u64("index", &req.index)?;
    let address = match &req.address {
        Value::Null => return Err(ApiError::BadRequest("missing address".to_owned())),
        Value::String(s) => s.as_str(),
        _ => return Err(ApiError::BadRequest("invalid address".to_owned())),
    };

    ledger.record_vote(session_id, index, address, now_millis())?;
    Ok(json!({ "ok": true }))
}

fn get_winner<T: Storage>(ledger: &VoteLedger<T>, query: &str) -> ApiResult {
    let session_id = session_from_query(query)?;
    let result = ledger.compute_winner(session_id);
    Ok(json!({
        "winningIndex": result.winning_index,
        "counts": result.counts,
    }))
}

fn get_votes<T: Storage>(ledger: &VoteLedger<T>, query: &str) -> ApiResult {
    let session_id = session_from_query(query)?;
    let votes: Vec<Value> = ledger
        .session_votes(session_id)
        .into_iter()
        .map(|v| {
            json!({
                "sessionId": v.session_id,
                "address": v.address,
                "index": v.index,
                "timestamp": v.timestamp,
            })
        })
        .collect();
    Ok(json!({ "sessionId": session_id, "votes": votes }))
}

fn get_status<T: Storage>(ledger: &VoteLedger<T>, query: &str) -> ApiResult {
    let session_id = session_from_query(query)?;
    let address = match query_param(query, "address")? {
        Some(a) if !a.trim().is_empty() => a,
        _ => return Err(ApiError::BadRequest("missing address".to_owned())),
    };
    Ok(json!({ "hasVoted": ledger.has_voted(session_id, &address) }))
}

fn session_from_query(query: &str) -> std::result::Result<SessionId, ApiError> {
    match query_param(query, "sessionId")? {
        Some(v) if !v.is_empty() => parse_u64("sessionId", &Value::String(v)),
        _ => Err(ApiError::BadRequest("missing sessionId".to_owned())),
    }
}

/// First value of `key` in a query string, percent-decoded. Keys are
/// matched verbatim.
fn query_param(query: &str, key: &str) -> std::result::Result<Option<String>, ApiError> {
    let raw = query.split('&').find_map(|pair| {
        let mut kv = pair.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some(k), Some(v)) if k == key => Some(v),
            (Some(k), None) if k == key => Some(""),
            _ => None,
        }
    });
    match raw {
        Some(v) => percent_decode(v)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid encoding of {}", key))),
        None => Ok(None),
    }
}

/// Decodes `%XX` sequences and `+` as space. `None` for a truncated or
/// non-hex escape, or if the result is not UTF-8.
fn percent_decode(input: &str) -> Option<String> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'%' => {
                let hi = (bytes.next()? as char).to_digit(16)?;
                let lo = (bytes.next()? as char).to_digit(16)?;
                out.push((hi * 16 + lo) as u8);
            }
            b'+' => out.push(b' '),
            _ => out.push(b),
        }
    }
    String::from_utf8(out).ok()
}

/// Accepts a non-negative integer given either as a JSON number or as a
/// decimal string.
fn parse_u64(field: &str, v: &Value) -> std::result::Result<u64, ApiError> {
    let parsed = match v {
        Value::Null => return Err(ApiError::BadRequest(format!("missing {}", field))),
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ApiError::BadRequest(format!("invalid {}", field)))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
