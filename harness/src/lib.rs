// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

/*!

This module contains a test harness for the vote ledger. It starts the HTTP API on an
ephemeral port and talks to it the way the dApp frontend does.

*/

#![deny(missing_docs)]

use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Method, Request, StatusCode};
use serde_json::Value;
use slog::Logger;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use vote_ledger::{server, Config, Storage, VoteLedger};

/// A ledger served over HTTP on a local ephemeral port.
pub struct TestServer<T: Storage> {
    addr: SocketAddr,
    ledger: Arc<VoteLedger<T>>,
    client: Client<HttpConnector>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<vote_ledger::Result<()>>,
}

impl<T> TestServer<T>
where
    T: Storage + Send + Sync + 'static,
{
    /// Starts serving `ledger`. Must be called from within a tokio runtime.
    pub fn start(cfg: Config, ledger: Arc<VoteLedger<T>>, logger: &Logger) -> TestServer<T> {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();

        let served = Arc::clone(&ledger);
        let logger = logger.clone();
        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            server::serve_on(listener, &cfg, served, shutdown, &logger).await
        });

        TestServer {
            addr,
            ledger,
            client: Client::new(),
            shutdown: Some(tx),
            handle,
        }
    }

    /// The address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The ledger behind the server.
    pub fn ledger(&self) -> &VoteLedger<T> {
        &self.ledger
    }

    /// Sends a request and decodes the JSON answer.
    pub async fn request(&self, method: Method, path: &str, body: Option<&str>) -> (StatusCode, Value) {
        let uri = format!("http://{}{}", self.addr, path);
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(Body::from(body.unwrap_or("").to_owned()))
            .expect("build request");
        let resp = self.client.request(req).await.expect("send request");
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body())
            .await
            .expect("read response");
        let value = serde_json::from_slice(&bytes).expect("response is json");
        (status, value)
    }

    /// `POST /api/vote`.
    pub async fn vote(&self, session_id: u64, index: u64, address: &str) -> (StatusCode, Value) {
        let body = serde_json::json!({
            "sessionId": session_id,
            "index": index,
            "address": address,
        })
        .to_string();
        self.request(Method::POST, "/api/vote", Some(&body)).await
    }

    /// `GET /api/votes/winner`.
    pub async fn winner(&self, session_id: u64) -> (StatusCode, Value) {
        let path = format!("/api/votes/winner?sessionId={}", session_id);
        self.request(Method::GET, &path, None).await
    }

    /// Shuts the server down gracefully and waits for it to exit.
    pub async fn stop(mut self) -> vote_ledger::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.expect("server task panicked")
    }
}
