//! Simple mock HTTP server for exercising the delivery pipeline and the
//! query pass-through.
//!
//! Responses follow a script: each incoming request consumes the next
//! `(status, body)` entry, and the final entry repeats once the script is
//! exhausted. An empty script answers `200 {"ok":true}` forever.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is not valid JSON")
    }
}

#[derive(Clone)]
pub struct MockServer {
    pub addr: SocketAddr,
    received_requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    responses: Arc<Mutex<VecDeque<(u16, String)>>>,
}

impl MockServer {
    /// Starts a server on a random port that always answers `200 {"ok":true}`.
    pub async fn start() -> Self {
        Self::with_responses(Vec::new()).await
    }

    /// Starts a server that walks the given response script, repeating
    /// the last entry once the script is exhausted.
    pub async fn with_responses(script: Vec<(u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let received_requests = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(Mutex::new(
            script
                .into_iter()
                .map(|(status, body)| (status, body.to_string()))
                .collect::<VecDeque<_>>(),
        ));

        let requests_clone = received_requests.clone();
        let responses_clone = responses.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                let io = TokioIo::new(stream);
                let requests = requests_clone.clone();
                let responses = responses_clone.clone();

                tokio::spawn(async move {
                    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let requests = requests.clone();
                        let responses = responses.clone();
                        async move {
                            let method = req.method().to_string();
                            let path = req.uri().path().to_string();
                            let query = req.uri().query().map(str::to_string);
                            let headers: Vec<(String, String)> = req
                                .headers()
                                .iter()
                                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                                .collect();

                            let body = req
                                .into_body()
                                .collect()
                                .await
                                .map(|collected| collected.to_bytes().to_vec())
                                .unwrap_or_default();

                            requests.lock().unwrap().push(ReceivedRequest {
                                method,
                                path,
                                query,
                                headers,
                                body,
                            });

                            let (status, body) = {
                                let mut script = responses.lock().unwrap();
                                if script.len() > 1 {
                                    script.pop_front().unwrap()
                                } else if let Some(last) = script.front() {
                                    last.clone()
                                } else {
                                    (200, r#"{"ok":true}"#.to_string())
                                }
                            };

                            Ok::<_, hyper::http::Error>(
                                Response::builder()
                                    .status(status)
                                    .body(Full::new(Bytes::from(body)))
                                    .unwrap(),
                            )
                        }
                    });

                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        MockServer {
            addr,
            received_requests,
            responses,
        }
    }

    /// The base URL of the mock server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.received_requests.lock().unwrap().clone()
    }

    /// Requests whose path matches.
    pub fn requests_for_path(&self, path: &str) -> Vec<ReceivedRequest> {
        self.received_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|req| req.path == path)
            .cloned()
            .collect()
    }

    /// Waits until at least `count` requests have arrived, panicking
    /// after two seconds.
    pub async fn wait_for_requests(&self, count: usize) -> Vec<ReceivedRequest> {
        for _ in 0..200 {
            let requests = self.requests();
            if requests.len() >= count {
                return requests;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!(
            "mock server saw {} requests, expected at least {count}",
            self.requests().len()
        );
    }

    /// Replaces the remaining response script.
    #[allow(dead_code)]
    pub fn set_responses(&self, script: Vec<(u16, &str)>) {
        let mut responses = self.responses.lock().unwrap();
        *responses = script
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();
    }
}
