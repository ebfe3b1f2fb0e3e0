#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const SESSION_TOKEN: &str = "test-session-token";

/// Key material as it is usually kept in an environment variable: the
/// base64 body without the PEM armor.
pub fn bare_private_key() -> String {
    include_str!("data/rsa_key.p8")
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect()
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

/// What the stand-in server answers. Statement replies are served in order,
/// to the statement itself and then to each result poll; the last one
/// repeats.
#[derive(Debug, Clone)]
pub struct Replies {
    pub login: Value,
    pub query: Vec<Value>,
}

impl Replies {
    pub fn put(data: Value) -> Self {
        Self {
            login: login_ok(),
            query: vec![success(data)],
        }
    }
}

pub fn success(data: Value) -> Value {
    json!({"data": data, "success": true, "message": null, "code": null})
}

pub fn login_ok() -> Value {
    json!({
        "data": {"token": SESSION_TOKEN, "masterToken": "master", "validityInSeconds": 3600},
        "success": true,
        "message": null,
        "code": null
    })
}

pub fn failure(code: &str, message: &str) -> Value {
    json!({"data": null, "success": false, "message": message, "code": code})
}

/// Reply to a statement that is still running.
pub fn in_progress(result_url: &str) -> Value {
    json!({
        "data": {"queryId": "01b2c3d4-0000-1111-0000-000000000001", "getResultUrl": result_url},
        "success": true,
        "message": "Asynchronous execution in progress. Use provided query id to perform query monitoring and management.",
        "code": "333334"
    })
}

struct State {
    requests: Mutex<Vec<Recorded>>,
    login: Value,
    query: Mutex<VecDeque<Value>>,
}

impl State {
    fn next_query_reply(&self) -> Value {
        let mut replies = self.query.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap_or_default()
        } else {
            replies.front().cloned().unwrap_or_default()
        }
    }
}

/// A local HTTP server answering the login, query and session endpoints the
/// way Snowflake does.
pub struct MockSnowflake {
    pub address: SocketAddr,
    state: Arc<State>,
}

impl MockSnowflake {
    pub async fn start(replies: Replies) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let state = Arc::new(State {
            requests: Mutex::new(Vec::new()),
            login: replies.login,
            query: Mutex::new(replies.query.into()),
        });

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    let service = service_fn(move |request| handle(request, Arc::clone(&shared)));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { address, state }
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

async fn handle(
    request: Request<Incoming>,
    state: Arc<State>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let authorization = request
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = request
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    state.requests.lock().unwrap().push(Recorded {
        path: path.clone(),
        query,
        authorization,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let reply = match path.as_str() {
        "/session/v1/login-request" => state.login.clone(),
        "/queries/v1/query-request" => state.next_query_reply(),
        "/session" => json!({"data": null, "success": true, "message": null, "code": null}),
        result if result.starts_with("/queries/") && result.ends_with("/result") => {
            state.next_query_reply()
        }
        _ => {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::NOT_FOUND;
            return Ok(response);
        }
    };
    Ok(Response::new(Full::new(Bytes::from(reply.to_string()))))
}
