//! An in-process stand-in for the image-processing endpoint.
//!
//! ```
//! use imagebench_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/upload/");
//!    // point the benchmark at the URL...
//! }
//! ```
//!
//! The server accepts `POST /upload/` with a multipart `file` field and an optional `rotation`
//! query parameter, like the real endpoint. Instead of processing the image it behaves according
//! to its [`Behavior`], and records statistics about the requests it received.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use serde::Deserialize;

/// How the server answers uploads.
#[derive(Clone, Copy, Debug, Default)]
pub enum Behavior {
    /// Returns the uploaded file as the processed image.
    #[default]
    Echo,
    /// Waits before echoing the file.
    Delay(Duration),
    /// Answers every upload with the given status code.
    Fail(u16),
}

#[derive(Debug, Default)]
struct Stats {
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    rotations: Mutex<Vec<i32>>,
    file_names: Mutex<Vec<String>>,
}

#[derive(Debug)]
struct ServerState {
    behavior: Behavior,
    stats: Stats,
}

/// Decrements the in-flight counter when a request completes or is cancelled.
struct InFlight<'a>(&'a Stats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a Stats) -> Self {
        stats.requests.fetch_add(1, Ordering::SeqCst);
        let current = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(current, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    rotation: Option<i32>,
}

async fn upload(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Response {
    let _guard = InFlight::enter(&state.stats);

    if let Some(rotation) = params.rotation {
        state.stats.rotations.lock().unwrap().push(rotation);
    }

    let mut file: Option<Bytes> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        if let Some(name) = field.file_name() {
            state.stats.file_names.lock().unwrap().push(name.to_owned());
        }
        file = field.bytes().await.ok();
    }

    match state.behavior {
        Behavior::Echo => {}
        Behavior::Delay(delay) => tokio::time::sleep(delay).await,
        Behavior::Fail(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, "processing failed").into_response();
        }
    }

    match file {
        Some(body) => ([(CONTENT_TYPE, "image/png")], body).into_response(),
        None => (StatusCode::BAD_REQUEST, "No file uploaded").into_response(),
    }
}

/// An in-process test server for use in integration tests.
///
/// It listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: Arc<ServerState>,
}

impl TestServer {
    /// Starts a server that echoes every upload.
    pub async fn new() -> Self {
        Self::with_behavior(Behavior::Echo).await
    }

    /// Starts a server with the given behavior.
    pub async fn with_behavior(behavior: Behavior) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = Arc::new(ServerState {
            behavior,
            stats: Stats::default(),
        });
        let router = Router::new()
            .route("/upload/", post(upload))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Returns the URL of the upload endpoint.
    pub fn upload_url(&self) -> String {
        self.url("/upload/")
    }

    /// Number of uploads received so far.
    pub fn requests(&self) -> usize {
        self.state.stats.requests.load(Ordering::SeqCst)
    }

    /// Highest number of uploads handled at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.stats.max_in_flight.load(Ordering::SeqCst)
    }

    /// All `rotation` query parameters received, in arrival order.
    pub fn rotations(&self) -> Vec<i32> {
        self.state.stats.rotations.lock().unwrap().clone()
    }

    /// File names of all uploaded `file` parts, in arrival order.
    pub fn file_names(&self) -> Vec<String> {
        self.state.stats.file_names.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
