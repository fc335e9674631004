//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which owns a temporary output directory and a
//! full [`AppContext`] wired to the process-based encoder control. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port for
//! connection-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use segmentd::config::Config;
use segmentd::server::{create_router, AppContext};
use segmentd::transcoding::{JobKind, ProcessEncoderControl, TranscodeJob};

pub const API_KEY: &str = "test-api-key";

pub struct TestHarness {
    pub ctx: AppContext,
    pub dir: TempDir,
}

impl TestHarness {
    /// Harness with authentication disabled.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Harness whose protected routes require [`API_KEY`].
    pub fn with_auth() -> Self {
        Self::build(true)
    }

    fn build(auth: bool) -> Self {
        let dir = tempfile::tempdir().expect("failed to create output dir");
        let mut config = Config::default();
        config.transcoding.output_dir = dir.path().to_path_buf();
        if auth {
            config.server.auth.enabled = true;
            config.server.auth.api_key = Some(API_KEY.to_string());
        }

        let ctx = AppContext::new(config, Arc::new(ProcessEncoderControl));
        Self { ctx, dir }
    }

    pub fn output_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file into the output directory and return its path.
    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("failed to write fixture");
        path
    }

    /// Register an HLS job writing `playlist_name` for the given owner.
    pub fn register_hls(&self, playlist_name: &str, device: &str, session: &str) -> PathBuf {
        let path = self.dir.path().join(playlist_name);
        self.ctx
            .registry
            .register(
                TranscodeJob::new(&path, JobKind::Hls)
                    .with_device(device)
                    .with_play_session(session),
            )
            .expect("failed to register job");
        path
    }

    pub fn active_requests(&self, output_path: &Path) -> usize {
        self.ctx
            .registry
            .get(output_path)
            .map(|job| job.active_request_count)
            .expect("job not registered")
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        create_router(self.ctx.clone())
            .oneshot(request)
            .await
            .expect("router failed")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        self.send(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Start an Axum server on a random port.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes()
        .to_vec()
}
