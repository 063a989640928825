//! Common test utilities for in-process API testing.
//!
//! The fixture builds the real router and state with a mock fetcher and
//! archiver, so every request runs without a data source or remote store.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use curator_core::{
    create_authenticator, load_config_from_str,
    testing::{MockArchiver, MockFetcher},
    BatchAllocator, Config, SqliteBatchStore,
};
use curator_server::{api::create_router, state::AppState};

/// Rows the mock fetcher writes per batch.
pub const ROWS_PER_BATCH: usize = 3;

/// In-process server with controllable mocks.
pub struct TestFixture {
    pub router: Router,
    pub fetcher: Arc<MockFetcher>,
    pub archiver: Arc<MockArchiver>,
    pub temp_dir: TempDir,
    api_key: Option<String>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub raw: Vec<u8>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Fixture whose API requires `key`; requests send it automatically.
    pub fn with_api_key(key: &str) -> Self {
        Self::build(Some(key.to_string()))
    }

    fn build(api_key: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().display().to_string();
        let auth = match &api_key {
            Some(key) => format!("method = \"api_key\"\napi_key = \"{key}\""),
            None => "method = \"none\"".to_string(),
        };
        let config: Config = load_config_from_str(&format!(
            r#"
[auth]
{auth}

[review]
fetched_dir = "{root}/fetched_data"
edit_state_dir = "{root}/edit_states"

[archive]
accepted_dir = "{root}/processed_data"
rejected_dir = "{root}/rejected_data"
"#
        ))
        .expect("Failed to parse test config");

        let fetcher = Arc::new(MockFetcher::new(
            &config.review.fetched_dir,
            ROWS_PER_BATCH,
        ));
        let archiver = Arc::new(MockArchiver::new(temp_dir.path().join("archive")));
        let store = Arc::new(SqliteBatchStore::in_memory().expect("Failed to create store"));
        let allocator = Arc::new(BatchAllocator::new(
            store.clone(),
            store,
            fetcher.clone(),
            config.allocator_config(),
        ));
        let authenticator =
            create_authenticator(&config.auth).expect("Failed to create authenticator");

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            allocator,
            archiver.clone(),
        ));

        Self {
            router: create_router(state),
            fetcher,
            archiver,
            temp_dir,
            api_key,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> TestResponse {
        self.request("POST", path, body).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> TestResponse {
        self.request("PATCH", path, Some(body)).await
    }

    /// Send a request without the fixture's credentials.
    pub async fn get_anonymous(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let raw = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        let body = serde_json::from_slice(&raw).unwrap_or(Value::Null);
        TestResponse { status, body, raw }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
