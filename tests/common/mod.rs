//! Shared fixtures for integration tests

#![allow(dead_code)]

use axum::{body::Body, http::Request, Router};
use linkstat::app::Services;
use linkstat::config::{
    AnalyticsConfig, AuthConfig, Config, DatabaseBackend, DatabaseConfig, LinkConfig,
    ServerConfig,
};
use linkstat::storage::{Backend, SqliteStorage, Storage};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower::{Layer, ServiceExt};

pub const ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Mobile Safari/537.36";
pub const WINDOWS_CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const GOOGLEBOT: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

pub const DEFAULT_REDIRECT: &str = "https://example.org/";
pub const API_KEY: &str = "test-key";

pub fn test_config(export_dir: &Path) -> Config {
    Config {
        database: DatabaseConfig {
            backend: DatabaseBackend::Sqlite,
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        api_server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        redirect_server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        },
        auth: AuthConfig {
            api_keys: vec![API_KEY.to_string()],
        },
        links: LinkConfig {
            redirect_base_url: "http://sho.rt".to_string(),
            default_redirect_url: DEFAULT_REDIRECT.to_string(),
            cache_max_entries: 100,
            cache_ttl_secs: 60,
        },
        analytics: AnalyticsConfig {
            export_dir: export_dir.to_path_buf(),
            ..Default::default()
        },
    }
}

/// One in-memory SQLite database serving both links and clicks
pub async fn create_test_backend() -> (Arc<SqliteStorage>, Backend) {
    // a single connection, otherwise each pooled connection gets its own memory db
    let storage = Arc::new(SqliteStorage::new("sqlite::memory:", 1).await.unwrap());
    storage.init().await.unwrap();
    let backend = Backend {
        links: storage.clone(),
        clicks: storage.clone(),
    };
    (storage, backend)
}

pub async fn create_test_services(config: &Config) -> (Arc<SqliteStorage>, Services) {
    let (storage, backend) = create_test_backend().await;
    (storage, Services::new(config, backend))
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
pub struct TestConnectInfoLayer(pub SocketAddr);

impl Default for TestConnectInfoLayer {
    fn default() -> Self {
        Self(SocketAddr::from(([127, 0, 0, 1], 12345)))
    }
}

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware {
            inner,
            addr: self.0,
        }
    }
}

#[derive(Clone)]
pub struct TestConnectInfoMiddleware<S> {
    inner: S,
    addr: SocketAddr,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(self.addr));
        self.inner.call(req)
    }
}

/// Send a redirect request with the given user agent and referrer
pub async fn visit(
    router: &Router,
    key: &str,
    user_agent: &str,
    referer: &str,
) -> axum::response::Response {
    let mut builder = Request::builder()
        .uri(format!("/{key}"))
        .header("user-agent", user_agent);
    if !referer.is_empty() {
        builder = builder.header("referer", referer);
    }

    router
        .clone()
        .layer(TestConnectInfoLayer::default())
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn create_link(storage: &dyn Storage, id: i64, url: &str) -> String {
    storage.create(id, "Test link", url).await.unwrap();
    linkstat::keys::encode(id as u64)
}
