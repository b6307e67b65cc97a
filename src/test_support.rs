use crate::config::Config;
use axum::extract::RawQuery;
use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A fake `/api/v3/simple/price` endpoint serving a fixed response.
pub struct FakePriceApi {
    pub base_url: String,
    queries: Arc<Mutex<Vec<String>>>,
}

impl FakePriceApi {
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

pub async fn spawn_price_api(status: StatusCode, body: &'static str) -> FakePriceApi {
    let queries = Arc::new(Mutex::new(Vec::new()));
    let seen = queries.clone();

    let app = Router::new().route(
        "/api/v3/simple/price",
        get(move |RawQuery(query): RawQuery| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(query.unwrap_or_default());
                (status, [(header::CONTENT_TYPE, "application/json")], body)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakePriceApi {
        base_url: format!("http://{}/api/v3", addr),
        queries,
    }
}

/// Fresh directory under the system temp dir.
pub fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("coingecko-pipeline-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Default configuration pointed at a fake API and a scratch directory.
pub fn config_for(base_url: &str, root: &Path) -> Config {
    let mut config = Config::from_lookup(|_| None).unwrap();
    config.coingecko_base_url = base_url.to_string();
    config.bucket_root = root.join("buckets");
    config.warehouse_dir = root.join("warehouse");
    config
}
