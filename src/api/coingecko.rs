use crate::config::Config;
use crate::error::{PipelineError, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};
use urlencoding::encode;

#[derive(Clone)]
pub struct CoinGeckoClient {
    client: Client,
    config: Config,
}

impl CoinGeckoClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn simple_price_url(&self) -> String {
        let ids = self.config.ids.join(",");
        let vs_currencies = self.config.vs_currencies.join(",");
        format!(
            "{}/simple/price?ids={}&vs_currencies={}&include_market_cap={}&include_24hr_vol={}&include_24hr_change={}&include_last_updated_at={}",
            self.config.coingecko_base_url,
            encode(&ids),
            encode(&vs_currencies),
            self.config.include_market_cap,
            self.config.include_24hr_vol,
            self.config.include_24hr_change,
            self.config.include_last_updated_at
        )
    }

    /// Fetches the current price snapshot as raw JSON.
    pub async fn fetch_simple_price(&self) -> Result<Value> {
        let url = self.simple_price_url();
        debug!("Fetching prices from CoinGecko: {}", url);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("CoinGecko raw response: {}", body);
            return Err(PipelineError::ApiError {
                status: status.as_u16(),
                message: format!("CoinGecko API returned status: {}", status),
            });
        }

        let text = response.text().await?;
        match serde_json::from_str::<Value>(&text) {
            Ok(data) => Ok(data),
            Err(e) => {
                error!("CoinGecko raw response: {}", text);
                Err(PipelineError::JsonError(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config_for, spawn_price_api};
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_url_carries_every_query_parameter() {
        let mut config = config_for("http://localhost:1/api/v3", &std::env::temp_dir());
        config.include_24hr_vol = false;
        let client = CoinGeckoClient::new(config).unwrap();
        assert_eq!(
            client.simple_price_url(),
            "http://localhost:1/api/v3/simple/price?ids=bitcoin%2Cethereum%2Ctether&vs_currencies=usd%2Cthb\
             &include_market_cap=true&include_24hr_vol=false&include_24hr_change=true&include_last_updated_at=true"
        );
    }

    #[tokio::test]
    async fn test_fetch_returns_response_body() {
        let body = r#"{"bitcoin":{"usd":67000.5,"usd_market_cap":1.3e12}}"#;
        let api = spawn_price_api(StatusCode::OK, body).await;
        let client = CoinGeckoClient::new(config_for(&api.base_url, &std::env::temp_dir())).unwrap();

        let data = client.fetch_simple_price().await.unwrap();
        assert_eq!(data, json!({"bitcoin": {"usd": 67000.5, "usd_market_cap": 1.3e12}}));

        let queries = api.queries();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("vs_currencies=usd%2Cthb"));
    }

    #[tokio::test]
    async fn test_error_status_is_api_error() {
        let api = spawn_price_api(StatusCode::TOO_MANY_REQUESTS, r#"{"status":"throttled"}"#).await;
        let client = CoinGeckoClient::new(config_for(&api.base_url, &std::env::temp_dir())).unwrap();

        match client.fetch_simple_price().await {
            Err(PipelineError::ApiError { status, .. }) => assert_eq!(status, 429),
            other => panic!("expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_is_json_error() {
        let api = spawn_price_api(StatusCode::OK, "<html>maintenance</html>").await;
        let client = CoinGeckoClient::new(config_for(&api.base_url, &std::env::temp_dir())).unwrap();

        assert!(matches!(
            client.fetch_simple_price().await,
            Err(PipelineError::JsonError(_))
        ));
    }
}
