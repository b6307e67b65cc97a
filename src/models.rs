use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Quote fields for one asset, keyed by `usd`, `usd_market_cap`, `usd_24h_vol`,
/// `usd_24h_change`, `last_updated_at` and so on.
pub type AssetQuote = BTreeMap<String, f64>;

/// Typed view of a `/simple/price` response, keyed by asset id.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct PriceSnapshot(pub BTreeMap<String, AssetQuote>);

impl PriceSnapshot {
    /// Best-effort parse. Returns `None` when the payload has drifted from
    /// the asset -> field -> number shape; the raw JSON is still stored.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn price(&self, asset: &str, currency: &str) -> Option<f64> {
        self.0.get(asset)?.get(currency).copied()
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Outcome of a single load into the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub objects: Vec<String>,
    pub rows_appended: u64,
    pub columns_added: Vec<String>,
    pub table_rows: i64,
}
