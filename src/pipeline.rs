use crate::api::CoinGeckoClient;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::{LoadReport, PriceSnapshot};
use crate::storage::{LocalBucket, Wildcard};
use crate::warehouse::{parse_ndjson, LoadOptions, Warehouse};
use chrono::NaiveDate;
use tracing::{info, warn};

pub struct PipelineService {
    coingecko_client: CoinGeckoClient,
    config: Config,
}

impl PipelineService {
    pub fn new(config: Config) -> Result<Self> {
        let coingecko_client = CoinGeckoClient::new(config.clone())?;

        Ok(Self {
            coingecko_client,
            config,
        })
    }

    /// `raw/coingecko/coingecko_price_<YYYYMMDD>.json` for the logical date.
    pub fn object_name(&self, logical_date: NaiveDate) -> String {
        format!(
            "{}/{}_{}.json",
            self.config.raw_prefix,
            self.config.file_stem,
            logical_date.format("%Y%m%d")
        )
    }

    /// Fetches the price snapshot and stores it as one dated object.
    pub async fn extract(&self, logical_date: NaiveDate) -> Result<String> {
        info!("Extracting CoinGecko prices for {}", logical_date);

        let data = self.coingecko_client.fetch_simple_price().await?;
        self.log_snapshot(&data);

        let object = self.object_name(logical_date);
        let payload = serde_json::to_string(&data)?;
        let bucket = LocalBucket::open(&self.config.bucket_root, &self.config.bucket_name).await?;
        if bucket.exists(&object).await? {
            warn!("Replacing existing object {}/{}", bucket.name(), object);
        }
        bucket.upload(&object, payload.as_bytes()).await?;

        info!("Wrote {}/{} ({} bytes)", bucket.name(), object, payload.len());
        Ok(object)
    }

    /// Appends every object matching the source pattern into the destination table.
    pub async fn load(&self) -> Result<LoadReport> {
        let wildcard = Wildcard::new(&self.config.source_pattern())?;
        let bucket = LocalBucket::open(&self.config.bucket_root, &self.config.bucket_name).await?;

        let objects = bucket.list_matching(&wildcard).await?;
        if objects.is_empty() {
            return Err(PipelineError::NoMatchingObjects(format!(
                "{}/{}",
                bucket.name(),
                wildcard.as_str()
            )));
        }

        let mut records = Vec::new();
        for object in &objects {
            let bytes = bucket.download(object).await?;
            let text = String::from_utf8(bytes).map_err(|_| PipelineError::InvalidRecord {
                object: object.clone(),
                line: 0,
                message: "object is not valid UTF-8".to_string(),
            })?;
            let parsed = parse_ndjson(object, &text)?;
            info!("Read {} records from {}", parsed.len(), object);
            records.extend(parsed);
        }

        let warehouse = Warehouse::open(
            &self.config.warehouse_dir,
            &self.config.dataset,
            self.config.max_connections,
        )
        .await?;
        let mut report = warehouse
            .load(&self.config.table, &records, LoadOptions::from_config(&self.config))
            .await?;
        report.objects = objects;

        if !report.columns_added.is_empty() {
            info!("Added columns to {}: {}", self.config.destination_table(), report.columns_added.join(", "));
        }
        info!(
            "Loaded {} rows from {} objects into {} ({} rows total)",
            report.rows_appended,
            report.objects.len(),
            self.config.destination_table(),
            report.table_rows
        );
        Ok(report)
    }

    /// Extract, then load. Load never starts if extract fails.
    pub async fn run(&self, logical_date: NaiveDate) -> Result<LoadReport> {
        self.extract(logical_date).await?;
        self.load().await
    }

    fn log_snapshot(&self, data: &serde_json::Value) {
        let snapshot = match PriceSnapshot::from_value(data) {
            Some(snapshot) => snapshot,
            None => {
                warn!("CoinGecko response does not match the price snapshot shape; storing as-is");
                return;
            }
        };

        let currency = self.config.vs_currencies.first().map(String::as_str).unwrap_or("usd");
        for asset in snapshot.assets() {
            match snapshot.price(asset, currency) {
                Some(price) => info!("[COINGECKO] {}/{}: {:.4}", asset, currency.to_uppercase(), price),
                None => warn!("[COINGECKO] {} has no {} price", asset, currency),
            }
        }
    }
}
