use crate::error::{PipelineError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// What happens to rows already in the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    Append,
    Truncate,
    Empty,
}

impl FromStr for WriteDisposition {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" | "write_append" => Ok(Self::Append),
            "truncate" | "write_truncate" => Ok(Self::Truncate),
            "empty" | "write_empty" => Ok(Self::Empty),
            other => Err(PipelineError::ConfigError(format!(
                "Invalid WRITE_DISPOSITION: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDisposition {
    CreateIfNeeded,
    CreateNever,
}

impl FromStr for CreateDisposition {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create_if_needed" => Ok(Self::CreateIfNeeded),
            "create_never" => Ok(Self::CreateNever),
            other => Err(PipelineError::ConfigError(format!(
                "Invalid CREATE_DISPOSITION: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub coingecko_base_url: String,
    pub ids: Vec<String>,
    pub vs_currencies: Vec<String>,
    pub include_market_cap: bool,
    pub include_24hr_vol: bool,
    pub include_24hr_change: bool,
    pub include_last_updated_at: bool,
    pub http_timeout_secs: u64,
    pub bucket_root: PathBuf,
    pub bucket_name: String,
    pub raw_prefix: String,
    pub file_stem: String,
    pub warehouse_dir: PathBuf,
    pub dataset: String,
    pub table: String,
    pub max_connections: u32,
    pub write_disposition: WriteDisposition,
    pub create_disposition: CreateDisposition,
    pub allow_field_addition: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let http_timeout_secs = var("HTTP_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| PipelineError::ConfigError("Invalid HTTP_TIMEOUT_SECS".to_string()))?;

        let max_connections = var("WAREHOUSE_MAX_CONNECTIONS", "5")
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                PipelineError::ConfigError("Invalid WAREHOUSE_MAX_CONNECTIONS".to_string())
            })?;

        let ids = split_list(&var("COINGECKO_IDS", "bitcoin,ethereum,tether"));
        if ids.is_empty() {
            return Err(PipelineError::ConfigError("COINGECKO_IDS is empty".to_string()));
        }
        let vs_currencies = split_list(&var("COINGECKO_VS_CURRENCIES", "usd,thb"));
        if vs_currencies.is_empty() {
            return Err(PipelineError::ConfigError(
                "COINGECKO_VS_CURRENCIES is empty".to_string(),
            ));
        }

        let table = var("WAREHOUSE_TABLE", "coingecko_price_tao");
        let dataset = var("WAREHOUSE_DATASET", "dataai_tao_34");
        for (key, value) in [("WAREHOUSE_TABLE", &table), ("WAREHOUSE_DATASET", &dataset)] {
            if !is_identifier(value) {
                return Err(PipelineError::ConfigError(format!("Invalid {}: {}", key, value)));
            }
        }

        Ok(Self {
            coingecko_base_url: var("COINGECKO_BASE_URL", "https://api.coingecko.com/api/v3")
                .trim_end_matches('/')
                .to_string(),
            ids,
            vs_currencies,
            include_market_cap: parse_flag(&var("COINGECKO_INCLUDE_MARKET_CAP", "true"), "COINGECKO_INCLUDE_MARKET_CAP")?,
            include_24hr_vol: parse_flag(&var("COINGECKO_INCLUDE_24HR_VOL", "true"), "COINGECKO_INCLUDE_24HR_VOL")?,
            include_24hr_change: parse_flag(&var("COINGECKO_INCLUDE_24HR_CHANGE", "true"), "COINGECKO_INCLUDE_24HR_CHANGE")?,
            include_last_updated_at: parse_flag(&var("COINGECKO_INCLUDE_LAST_UPDATED_AT", "true"), "COINGECKO_INCLUDE_LAST_UPDATED_AT")?,
            http_timeout_secs,
            bucket_root: PathBuf::from(var("BUCKET_ROOT", "./data/buckets")),
            bucket_name: var("BUCKET_NAME", "deb-gemini-code-assist-data-ai-tao-001"),
            raw_prefix: var("RAW_PREFIX", "raw/coingecko").trim_matches('/').to_string(),
            file_stem: var("FILE_STEM", "coingecko_price"),
            warehouse_dir: PathBuf::from(var("WAREHOUSE_DIR", "./data/warehouse")),
            dataset,
            table,
            max_connections,
            write_disposition: var("WRITE_DISPOSITION", "append").parse()?,
            create_disposition: var("CREATE_DISPOSITION", "create_if_needed").parse()?,
            allow_field_addition: parse_flag(&var("ALLOW_FIELD_ADDITION", "true"), "ALLOW_FIELD_ADDITION")?,
        })
    }

    /// `<dataset>.<table>`, as the warehouse names it.
    pub fn destination_table(&self) -> String {
        format!("{}.{}", self.dataset, self.table)
    }

    /// Wildcard over every raw object the extractor can produce.
    pub fn source_pattern(&self) -> String {
        format!("{}/{}_*.json", self.raw_prefix, self.file_stem)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(raw: &str, key: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(PipelineError::ConfigError(format!("Invalid {}", key))),
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
