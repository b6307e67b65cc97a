pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod warehouse;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use models::{LoadReport, PriceSnapshot};
pub use pipeline::PipelineService;
