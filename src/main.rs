use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use coingecko_pipeline::{Config, PipelineService, Result};
use dotenv::dotenv;
use tracing::error;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Logical date of the run (YYYY-MM-DD), used to name the raw object
    #[arg(short, long)]
    logical_date: Option<NaiveDate>,

    #[command(subcommand)]
    step: Step,
}

#[derive(Subcommand, Debug)]
enum Step {
    /// Fetch prices and upload the raw JSON object
    Extract,
    /// Append all raw objects into the warehouse table
    Load,
    /// Extract, then load
    Run,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv().ok();

    let args = Args::parse();
    if let Err(e) = execute(args).await {
        error!("Pipeline failed: {}", e);
        std::process::exit(1);
    }
}

async fn execute(args: Args) -> Result<()> {
    let config = Config::from_env()?;
    let logical_date = args.logical_date.unwrap_or_else(|| Utc::now().date_naive());
    let service = PipelineService::new(config)?;

    match args.step {
        Step::Extract => {
            service.extract(logical_date).await?;
        }
        Step::Load => {
            service.load().await?;
        }
        Step::Run => {
            service.run(logical_date).await?;
        }
    }

    Ok(())
}
