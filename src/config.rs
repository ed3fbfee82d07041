use std::path::PathBuf;

use clap::Args;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "storefront_insights=info,sqlx=warn";

/// Where data and model artifacts come from.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Read `customers.csv` and `orders.csv` from this directory instead of Postgres
    #[arg(long, env = "STOREFRONT_CSV_DIR")]
    pub csv_dir: Option<PathBuf>,

    /// Churn classifier package
    #[arg(long, env = "CHURN_MODEL_PATH", default_value = "churn_model.json")]
    pub churn_model: PathBuf,

    /// Seasonal sales forecaster; forecasting is disabled when the file is absent
    #[arg(long, env = "SALES_MODEL_PATH", default_value = "sales_forecaster.json")]
    pub sales_model: PathBuf,
}

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
