//! Where aggregate rows come from: Postgres or a CSV snapshot directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::Settings;
use crate::db;
use crate::models::{CustomerAggregate, OrderRow};

pub const CUSTOMERS_FILE: &str = "customers.csv";
pub const ORDERS_FILE: &str = "orders.csv";

pub enum DataSource {
    Postgres(PgPool),
    Csv(PathBuf),
}

impl DataSource {
    pub async fn connect(settings: &Settings) -> anyhow::Result<Self> {
        if let Some(dir) = &settings.csv_dir {
            info!(dir = %dir.display(), "reading CSV snapshot");
            return Ok(Self::Csv(dir.clone()));
        }

        let database_url = settings
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self::Postgres(pool))
    }

    pub fn pool(&self) -> anyhow::Result<&PgPool> {
        match self {
            Self::Postgres(pool) => Ok(pool),
            Self::Csv(dir) => anyhow::bail!(
                "this command needs Postgres, but a CSV snapshot ({}) was selected",
                dir.display()
            ),
        }
    }

    pub async fn customer_aggregates(&self) -> anyhow::Result<Vec<CustomerAggregate>> {
        match self {
            Self::Postgres(pool) => db::fetch_customer_aggregates(pool).await,
            Self::Csv(dir) => read_customers(&dir.join(CUSTOMERS_FILE)),
        }
    }

    /// All customers, with or without orders. A CSV snapshot only holds
    /// customers that were aggregated, so it falls back to those.
    pub async fn customers(&self) -> anyhow::Result<Vec<CustomerAggregate>> {
        match self {
            Self::Postgres(pool) => db::fetch_customers(pool).await,
            Self::Csv(dir) => read_customers(&dir.join(CUSTOMERS_FILE)),
        }
    }

    pub async fn orders(&self) -> anyhow::Result<Vec<OrderRow>> {
        match self {
            Self::Postgres(pool) => db::fetch_orders(pool).await,
            Self::Csv(dir) => read_orders(&dir.join(ORDERS_FILE)),
        }
    }
}

/// Customer aggregates exported one row per customer.
pub fn read_customers(path: &Path) -> anyhow::Result<Vec<CustomerAggregate>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut customers = Vec::new();
    for result in reader.deserialize::<CustomerAggregate>() {
        customers.push(result.with_context(|| format!("bad row in {}", path.display()))?);
    }
    Ok(customers)
}

pub fn read_orders(path: &Path) -> anyhow::Result<Vec<OrderRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut orders = Vec::new();
    for result in reader.deserialize::<OrderRow>() {
        orders.push(result.with_context(|| format!("bad row in {}", path.display()))?);
    }
    Ok(orders)
}
