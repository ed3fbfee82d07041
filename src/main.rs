use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use storefront_insights::churn::{churn_trend, rank_candidates, segment_counts};
use storefront_insights::config::{init_tracing, Settings};
use storefront_insights::data::DataSource;
use storefront_insights::report::{build_report, ReportInputs};
use storefront_insights::{db, demand, kpi, AnalyticsContext, AnalyticsError};

#[derive(Parser)]
#[command(name = "storefront-insights")]
#[command(
    about = "Churn scoring and sales forecasting for the storefront dashboard",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Customers most likely to churn
    Churn {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// Predicted churners per month of last purchase
    ChurnTrends,
    /// Customer counts per churn risk segment
    Segments,
    /// Daily sales forecast with confidence bounds
    SalesForecast {
        #[arg(long, default_value_t = 30)]
        days: usize,
    },
    /// Last 180 days of sales followed by the forecast
    FullView {
        #[arg(long, default_value_t = 90)]
        days: usize,
    },
    /// 30-day demand for the best-selling products
    Demand {
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Revenue, orders, average order value and churn rate
    Kpis,
    /// Revenue summary with best and worst months
    SalesKpis,
    /// Best-selling products by revenue, per name and category
    TopProducts {
        #[arg(long, default_value_t = kpi::TOP_PRODUCTS_LIMIT)]
        limit: usize,
    },
    /// Customer counts per country
    UserDistribution,
    /// Units sold per customer age band
    SalesByAge,
    /// Units sold per calendar month
    MonthlySales,
    /// Units sold per year
    YearlySales,
    /// Order line count and cancelled share
    DbStats,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value_t = 30)]
        days: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_context(settings: &Settings) -> anyhow::Result<AnalyticsContext> {
    AnalyticsContext::load(&settings.churn_model, &settings.sales_model)
        .context("failed to load model artifacts")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let source = DataSource::connect(&cli.settings).await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(source.pool()?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(source.pool()?).await?;
            println!("Seed data inserted.");
        }
        Commands::Churn { count } => {
            let context = load_context(&cli.settings)?;
            let customers = source.customer_aggregates().await?;
            let batch = context.scorer().score_batch(&customers)?;
            print_json(&rank_candidates(&batch, count))?;
        }
        Commands::ChurnTrends => {
            let context = load_context(&cli.settings)?;
            let customers = source.customer_aggregates().await?;
            let batch = context.scorer().score_batch(&customers)?;
            let dates: Vec<_> = batch.features.iter().map(|f| f.last_purchase_date).collect();
            print_json(&churn_trend(&batch.labels, &dates))?;
        }
        Commands::Segments => {
            let context = load_context(&cli.settings)?;
            let customers = source.customer_aggregates().await?;
            let batch = context.scorer().score_batch(&customers)?;
            print_json(&segment_counts(&batch.probabilities))?;
        }
        Commands::SalesForecast { days } => {
            let context = load_context(&cli.settings)?;
            print_json(&context.sales().forecast(days)?)?;
        }
        Commands::FullView { days } => {
            let context = load_context(&cli.settings)?;
            let orders = source.orders().await?;
            print_json(&context.sales().full_view(&orders, days)?)?;
        }
        Commands::Demand { top } => {
            let orders = source.orders().await?;
            let forecasts = demand::forecast_top_products(&orders, top)?;
            if forecasts.is_empty() {
                let err = AnalyticsError::DataUnavailable("no product sales recorded".to_string());
                return Err(err.into());
            }
            print_json(&forecasts)?;
        }
        Commands::Kpis => {
            let context = load_context(&cli.settings)?;
            let customers = source.customer_aggregates().await?;
            let orders = source.orders().await?;
            let batch = context.scorer().score_batch(&customers)?;
            let (revenue, order_count) = kpi::order_totals(&orders);
            print_json(&kpi::main_kpis(revenue, order_count, &batch.labels))?;
        }
        Commands::SalesKpis => {
            let orders = source.orders().await?;
            print_json(&kpi::sales_kpis(&orders)?)?;
        }
        Commands::TopProducts { limit } => {
            let orders = source.orders().await?;
            print_json(&kpi::top_products_by_revenue(&orders, limit))?;
        }
        Commands::UserDistribution => {
            let customers = source.customers().await?;
            print_json(&kpi::users_by_country(&customers))?;
        }
        Commands::SalesByAge => {
            let customers = source.customers().await?;
            let orders = source.orders().await?;
            print_json(&kpi::sales_by_age(&orders, &customers))?;
        }
        Commands::MonthlySales => {
            let orders = source.orders().await?;
            print_json(&kpi::monthly_quantity(&orders))?;
        }
        Commands::YearlySales => {
            let orders = source.orders().await?;
            print_json(&kpi::yearly_quantity(&orders))?;
        }
        Commands::DbStats => {
            let orders = source.orders().await?;
            print_json(&kpi::order_stats(&orders))?;
        }
        Commands::Report { days, out } => {
            let context = load_context(&cli.settings)?;
            let customers = source.customer_aggregates().await?;
            let orders = source.orders().await?;

            let batch = context.scorer().score_batch(&customers)?;
            let dates: Vec<_> = batch.features.iter().map(|f| f.last_purchase_date).collect();
            let (revenue, order_count) = kpi::order_totals(&orders);
            let kpis = kpi::main_kpis(revenue, order_count, &batch.labels);
            let segments = segment_counts(&batch.probabilities);
            let candidates = rank_candidates(&batch, 10);
            let trend = churn_trend(&batch.labels, &dates);
            let demand = demand::forecast_top_products(&orders, 5)?;
            let forecast = if context.sales().is_available() {
                Some(context.sales().forecast(days)?)
            } else {
                None
            };

            let report = build_report(&ReportInputs {
                kpis: &kpis,
                segments: &segments,
                candidates: &candidates,
                trend: &trend,
                demand: &demand,
                forecast: forecast.as_ref(),
            });
            std::fs::write(&out, report)?;
            info!(path = %out.display(), "report written");
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
