//! Churn scoring and demand/sales forecasting for a storefront dashboard.
//!
//! Customer aggregates flow through [`features`] and [`align`] into the
//! [`churn`] scorer; order history feeds [`demand`] and [`sales`]. The two
//! trained artifacts are loaded once into an [`AnalyticsContext`] and shared
//! read-only.

pub mod align;
pub mod churn;
pub mod config;
pub mod context;
pub mod data;
pub mod db;
pub mod demand;
pub mod error;
pub mod features;
pub mod kpi;
pub mod models;
pub mod report;
pub mod sales;
pub mod sarima;
pub mod series;
pub mod smoothing;

pub use churn::{ChurnModelPackage, ChurnScorer, RiskSegment};
pub use context::AnalyticsContext;
pub use error::{AnalyticsError, Result};
pub use sales::SalesForecaster;
