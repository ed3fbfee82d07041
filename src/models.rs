use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row per customer, as aggregated by the data source.
///
/// Dates stay raw strings here; the feature engineer owns parsing so that
/// unparseable values turn into nulls instead of load errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerAggregate {
    pub customer_id: String,
    pub age: Option<f64>,
    pub gender: Option<String>,
    pub country: Option<String>,
    pub signup_date: Option<String>,
    pub last_purchase_date: Option<String>,
    pub purchase_count: Option<f64>,
    pub total_items_purchased: Option<f64>,
    pub total_spend: Option<f64>,
    pub avg_rating: Option<f64>,
    pub total_cancellations: Option<f64>,
    pub subscription_status: Option<String>,
}

/// A single order line. `order_date` is the purchase date of the line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderRow {
    pub order_id: String,
    pub order_date: Option<NaiveDate>,
    pub product_id: String,
    pub product_name: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Subscription status recorded on the order.
    #[serde(default)]
    pub subscription_status: Option<String>,
}

impl OrderRow {
    pub fn amount(&self) -> f64 {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChurnCandidate {
    pub customer_id: String,
    pub last_purchase_date: Option<String>,
    pub total_cancellations: f64,
    pub subscription_status: Option<String>,
    pub churn_probability: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChurnTrend {
    pub months: Vec<String>,
    pub churn_counts: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandMethod {
    Smoothing,
    RateFallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDemand {
    pub product_id: String,
    pub product_name: String,
    pub forecasted_demand_30_days: u64,
    pub method: DemandMethod,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ForecastResult {
    pub dates: Vec<String>,
    pub predicted_sales: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_lower: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_upper: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FullSalesView {
    pub historical_dates: Vec<String>,
    pub historical_sales: Vec<f64>,
    pub forecast_dates: Vec<String>,
    pub forecast_sales: Vec<f64>,
    pub confidence_lower: Vec<f64>,
    pub confidence_upper: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MainKpis {
    pub total_revenue: f64,
    pub total_orders: u64,
    pub average_order_value: f64,
    pub churn_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesKpis {
    pub total_revenue: f64,
    pub average_daily_sales: f64,
    pub best_month: String,
    pub best_month_sales: f64,
    pub worst_month: String,
    pub worst_month_sales: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRevenue {
    pub product_name: String,
    pub category: Option<String>,
    pub total_sales: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryUsers {
    pub country: Option<String>,
    pub user_count: u64,
}

/// Units sold to customers in one age band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeGroupSales {
    pub age_group: String,
    pub total_sales: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyQuantity {
    /// Month name and year, e.g. `March 2025`.
    pub month: String,
    pub total_quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearlyQuantity {
    pub year: i32,
    pub total_quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStats {
    pub total_entries: u64,
    pub cancelled_count: u64,
    pub cancelled_percentage: f64,
}
