//! Per-product 30-day demand estimates.
//!
//! Products with more than a week of positive-demand days get a Holt
//! smoothing forecast; sparser products fall back to their average daily rate.

use std::collections::BTreeMap;

use tracing::{info, instrument};

use crate::error::{AnalyticsError, Result};
use crate::models::{DemandMethod, OrderRow, ProductDemand};
use crate::series::DailySeries;
use crate::smoothing::HoltLinear;

pub const DEMAND_HORIZON_DAYS: usize = 30;
pub const SMOOTHING_LEVEL: f64 = 0.2;
/// Positive-demand days a product must exceed to use smoothing.
pub const SPARSE_DAY_LIMIT: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemandEstimate {
    pub units: u64,
    pub method: DemandMethod,
}

fn to_units(value: f64) -> Result<u64> {
    if !value.is_finite() {
        return Err(AnalyticsError::FitFailure(format!(
            "demand estimate is not finite ({value})"
        )));
    }
    Ok(value.round_ties_even().abs() as u64)
}

/// Estimate demand over `horizon` days from a gap-free daily quantity series.
pub fn forecast_demand(series: &DailySeries, horizon: usize) -> Result<DemandEstimate> {
    if series.positive_days() > SPARSE_DAY_LIMIT {
        let model = HoltLinear::fit(series.values(), SMOOTHING_LEVEL)?;
        let total: f64 = model.forecast(horizon).iter().sum();
        return Ok(DemandEstimate {
            units: to_units(total)?,
            method: DemandMethod::Smoothing,
        });
    }

    let total_units = series.total();
    let span = series.span_days();
    let units = if span > 0 {
        to_units(total_units / span as f64 * horizon as f64)?
    } else {
        // A single day of history has no rate; report what was sold.
        total_units.max(0.0).trunc() as u64
    };

    Ok(DemandEstimate {
        units,
        method: DemandMethod::RateFallback,
    })
}

struct ProductHistory<'a> {
    name: &'a str,
    total_quantity: f64,
    rows: Vec<&'a OrderRow>,
}

/// Forecast the `top_n` best-selling products by total quantity.
///
/// Each product's series runs from its own first to last sale date. Products
/// whose orders all lack a date are estimated at zero.
#[instrument(skip(orders), fields(orders = orders.len()))]
pub fn forecast_top_products(orders: &[OrderRow], top_n: usize) -> Result<Vec<ProductDemand>> {
    let mut products: BTreeMap<&str, ProductHistory<'_>> = BTreeMap::new();
    for order in orders {
        let entry = products
            .entry(order.product_id.as_str())
            .or_insert_with(|| ProductHistory {
                name: order.product_name.as_str(),
                total_quantity: 0.0,
                rows: Vec::new(),
            });
        entry.total_quantity += order.quantity;
        entry.rows.push(order);
    }

    let mut ranked: Vec<(&str, ProductHistory<'_>)> = products.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_quantity.total_cmp(&a.1.total_quantity));

    let mut forecasts = Vec::new();
    for (product_id, history) in ranked.into_iter().take(top_n) {
        let points = history
            .rows
            .iter()
            .filter_map(|row| row.order_date.map(|d| (d, row.quantity)));

        let estimate = match DailySeries::from_points(points) {
            Some(series) => {
                forecast_demand(&series, DEMAND_HORIZON_DAYS).map_err(|err| match err {
                    AnalyticsError::FitFailure(reason) => {
                        AnalyticsError::FitFailure(format!("product {product_id}: {reason}"))
                    }
                    other => other,
                })?
            }
            None => DemandEstimate {
                units: 0,
                method: DemandMethod::RateFallback,
            },
        };

        info!(
            product_id,
            units = estimate.units,
            method = ?estimate.method,
            "product demand forecast"
        );
        forecasts.push(ProductDemand {
            product_id: product_id.to_string(),
            product_name: history.name.to_string(),
            forecasted_demand_30_days: estimate.units,
            method: estimate.method,
        });
    }

    Ok(forecasts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn order(product: &str, offset: i64, quantity: f64) -> OrderRow {
        OrderRow {
            order_id: format!("{product}-{offset}"),
            order_date: Some(start() + Duration::days(offset)),
            product_id: product.to_string(),
            product_name: format!("Product {product}"),
            quantity,
            unit_price: 10.0,
            ..Default::default()
        }
    }

    /// `positive` days of demand 3 each, separated by a zero day.
    fn alternating(positive: usize) -> DailySeries {
        let mut values = Vec::new();
        for i in 0..positive {
            if i > 0 {
                values.push(0.0);
            }
            values.push(3.0);
        }
        DailySeries::new(start(), values)
    }

    #[test]
    fn sparse_history_uses_daily_rate() {
        let series = DailySeries::new(start(), vec![2.0, 0.0, 5.0]);
        let estimate = forecast_demand(&series, 30).unwrap();
        assert_eq!(estimate.units, 105);
        assert_eq!(estimate.method, DemandMethod::RateFallback);
    }

    #[test]
    fn seven_positive_days_stay_on_fallback() {
        let estimate = forecast_demand(&alternating(7), 30).unwrap();
        assert_eq!(estimate.method, DemandMethod::RateFallback);
        // 21 units over a 12 day span.
        assert_eq!(estimate.units, 52);
    }

    #[test]
    fn eight_positive_days_use_smoothing() {
        let estimate = forecast_demand(&alternating(8), 30).unwrap();
        assert_eq!(estimate.method, DemandMethod::Smoothing);
    }

    #[test]
    fn single_day_reports_raw_total() {
        let series = DailySeries::new(start(), vec![4.0]);
        let estimate = forecast_demand(&series, 30).unwrap();
        assert_eq!(estimate.units, 4);
    }

    #[test]
    fn rounding_ties_go_to_even() {
        // 5 units over 4 days for 30 days is 37.5.
        let series = DailySeries::new(start(), vec![5.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(forecast_demand(&series, 30).unwrap().units, 38);
        // 1 unit over 4 days for 30 days is 7.5.
        let series = DailySeries::new(start(), vec![1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(forecast_demand(&series, 30).unwrap().units, 8);
        let series = DailySeries::new(start(), vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        // 1 unit over 8 days for 20 days is 2.5.
        assert_eq!(forecast_demand(&series, 20).unwrap().units, 2);
    }

    #[test]
    fn intermittent_demand_stays_near_its_rate() {
        let noisy = DailySeries::new(
            start(),
            vec![1.0, 9.0, 2.0, 2.0, 3.0, 2.0, 2.0, 3.0, 2.0, 2.0],
        );
        let estimate = forecast_demand(&noisy, 30).unwrap();
        assert_eq!(estimate.method, DemandMethod::Smoothing);
        assert_eq!(estimate.units, 42);

        // 40 units over 15 days is 80 per 30 days at the raw rate.
        let values: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 5.0 } else { 0.0 }).collect();
        let estimate = forecast_demand(&DailySeries::new(start(), values), 30).unwrap();
        assert_eq!(estimate.method, DemandMethod::Smoothing);
        assert_eq!(estimate.units, 84);
    }

    #[test]
    fn failed_fit_is_reported_per_product() {
        let mut orders: Vec<OrderRow> = (0..12).map(|day| order("spiky", day, 3.0)).collect();
        orders[6].quantity = 1e200;
        orders.push(order("steady", 0, 1.0));

        let err = forecast_top_products(&orders, 5).unwrap_err();
        match err {
            AnalyticsError::FitFailure(reason) => assert!(reason.contains("product spiky")),
            other => panic!("expected a fit failure, got {other:?}"),
        }
    }

    #[test]
    fn declining_trend_is_never_negative() {
        let values: Vec<f64> = (0..12).map(|i| 40.0 - 3.0 * i as f64).collect();
        let estimate = forecast_demand(&DailySeries::new(start(), values), 30).unwrap();
        assert_eq!(estimate.method, DemandMethod::Smoothing);
        assert!(estimate.units > 0);
    }

    #[test]
    fn ranks_products_by_quantity() {
        let orders = vec![
            order("a", 0, 1.0),
            order("b", 0, 2.0),
            order("b", 2, 5.0),
            order("c", 0, 3.0),
        ];
        let forecasts = forecast_top_products(&orders, 2).unwrap();
        let ids: Vec<&str> = forecasts.iter().map(|f| f.product_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(forecasts[0].forecasted_demand_30_days, 105);
        assert_eq!(forecasts[1].forecasted_demand_30_days, 3);
    }

    #[test]
    fn empty_orders_yield_no_forecasts() {
        assert!(forecast_top_products(&[], 5).unwrap().is_empty());
    }
}
