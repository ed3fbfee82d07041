//! Sales forecasting on top of the pretrained seasonal model.

use std::sync::Arc;

use chrono::Duration;
use tracing::instrument;

use crate::error::{AnalyticsError, Result};
use crate::models::{ForecastResult, FullSalesView, OrderRow};
use crate::sarima::{SeasonalArima, Z_95};
use crate::series::{iso_date, DailySeries};

/// Trailing days of actual revenue shown before the forecast.
pub const HISTORY_WINDOW_DAYS: i64 = 180;

/// Sales forecaster that may not have a trained model behind it.
#[derive(Debug, Clone, Default)]
pub struct SalesForecaster {
    model: Option<Arc<SeasonalArima>>,
}

impl SalesForecaster {
    pub fn new(model: SeasonalArima) -> Self {
        Self {
            model: Some(Arc::new(model)),
        }
    }

    pub fn unavailable() -> Self {
        Self { model: None }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    fn model(&self) -> Result<&SeasonalArima> {
        self.model.as_deref().ok_or_else(|| {
            AnalyticsError::ModelUnavailable("sales forecasting model not loaded".to_string())
        })
    }

    /// Point forecast and 95% bounds for `horizon` days after the cutoff.
    #[instrument(skip(self))]
    pub fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        let forecast = self.model()?.forecast(horizon, Z_95);
        Ok(ForecastResult {
            dates: forecast.dates.iter().map(iso_date).collect(),
            predicted_sales: forecast.mean,
            confidence_lower: Some(forecast.lower),
            confidence_upper: Some(forecast.upper),
        })
    }

    /// Trailing actual revenue up to the cutoff followed by the forecast.
    #[instrument(skip(self, orders), fields(orders = orders.len()))]
    pub fn full_view(&self, orders: &[OrderRow], horizon: usize) -> Result<FullSalesView> {
        let model = self.model()?;
        let cutoff = model.cutoff();
        let window_start = cutoff - Duration::days(HISTORY_WINDOW_DAYS - 1);

        let historical = DailySeries::window(revenue_points(orders), window_start, cutoff);
        let forecast = self.forecast(horizon)?;

        Ok(FullSalesView {
            historical_dates: historical.iso_dates(),
            historical_sales: historical.values().to_vec(),
            forecast_dates: forecast.dates,
            forecast_sales: forecast.predicted_sales,
            confidence_lower: forecast.confidence_lower.unwrap_or_default(),
            confidence_upper: forecast.confidence_upper.unwrap_or_default(),
        })
    }
}

/// `(date, amount)` for every dated order line.
pub fn revenue_points(orders: &[OrderRow]) -> impl Iterator<Item = (chrono::NaiveDate, f64)> + '_ {
    orders
        .iter()
        .filter_map(|order| order.order_date.map(|d| (d, order.amount())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sarima::{SarimaArtifact, SarimaParams};
    use chrono::NaiveDate;

    fn model() -> SeasonalArima {
        SeasonalArima::from_artifact(SarimaArtifact {
            order: [0, 1, 0],
            seasonal_order: [0, 0, 0, 0],
            params: SarimaParams {
                ar: vec![],
                ma: vec![],
                seasonal_ar: vec![],
                seasonal_ma: vec![],
                sigma2: 1.0,
            },
            start_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            history: vec![10.0; 30],
            residuals: None,
        })
        .unwrap()
    }

    fn order(date: Option<NaiveDate>, quantity: f64) -> OrderRow {
        OrderRow {
            order_id: "o".to_string(),
            order_date: date,
            product_id: "p".to_string(),
            product_name: "Product".to_string(),
            quantity,
            unit_price: 2.5,
            ..Default::default()
        }
    }

    #[test]
    fn unavailable_model_fails_every_operation() {
        let forecaster = SalesForecaster::unavailable();
        assert!(matches!(
            forecaster.forecast(30),
            Err(AnalyticsError::ModelUnavailable(_))
        ));
        assert!(matches!(
            forecaster.full_view(&[], 30),
            Err(AnalyticsError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn forecast_has_bounds_for_every_date() {
        let forecast = SalesForecaster::new(model()).forecast(5).unwrap();
        assert_eq!(forecast.dates.first().map(String::as_str), Some("2025-07-01"));
        assert_eq!(forecast.predicted_sales.len(), 5);
        assert_eq!(forecast.confidence_lower.as_ref().map(Vec::len), Some(5));
        assert_eq!(forecast.confidence_upper.as_ref().map(Vec::len), Some(5));
    }

    #[test]
    fn full_view_history_is_180_days_ending_before_forecast() {
        let cutoff = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let orders = vec![
            order(Some(cutoff), 4.0),
            order(Some(cutoff - Duration::days(10)), 2.0),
            order(Some(cutoff - Duration::days(400)), 9.0),
            order(None, 1.0),
        ];
        let view = SalesForecaster::new(model()).full_view(&orders, 14).unwrap();

        assert_eq!(view.historical_dates.len(), 180);
        assert_eq!(view.historical_sales.len(), 180);
        assert_eq!(view.historical_dates.last().map(String::as_str), Some("2025-06-30"));
        assert_eq!(view.forecast_dates.first().map(String::as_str), Some("2025-07-01"));
        assert_eq!(view.historical_sales[179], 10.0);
        assert_eq!(view.historical_sales[169], 5.0);
        assert_eq!(view.historical_sales.iter().sum::<f64>(), 15.0);
        assert_eq!(view.forecast_sales.len(), 14);
        assert_eq!(view.confidence_upper.len(), 14);
    }

    #[test]
    fn zero_horizon_gives_empty_forecast() {
        let forecast = SalesForecaster::new(model()).forecast(0).unwrap();
        assert!(forecast.dates.is_empty());
    }
}
