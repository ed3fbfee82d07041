use std::collections::BTreeMap;
use std::fmt::Write;

use crate::models::{ChurnCandidate, ChurnTrend, ForecastResult, MainKpis, ProductDemand};

/// Everything the markdown dashboard report renders.
pub struct ReportInputs<'a> {
    pub kpis: &'a MainKpis,
    pub segments: &'a BTreeMap<String, usize>,
    pub candidates: &'a [ChurnCandidate],
    pub trend: &'a ChurnTrend,
    pub demand: &'a [ProductDemand],
    /// `None` when no sales forecaster is loaded.
    pub forecast: Option<&'a ForecastResult>,
}

pub fn build_report(inputs: &ReportInputs<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Storefront Insights Report");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Headline");
    let _ = writeln!(
        output,
        "- Revenue {:.2} across {} orders (average order {:.2})",
        inputs.kpis.total_revenue, inputs.kpis.total_orders, inputs.kpis.average_order_value
    );
    let _ = writeln!(output, "- Predicted churn rate {:.1}%", inputs.kpis.churn_rate);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Segments");
    if inputs.segments.is_empty() {
        let _ = writeln!(output, "No customers scored.");
    } else {
        for (segment, count) in inputs.segments {
            let _ = writeln!(output, "- {segment}: {count} customers");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Customers");
    if inputs.candidates.is_empty() {
        let _ = writeln!(output, "No customers scored.");
    } else {
        for candidate in inputs.candidates {
            let _ = writeln!(
                output,
                "- {} probability {:.2} (last purchase {}, {} cancellations, {})",
                candidate.customer_id,
                candidate.churn_probability,
                candidate.last_purchase_date.as_deref().unwrap_or("never"),
                candidate.total_cancellations,
                candidate.subscription_status.as_deref().unwrap_or("unknown status")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Churn Trend");
    if inputs.trend.months.is_empty() {
        let _ = writeln!(output, "No dated purchases to chart.");
    } else {
        for (month, count) in inputs.trend.months.iter().zip(&inputs.trend.churn_counts) {
            let _ = writeln!(output, "- {month}: {count}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 30-Day Product Demand");
    if inputs.demand.is_empty() {
        let _ = writeln!(output, "No product sales recorded.");
    } else {
        for product in inputs.demand {
            let _ = writeln!(
                output,
                "- {} ({}): {} units",
                product.product_name, product.product_id, product.forecasted_demand_30_days
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sales Outlook");
    match inputs.forecast {
        None => {
            let _ = writeln!(output, "Sales forecasting model not loaded.");
        }
        Some(forecast) if forecast.dates.is_empty() => {
            let _ = writeln!(output, "No forecast horizon requested.");
        }
        Some(forecast) => {
            let total: f64 = forecast.predicted_sales.iter().sum();
            let _ = writeln!(
                output,
                "Forecast {:.2} in sales from {} to {}.",
                total,
                forecast.dates[0],
                forecast.dates[forecast.dates.len() - 1]
            );
        }
    }

    output
}
