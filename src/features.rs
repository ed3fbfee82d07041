//! Derived churn features computed from customer aggregates.
//!
//! The reference instant and the missing-value policy here must match what the
//! classifier saw at training time, otherwise scores drift silently.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::models::CustomerAggregate;

/// Recency assigned to customers without a parseable last purchase.
pub const RECENCY_SENTINEL: f64 = 9999.0;
/// Tenure assigned to customers without a parseable signup date.
pub const TENURE_SENTINEL: f64 = -1.0;

/// Numeric feature names, in the order `FeatureVector::numeric` resolves them.
pub const NUMERIC_FEATURES: [&str; 10] = [
    "age",
    "purchase_count",
    "total_items_purchased",
    "total_spend",
    "avg_rating",
    "total_cancellations",
    "days_since_last_purchase",
    "tenure_days",
    "avg_spend_per_order",
    "purchases_per_year",
];

/// Fully imputed features for one customer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub customer_id: String,
    pub gender: Option<String>,
    pub country: Option<String>,
    pub subscription_status: Option<String>,
    pub last_purchase_date: Option<NaiveDate>,
    pub values: [f64; NUMERIC_FEATURES.len()],
}

impl FeatureVector {
    pub fn numeric(&self, name: &str) -> Option<f64> {
        NUMERIC_FEATURES
            .iter()
            .position(|feature| *feature == name)
            .map(|idx| self.values[idx])
    }

    pub fn categorical(&self, name: &str) -> Option<&str> {
        match name {
            "gender" => self.gender.as_deref(),
            "country" => self.country.as_deref(),
            _ => None,
        }
    }

    pub fn days_since_last_purchase(&self) -> f64 {
        self.values[6]
    }

    pub fn tenure_days(&self) -> f64 {
        self.values[7]
    }

    pub fn avg_spend_per_order(&self) -> f64 {
        self.values[8]
    }

    pub fn purchases_per_year(&self) -> f64 {
        self.values[9]
    }

    pub fn total_cancellations(&self) -> f64 {
        self.values[5]
    }
}

/// Parse a date or timestamp; anything unrecognised is treated as missing.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.naive_utc())
}

/// Whole days between `earlier` and `reference`, floored like a timedelta's
/// day component.
fn elapsed_days(reference: NaiveDateTime, earlier: NaiveDateTime) -> f64 {
    (reference - earlier).num_seconds().div_euclid(86_400) as f64
}

/// Median of the present values, `None` if there are none.
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }

    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

/// Compute derived features and impute missing numerics with batch medians.
///
/// Imputation runs after the derived columns exist, so nulls produced by the
/// velocity guard are filled as well. Medians depend on the batch, which means
/// the same customer can receive slightly different features in a different
/// population.
pub fn engineer_features(
    rows: &[CustomerAggregate],
    reference: NaiveDateTime,
) -> Vec<FeatureVector> {
    let width = NUMERIC_FEATURES.len();
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(rows.len()); width];
    let mut last_purchase_dates = Vec::with_capacity(rows.len());

    for row in rows {
        let last_purchase = row.last_purchase_date.as_deref().and_then(parse_timestamp);
        let signup = row.signup_date.as_deref().and_then(parse_timestamp);

        let recency = last_purchase
            .map(|ts| elapsed_days(reference, ts))
            .unwrap_or(RECENCY_SENTINEL);
        let tenure = signup
            .map(|ts| elapsed_days(reference, ts))
            .unwrap_or(TENURE_SENTINEL);

        let avg_spend = match (row.total_spend, row.purchase_count) {
            (Some(spend), Some(count)) => Some(spend / if count == 0.0 { 1.0 } else { count }),
            _ => None,
        };

        let velocity = match row.purchase_count {
            Some(count) if tenure + 1.0 != 0.0 => Some(count * 365.0 / (tenure + 1.0)),
            _ => None,
        };

        let raw = [
            row.age,
            row.purchase_count,
            row.total_items_purchased,
            row.total_spend,
            row.avg_rating,
            row.total_cancellations,
            Some(recency),
            Some(tenure),
            avg_spend,
            velocity,
        ];
        for (column, value) in columns.iter_mut().zip(raw) {
            column.push(value.filter(|v| !v.is_nan()));
        }
        last_purchase_dates.push(last_purchase.map(|ts| ts.date()));
    }

    let fills: Vec<f64> = columns
        .iter()
        .zip(NUMERIC_FEATURES)
        .map(|(column, name)| {
            let fill = median(column);
            if fill.is_none() && !column.is_empty() {
                debug!(column = name, "no values present in batch, imputing zero");
            }
            fill.unwrap_or(0.0)
        })
        .collect();

    rows.iter()
        .zip(last_purchase_dates)
        .enumerate()
        .map(|(idx, (row, last_purchase_date))| {
            let mut values = [0.0; NUMERIC_FEATURES.len()];
            for (col, value) in values.iter_mut().enumerate() {
                *value = columns[col][idx].unwrap_or(fills[col]);
            }
            FeatureVector {
                customer_id: row.customer_id.clone(),
                gender: row.gender.clone(),
                country: row.country.clone(),
                subscription_status: row.subscription_status.clone(),
                last_purchase_date,
                values,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 27)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    fn customer(id: &str) -> CustomerAggregate {
        CustomerAggregate {
            customer_id: id.to_string(),
            age: Some(30.0),
            gender: Some("Female".to_string()),
            country: Some("USA".to_string()),
            signup_date: Some("2024-09-27".to_string()),
            last_purchase_date: Some("2025-09-17".to_string()),
            purchase_count: Some(4.0),
            total_items_purchased: Some(9.0),
            total_spend: Some(200.0),
            avg_rating: Some(4.5),
            total_cancellations: Some(0.0),
            subscription_status: Some("active".to_string()),
        }
    }

    #[test]
    fn derives_recency_tenure_and_velocity() {
        let features = engineer_features(&[customer("c1")], reference());
        let f = &features[0];
        assert_eq!(f.days_since_last_purchase(), 10.0);
        assert_eq!(f.tenure_days(), 365.0);
        assert_eq!(f.avg_spend_per_order(), 50.0);
        assert!((f.purchases_per_year() - 4.0 * 365.0 / 366.0).abs() < 1e-12);
    }

    #[test]
    fn missing_dates_use_sentinels() {
        let mut row = customer("c1");
        row.signup_date = None;
        row.last_purchase_date = Some("not a date".to_string());
        let features = engineer_features(&[row], reference());
        assert_eq!(features[0].days_since_last_purchase(), RECENCY_SENTINEL);
        assert_eq!(features[0].tenure_days(), TENURE_SENTINEL);
        assert_eq!(features[0].last_purchase_date, None);
    }

    #[test]
    fn zero_purchases_do_not_divide_by_zero() {
        let mut row = customer("c1");
        row.purchase_count = Some(0.0);
        row.total_spend = Some(1000.0);
        let features = engineer_features(&[row], reference());
        assert_eq!(features[0].avg_spend_per_order(), 1000.0);
    }

    #[test]
    fn zero_tenure_velocity_is_imputed_from_batch() {
        let mut no_signup = customer("c1");
        no_signup.signup_date = None;
        let mut a = customer("c2");
        a.purchase_count = Some(2.0);
        let mut b = customer("c3");
        b.purchase_count = Some(6.0);

        let features = engineer_features(&[no_signup, a, b], reference());
        let expected = (2.0 * 365.0 / 366.0 + 6.0 * 365.0 / 366.0) / 2.0;
        assert!((features[0].purchases_per_year() - expected).abs() < 1e-12);
        assert!(features.iter().all(|f| f.values.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn missing_numeric_uses_batch_median() {
        let mut a = customer("a");
        a.age = Some(20.0);
        let mut b = customer("b");
        b.age = Some(40.0);
        let mut c = customer("c");
        c.age = Some(25.0);
        let mut d = customer("d");
        d.age = None;

        let features = engineer_features(&[a, b, c, d], reference());
        assert_eq!(features[3].numeric("age"), Some(25.0));
    }

    #[test]
    fn all_missing_column_is_zero_filled() {
        let mut a = customer("a");
        a.avg_rating = None;
        let features = engineer_features(&[a], reference());
        assert_eq!(features[0].numeric("avg_rating"), Some(0.0));
    }

    #[test]
    fn parses_timestamps_and_floors_partial_days() {
        let ts = parse_timestamp("2025-09-26 12:00:00").unwrap();
        assert_eq!(elapsed_days(reference(), ts), 0.0);
        let future = parse_timestamp("2025-09-27T12:00:00").unwrap();
        assert_eq!(elapsed_days(reference(), future), -1.0);
        assert!(parse_timestamp("2025-09-26T08:00:00+02:00").is_some());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn median_handles_even_counts() {
        assert_eq!(median(&[Some(1.0), None, Some(3.0)]), Some(2.0));
        assert_eq!(median(&[None]), None);
    }
}
