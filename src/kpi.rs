//! Dashboard headline numbers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate};

use crate::churn::churn_rate;
use crate::error::{AnalyticsError, Result};
use crate::models::{
    AgeGroupSales, CountryUsers, CustomerAggregate, MainKpis, MonthlyQuantity, OrderRow,
    OrderStats, ProductRevenue, SalesKpis, YearlyQuantity,
};
use crate::sales::revenue_points;
use crate::series::{month_start, monthly_totals};

/// Products listed by `top_products_by_revenue` unless asked otherwise.
pub const TOP_PRODUCTS_LIMIT: usize = 10;

/// Total revenue and the number of distinct orders.
pub fn order_totals(orders: &[OrderRow]) -> (f64, u64) {
    let revenue = orders.iter().map(OrderRow::amount).sum();
    let distinct: BTreeSet<&str> = orders.iter().map(|o| o.order_id.as_str()).collect();
    (revenue, distinct.len() as u64)
}

pub fn main_kpis(total_revenue: f64, total_orders: u64, churn_labels: &[bool]) -> MainKpis {
    let average_order_value = if total_orders > 0 {
        total_revenue / total_orders as f64
    } else {
        0.0
    };
    MainKpis {
        total_revenue,
        total_orders,
        average_order_value,
        churn_rate: churn_rate(churn_labels),
    }
}

/// Revenue summary over dated orders. Months without orders count as zero
/// when picking the worst month.
pub fn sales_kpis(orders: &[OrderRow]) -> Result<SalesKpis> {
    let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (day, amount) in revenue_points(orders) {
        *per_day.entry(day).or_insert(0.0) += amount;
    }
    if per_day.is_empty() {
        return Err(AnalyticsError::DataUnavailable(
            "no dated orders to summarise".to_string(),
        ));
    }

    let total_revenue: f64 = per_day.values().sum();
    let average_daily_sales = total_revenue / per_day.len() as f64;

    let months = monthly_totals(revenue_points(orders));
    let mut best = months[0];
    let mut worst = months[0];
    for month in &months[1..] {
        if month.1 > best.1 {
            best = *month;
        }
        if month.1 < worst.1 {
            worst = *month;
        }
    }

    Ok(SalesKpis {
        total_revenue,
        average_daily_sales,
        best_month: best.0.format("%B %Y").to_string(),
        best_month_sales: best.1,
        worst_month: worst.0.format("%B %Y").to_string(),
        worst_month_sales: worst.1,
    })
}

/// Descending by value; equal values keep their incoming order.
fn sort_descending<K>(entries: &mut [(K, f64)]) {
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
}

/// Revenue per product name and category, highest first.
pub fn top_products_by_revenue(orders: &[OrderRow], limit: usize) -> Vec<ProductRevenue> {
    let mut totals: BTreeMap<(&str, Option<&str>), f64> = BTreeMap::new();
    for order in orders {
        let key = (order.product_name.as_str(), order.category.as_deref());
        *totals.entry(key).or_insert(0.0) += order.amount();
    }

    let mut ranked: Vec<_> = totals.into_iter().collect();
    sort_descending(&mut ranked);
    ranked
        .into_iter()
        .take(limit)
        .map(|((name, category), total_sales)| ProductRevenue {
            product_name: name.to_string(),
            category: category.map(str::to_string),
            total_sales,
        })
        .collect()
}

/// Customers per country, most populous first. Customers without a country
/// are counted under `None`.
pub fn users_by_country(customers: &[CustomerAggregate]) -> Vec<CountryUsers> {
    let mut counts: BTreeMap<Option<&str>, u64> = BTreeMap::new();
    for customer in customers {
        *counts.entry(customer.country.as_deref()).or_insert(0) += 1;
    }

    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .map(|(country, user_count)| CountryUsers {
            country: country.map(str::to_string),
            user_count,
        })
        .collect()
}

/// Age band label. Unknown ages and anyone outside the lower bands land in
/// `60+`.
pub fn age_group(age: Option<f64>) -> &'static str {
    match age {
        Some(age) if (18.0..=25.0).contains(&age) => "18-25",
        Some(age) if (26.0..=35.0).contains(&age) => "26-35",
        Some(age) if (36.0..=45.0).contains(&age) => "36-45",
        Some(age) if (46.0..=60.0).contains(&age) => "46-60",
        _ => "60+",
    }
}

/// Units sold per customer age band, highest first. Orders whose customer
/// is unknown are left out.
pub fn sales_by_age(orders: &[OrderRow], customers: &[CustomerAggregate]) -> Vec<AgeGroupSales> {
    let ages: HashMap<&str, Option<f64>> = customers
        .iter()
        .map(|c| (c.customer_id.as_str(), c.age))
        .collect();

    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for order in orders {
        let Some(age) = order.customer_id.as_deref().and_then(|id| ages.get(id)) else {
            continue;
        };
        *totals.entry(age_group(*age)).or_insert(0.0) += order.quantity;
    }

    let mut ranked: Vec<_> = totals.into_iter().collect();
    sort_descending(&mut ranked);
    ranked
        .into_iter()
        .map(|(group, total_sales)| AgeGroupSales {
            age_group: group.to_string(),
            total_sales,
        })
        .collect()
}

/// Units sold per calendar month with at least one dated order, oldest first.
pub fn monthly_quantity(orders: &[OrderRow]) -> Vec<MonthlyQuantity> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for order in orders {
        if let Some(date) = order.order_date {
            *totals.entry(month_start(date)).or_insert(0.0) += order.quantity;
        }
    }

    totals
        .into_iter()
        .map(|(month, quantity)| MonthlyQuantity {
            month: month.format("%B %Y").to_string(),
            total_quantity: quantity as u64,
        })
        .collect()
}

pub fn yearly_quantity(orders: &[OrderRow]) -> Vec<YearlyQuantity> {
    let mut totals: BTreeMap<i32, f64> = BTreeMap::new();
    for order in orders {
        if let Some(date) = order.order_date {
            *totals.entry(date.year()).or_insert(0.0) += order.quantity;
        }
    }

    totals
        .into_iter()
        .map(|(year, quantity)| YearlyQuantity {
            year,
            total_quantity: quantity as u64,
        })
        .collect()
}

/// Order line count and the share of lines on a cancelled subscription,
/// as a percentage rounded to two decimals.
pub fn order_stats(orders: &[OrderRow]) -> OrderStats {
    let total_entries = orders.len() as u64;
    let cancelled_count = orders
        .iter()
        .filter(|o| o.subscription_status.as_deref() == Some("cancelled"))
        .count() as u64;
    let cancelled_percentage = if total_entries > 0 {
        let share = cancelled_count as f64 / total_entries as f64 * 100.0;
        (share * 100.0).round_ties_even() / 100.0
    } else {
        0.0
    };

    OrderStats {
        total_entries,
        cancelled_count,
        cancelled_percentage,
    }
}
