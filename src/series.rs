//! Gap-free daily series and calendar-month bucketing.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

/// Date-indexed values with one entry per calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    start: NaiveDate,
    values: Vec<f64>,
}

impl DailySeries {
    pub fn new(start: NaiveDate, values: Vec<f64>) -> Self {
        Self { start, values }
    }

    /// Sum points per day and zero-fill every day between the first and last
    /// point. Returns `None` when there are no points.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let totals = daily_totals(points);
        let (&first, _) = totals.first_key_value()?;
        let (&last, _) = totals.last_key_value()?;
        Some(Self::fill(&totals, first, last))
    }

    /// Daily totals for the inclusive range `[start, end]`; points outside the
    /// range are ignored and days without points are zero.
    pub fn window<I>(points: I, start: NaiveDate, end: NaiveDate) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let totals = daily_totals(points);
        Self::fill(&totals, start, end)
    }

    fn fill(totals: &BTreeMap<NaiveDate, f64>, start: NaiveDate, end: NaiveDate) -> Self {
        let days = (end - start).num_days() + 1;
        let values = (0..days.max(0))
            .map(|offset| {
                let day = start + Duration::days(offset);
                totals.get(&day).copied().unwrap_or(0.0)
            })
            .collect();
        Self { start, values }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        let len = self.values.len() as i64;
        (len > 0).then(|| self.start + Duration::days(len - 1))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..self.values.len() as i64)
            .map(|offset| self.start + Duration::days(offset))
            .collect()
    }

    pub fn iso_dates(&self) -> Vec<String> {
        self.dates().iter().map(iso_date).collect()
    }

    /// Days between the first and last index entry.
    pub fn span_days(&self) -> i64 {
        (self.values.len() as i64 - 1).max(0)
    }

    pub fn positive_days(&self) -> usize {
        self.values.iter().filter(|v| **v > 0.0).count()
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

fn daily_totals<I>(points: I) -> BTreeMap<NaiveDate, f64>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut totals = BTreeMap::new();
    for (day, value) in points {
        *totals.entry(day).or_insert(0.0) += value;
    }
    totals
}

pub fn iso_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn next_month(month: NaiveDate) -> Option<NaiveDate> {
    if month.month() == 12 {
        NaiveDate::from_ymd_opt(month.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(month.year(), month.month() + 1, 1)
    }
}

/// Sum values per calendar month over a contiguous month range, so months
/// without points appear with zero. Keys are first-of-month dates.
pub fn monthly_totals<I>(points: I) -> Vec<(NaiveDate, f64)>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (day, value) in points {
        *totals.entry(month_start(day)).or_insert(0.0) += value;
    }

    let (Some((&first, _)), Some((&last, _))) = (totals.first_key_value(), totals.last_key_value())
    else {
        return Vec::new();
    };

    let mut months = Vec::new();
    let mut cursor = Some(first);
    while let Some(month) = cursor.filter(|m| *m <= last) {
        months.push((month, totals.get(&month).copied().unwrap_or(0.0)));
        cursor = next_month(month);
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fills_gaps_with_zero_and_sums_duplicates() {
        let series = DailySeries::from_points(vec![
            (day(2025, 1, 3), 5.0),
            (day(2025, 1, 1), 2.0),
            (day(2025, 1, 1), 1.0),
        ])
        .unwrap();
        assert_eq!(series.start(), day(2025, 1, 1));
        assert_eq!(series.values(), &[3.0, 0.0, 5.0]);
        assert_eq!(series.span_days(), 2);
        assert_eq!(series.last_date(), Some(day(2025, 1, 3)));
    }

    #[test]
    fn empty_points_have_no_series() {
        assert!(DailySeries::from_points(Vec::new()).is_none());
    }

    #[test]
    fn window_ignores_points_outside_range() {
        let series = DailySeries::window(
            vec![(day(2024, 12, 31), 9.0), (day(2025, 1, 2), 4.0)],
            day(2025, 1, 1),
            day(2025, 1, 4),
        );
        assert_eq!(series.values(), &[0.0, 4.0, 0.0, 0.0]);
        assert_eq!(series.iso_dates()[3], "2025-01-04");
    }

    #[test]
    fn monthly_totals_are_contiguous_across_years() {
        let months = monthly_totals(vec![(day(2024, 11, 20), 1.0), (day(2025, 2, 1), 2.0)]);
        let keys: Vec<NaiveDate> = months.iter().map(|(m, _)| *m).collect();
        assert_eq!(
            keys,
            vec![day(2024, 11, 1), day(2024, 12, 1), day(2025, 1, 1), day(2025, 2, 1)]
        );
        assert_eq!(months[1].1, 0.0);
        assert_eq!(months[3].1, 2.0);
    }
}
