//! Short-horizon projections from monthly history.
//!
//! The projector fits a least-squares slope over the last six observations, anchors it at their mean,
//! and steps forward one month at a time, floored at zero.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::columns;
use crate::filter::{self, FilterSpec};
use crate::models::Rating;
use crate::table::{round_to, MonthPeriod, Table};

const WINDOW: usize = 6;
const HISTORY_MONTHS: usize = 12;

/// Projects `months_ahead` values from `history`. Fewer than two points yield zeros.
pub fn forecast(history: &[f64], months_ahead: usize) -> Vec<f64> {
    if history.len() < 2 {
        return vec![0.0; months_ahead];
    }
    let window = &history[history.len() - WINDOW.min(history.len())..];
    let n = window.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = window.iter().sum::<f64>() / n;

    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in window.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    let slope = if den > 0.0 { num / den } else { 0.0 };

    (1..=months_ahead)
        .map(|step| round_to((mean_y + slope * step as f64).max(0.0), 2))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCount {
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountForecast {
    pub month: String,
    pub predicted_count: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentForecast {
    pub historical: Vec<MonthlyCount>,
    pub forecast: Vec<CountForecast>,
    pub months_ahead: usize,
    pub forecast_method: &'static str,
}

/// Monthly incident counts over the last twelve observed months plus a projection with a ±30% band.
pub fn incident_forecast(incident: &Table, spec: &FilterSpec, months_ahead: usize) -> IncidentForecast {
    let incident = filter::apply(incident, spec);
    let mut counts: BTreeMap<MonthPeriod, usize> = BTreeMap::new();
    if let Some(col) = columns::resolve(&incident, columns::EVENT_DATE) {
        for row in 0..incident.len() {
            if let Some(date) = col.value(&incident, row).as_date() {
                *counts.entry(MonthPeriod::of(date)).or_default() += 1;
            }
        }
    }

    let history: Vec<(MonthPeriod, usize)> = counts
        .into_iter()
        .rev()
        .take(HISTORY_MONTHS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let forecast = match history.last() {
        Some(&(last, _)) => {
            let values: Vec<f64> = history.iter().map(|&(_, c)| c as f64).collect();
            self::forecast(&values, months_ahead)
                .into_iter()
                .enumerate()
                .map(|(i, value)| CountForecast {
                    month: last.plus(i as u32 + 1).to_string(),
                    predicted_count: value,
                    confidence_lower: round_to((value * 0.7).max(0.0), 2),
                    confidence_upper: round_to(value * 1.3, 2),
                })
                .collect()
        }
        None => Vec::new(),
    };
    debug!(months = history.len(), months_ahead, "incident forecast");

    IncidentForecast {
        historical: history
            .into_iter()
            .map(|(month, count)| MonthlyCount {
                month: month.to_string(),
                count,
            })
            .collect(),
        forecast,
        months_ahead,
        forecast_method: "Moving Average with Trend Adjustment",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRisk {
    pub month: String,
    pub avg_risk: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskForecast {
    pub month: String,
    pub predicted_avg_risk: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskTrend {
    pub historical: Vec<MonthlyRisk>,
    pub forecast: Vec<RiskForecast>,
    pub trend: &'static str,
    pub trend_color: &'static str,
}

fn monthly_mean(table: &Table, dates: &[&str], risks: &[&str]) -> BTreeMap<MonthPeriod, f64> {
    let (Some(date_col), Some(risk_col)) = (
        columns::resolve(table, dates),
        columns::resolve(table, risks),
    ) else {
        return BTreeMap::new();
    };
    let mut acc: BTreeMap<MonthPeriod, (f64, usize)> = BTreeMap::new();
    for row in 0..table.len() {
        let (Some(date), Some(risk)) = (
            date_col.value(table, row).as_date(),
            risk_col.number(table, row),
        ) else {
            continue;
        };
        let entry = acc.entry(MonthPeriod::of(date)).or_default();
        entry.0 += risk;
        entry.1 += 1;
    }
    acc.into_iter()
        .map(|(month, (sum, n))| (month, sum / n as f64))
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn trend_direction(series: &[f64]) -> Rating {
    if series.len() < 2 {
        return Rating::new("Insufficient Data", "#9e9e9e");
    }
    let split = series.len().saturating_sub(3);
    let recent = mean(&series[split..]);
    let older = if series.len() > 3 {
        mean(&series[..split])
    } else {
        recent
    };
    if recent > older * 1.1 {
        Rating::new("Increasing", "#f44336")
    } else if recent < older * 0.9 {
        Rating::new("Decreasing", "#4caf50")
    } else {
        Rating::new("Stable", "#ffc107")
    }
}

/// Monthly mean risk across incidents and hazards, with a projection and trend verdict.
pub fn risk_trend_projection(
    incident: &Table,
    hazard: &Table,
    spec: &FilterSpec,
    months_ahead: usize,
) -> RiskTrend {
    let incident = filter::apply(incident, spec);
    let hazard = filter::apply(hazard, spec);

    let mut combined = monthly_mean(&incident, &["occurrence_date", "date"], columns::RISK_OR_SEVERITY);
    for (month, risk) in monthly_mean(&hazard, &["occurrence_date", "date"], &["risk_score"]) {
        combined
            .entry(month)
            .and_modify(|existing| *existing = (*existing + risk) / 2.0)
            .or_insert(risk);
    }

    let values: Vec<f64> = combined.values().copied().collect();
    let forecast = match combined.keys().next_back() {
        Some(&last) => self::forecast(&values, months_ahead)
            .into_iter()
            .enumerate()
            .map(|(i, value)| RiskForecast {
                month: last.plus(i as u32 + 1).to_string(),
                predicted_avg_risk: value,
            })
            .collect(),
        None => Vec::new(),
    };
    let trend = trend_direction(&values);

    RiskTrend {
        historical: combined
            .into_iter()
            .map(|(month, avg_risk)| MonthlyRisk {
                month: month.to_string(),
                avg_risk,
            })
            .collect(),
        forecast,
        trend: trend.label,
        trend_color: trend.color,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LagBucket {
    pub range: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationLag {
    pub average_lag_days: f64,
    pub median_lag_days: f64,
    pub lag_distribution: Vec<LagBucket>,
    pub total_correlations: usize,
    pub interpretation: String,
}

impl ObservationLag {
    fn none() -> Self {
        Self {
            average_lag_days: 0.0,
            median_lag_days: 0.0,
            lag_distribution: Vec::new(),
            total_correlations: 0,
            interpretation: "No clear observation-to-incident patterns found".to_string(),
        }
    }
}

const LAG_BUCKETS: [(&str, i64); 5] = [
    ("0-7 days", 7),
    ("8-30 days", 30),
    ("31-90 days", 90),
    ("91-180 days", 180),
    ("180+ days", i64::MAX),
];

fn datetimes(table: &Table, candidates: &[&str]) -> Vec<NaiveDateTime> {
    columns::resolve(table, candidates).map_or_else(Vec::new, |col| {
        (0..table.len())
            .filter_map(|row| col.value(table, row).as_datetime())
            .collect()
    })
}

/// Days from the latest strictly earlier hazard to each incident, kept when within a year.
pub fn observation_lag_time(incident: &Table, hazard: &Table, spec: &FilterSpec) -> ObservationLag {
    let incident = filter::apply(incident, spec);
    let hazard = filter::apply(hazard, spec);

    let mut hazard_dates = datetimes(&hazard, columns::EVENT_DATE);
    hazard_dates.sort();

    let mut lags: Vec<i64> = datetimes(&incident, &["occurrence_date", "date"])
        .into_iter()
        .filter_map(|occurred| {
            let prior = hazard_dates.partition_point(|h| *h < occurred);
            let nearest = hazard_dates.get(prior.checked_sub(1)?)?;
            Some((occurred - *nearest).num_days())
        })
        .filter(|days| (0..=365).contains(days))
        .collect();

    if lags.is_empty() {
        return ObservationLag::none();
    }
    lags.sort_unstable();

    let n = lags.len();
    let average = lags.iter().sum::<i64>() as f64 / n as f64;
    let median = if n % 2 == 1 {
        lags[n / 2] as f64
    } else {
        (lags[n / 2 - 1] + lags[n / 2]) as f64 / 2.0
    };

    let mut distribution: Vec<LagBucket> = LAG_BUCKETS
        .iter()
        .map(|&(range, _)| LagBucket { range, count: 0 })
        .collect();
    for lag in &lags {
        if let Some(i) = LAG_BUCKETS.iter().position(|&(_, max)| *lag <= max) {
            distribution[i].count += 1;
        }
    }

    let average = round_to(average, 1);
    ObservationLag {
        average_lag_days: average,
        median_lag_days: round_to(median, 1),
        lag_distribution: distribution,
        total_correlations: n,
        interpretation: format!(
            "Average {average:.1} days between hazard identification and related incident"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    #[test]
    fn projects_trend_from_recent_window() {
        let out = forecast(&[10.0, 12.0, 11.0, 13.0, 15.0, 14.0], 2);
        assert_eq!(out, vec![13.39, 14.27]);
    }

    #[test]
    fn short_history_yields_zeros() {
        assert_eq!(forecast(&[7.0], 3), vec![0.0, 0.0, 0.0]);
        assert_eq!(forecast(&[], 1), vec![0.0]);
    }

    #[test]
    fn forecast_never_goes_negative() {
        let out = forecast(&[10.0, 5.0, 0.0], 4);
        assert!(out.iter().all(|v| *v >= 0.0));
        assert_eq!(out[3], 0.0);
    }

    #[test]
    fn only_last_six_points_drive_the_slope() {
        let out = forecast(&[100.0, 100.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0], 1);
        assert_eq!(out, vec![1.0]);
    }

    #[test]
    fn incident_forecast_counts_months_and_bands() {
        let rows = ["2024-01-03", "2024-01-20", "2024-02-11", "2024-03-01", "2024-03-02", "2024-03-09"]
            .iter()
            .map(|d| vec![Value::text(*d)])
            .collect();
        let incident = table(&["occurrence_date"], rows);
        let out = incident_forecast(&incident, &FilterSpec::default(), 2);
        assert_eq!(out.historical.len(), 3);
        assert_eq!(out.historical[2].count, 3);
        assert_eq!(out.forecast[0].month, "2024-04");
        assert_eq!(out.forecast[1].month, "2024-05");
        let first = &out.forecast[0];
        assert_eq!(first.confidence_upper, round_to(first.predicted_count * 1.3, 2));
    }

    #[test]
    fn incident_forecast_without_dates_is_empty() {
        let incident = table(&["title"], vec![vec!["x".into()]]);
        let out = incident_forecast(&incident, &FilterSpec::default(), 4);
        assert!(out.historical.is_empty());
        assert!(out.forecast.is_empty());
        assert_eq!(out.months_ahead, 4);
    }

    #[test]
    fn risk_trend_averages_overlapping_months() {
        let incident = table(
            &["occurrence_date", "risk_score"],
            vec![
                vec!["2024-01-05".into(), 4.0.into()],
                vec!["2024-02-05".into(), 2.0.into()],
            ],
        );
        let hazard = table(
            &["date", "risk_score"],
            vec![vec!["2024-01-15".into(), 2.0.into()]],
        );
        let out = risk_trend_projection(&incident, &hazard, &FilterSpec::default(), 1);
        assert_eq!(out.historical[0].avg_risk, 3.0);
        assert_eq!(out.historical[1].avg_risk, 2.0);
        assert_eq!(out.forecast[0].month, "2024-03");
    }

    #[test]
    fn trend_verdicts() {
        assert_eq!(trend_direction(&[1.0]).label, "Insufficient Data");
        assert_eq!(trend_direction(&[1.0, 1.0, 1.0, 3.0, 3.0, 3.0]).label, "Increasing");
        assert_eq!(trend_direction(&[3.0, 3.0, 1.0, 1.0, 1.0]).label, "Decreasing");
        assert_eq!(trend_direction(&[2.0, 2.1]).label, "Stable");
    }

    #[test]
    fn lag_uses_latest_prior_hazard() {
        let incident = table(
            &["occurrence_date"],
            vec![vec!["2024-01-10".into()], vec!["2024-03-01".into()], vec!["2023-01-01".into()]],
        );
        let hazard = table(
            &["occurrence_date"],
            vec![vec!["2024-01-01".into()], vec!["2024-01-09".into()]],
        );
        let out = observation_lag_time(&incident, &hazard, &FilterSpec::default());
        // 1 day and 52 days; the 2023 incident has no prior hazard.
        assert_eq!(out.total_correlations, 2);
        assert_eq!(out.average_lag_days, 26.5);
        assert_eq!(out.median_lag_days, 26.5);
        assert_eq!(out.lag_distribution[0].count, 1);
        assert_eq!(out.lag_distribution[2].count, 1);
        assert_eq!(
            out.interpretation,
            "Average 26.5 days between hazard identification and related incident"
        );
    }

    #[test]
    fn lag_without_pairs_is_zeroed() {
        let out = observation_lag_time(&Table::empty(), &Table::empty(), &FilterSpec::default());
        assert_eq!(out.average_lag_days, 0.0);
        assert!(out.lag_distribution.is_empty());
    }
}
