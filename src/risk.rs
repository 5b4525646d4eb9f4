use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::columns::{self, Column};
use crate::filter::{self, FilterSpec};
use crate::models::{
    ActualRisk, DepartmentRisk, DepartmentRiskReport, PerformanceIndex, PotentialRisk, RiskMeta,
    Series,
};
use crate::severity::severity_score_of;
use crate::table::{round_to, Table};

const SHEET: &str = "Incident";

/// Linear-interpolated quantile of an ascending slice, `q` in `[0, 1]`.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = (n - 1) as f64 * q.clamp(0.0, 1.0);
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

/// The 20/40/60/80th percentile cut points of a count distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuintileBreaks([f64; 4]);

impl QuintileBreaks {
    /// With one group or none every cut collapses to 1.
    pub fn from_counts(counts: &[usize]) -> Self {
        if counts.len() <= 1 {
            return Self([1.0; 4]);
        }
        let mut sorted: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        Self([0.2, 0.4, 0.6, 0.8].map(|q| quantile(&sorted, q)))
    }

    /// Likelihood rank 1 to 5.
    pub fn likelihood(&self, count: usize) -> u8 {
        let count = count as f64;
        self.0
            .iter()
            .position(|&cut| count <= cut)
            .map_or(5, |i| i as u8 + 1)
    }

    pub fn cuts(&self) -> [f64; 4] {
        self.0
    }
}

/// Min-max scaling; a flat distribution maps to all zeros.
pub fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    let (min, max) = scores
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = max - min;
    scores
        .iter()
        .map(|&s| {
            if scores.is_empty() || range.abs() < f64::EPSILON || !range.is_finite() {
                0.0
            } else {
                (s - min) / range
            }
        })
        .collect()
}

#[derive(Debug, Default)]
struct DepartmentTotals {
    count: usize,
    sum_actual: f64,
    sum_worst: f64,
}

struct IncidentColumns<'a> {
    id: Option<Column<'a>>,
    incident_type: Option<Column<'a>>,
    actual: Option<Column<'a>>,
    worst: Option<Column<'a>>,
    department: Option<Column<'a>>,
}

impl<'a> IncidentColumns<'a> {
    fn resolve(incident: &'a Table) -> Self {
        Self {
            id: columns::resolve(incident, columns::INCIDENT_NUMBER),
            incident_type: columns::resolve(incident, columns::INCIDENT_TYPE),
            actual: columns::resolve(incident, columns::ACTUAL_CONSEQUENCE),
            worst: columns::resolve(incident, columns::WORST_CONSEQUENCE),
            department: columns::resolve(incident, &["department"]),
        }
    }

    fn has_id(&self, table: &Table, row: usize) -> bool {
        self.id.is_some_and(|c| !c.value(table, row).is_missing())
    }

    fn is_injury(&self, table: &Table, row: usize) -> bool {
        self.incident_type.is_some_and(|c| {
            c.value(table, row)
                .as_text()
                .is_some_and(|t| t.trim().to_lowercase() == "injury")
        })
    }

    fn department(&self, table: &Table, row: usize) -> Option<String> {
        self.department
            .and_then(|c| c.value(table, row).as_text())
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
    }

    fn actual_score(&self, table: &Table, row: usize) -> f64 {
        self.actual
            .map_or(0.0, |c| severity_score_of(c.value(table, row)) as f64)
    }

    fn worst_score(&self, table: &Table, row: usize) -> f64 {
        self.worst
            .map_or(0.0, |c| severity_score_of(c.value(table, row)) as f64)
    }

    /// Injury rows with an incident number, grouped by department.
    fn injury_totals(
        &self,
        table: &Table,
        unknown_department: bool,
    ) -> (usize, BTreeMap<String, DepartmentTotals>) {
        let mut used = 0;
        let mut groups: BTreeMap<String, DepartmentTotals> = BTreeMap::new();
        for row in 0..table.len() {
            if !self.has_id(table, row) || !self.is_injury(table, row) {
                continue;
            }
            let department = match self.department(table, row) {
                Some(d) => d,
                None if unknown_department => "Unknown".to_string(),
                None => continue,
            };
            used += 1;
            let totals = groups.entry(department).or_default();
            totals.count += 1;
            totals.sum_actual += self.actual_score(table, row);
            totals.sum_worst += self.worst_score(table, row);
        }
        (used, groups)
    }
}

fn sort_desc_by<T>(rows: &mut [T], key: impl Fn(&T) -> f64) {
    rows.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
}

fn empty_risk_report() -> DepartmentRiskReport {
    DepartmentRiskReport {
        labels: Vec::new(),
        series: Vec::new(),
        table: Vec::new(),
        meta: RiskMeta {
            records_used: 0,
            sheet: SHEET,
        },
    }
}

/// Injury risk per department: `(0.8 * sum actual + 0.2 * sum worst) * likelihood`.
pub fn department_risk(incident: &Table, spec: &FilterSpec) -> DepartmentRiskReport {
    let incident = filter::apply(incident, spec);
    let cols = IncidentColumns::resolve(&incident);
    let (used, groups) = cols.injury_totals(&incident, true);
    if groups.is_empty() {
        return empty_risk_report();
    }

    let counts: Vec<usize> = groups.values().map(|t| t.count).collect();
    let breaks = QuintileBreaks::from_counts(&counts);
    let scored: Vec<(String, DepartmentTotals, u8, f64)> = groups
        .into_iter()
        .map(|(department, totals)| {
            let likelihood = breaks.likelihood(totals.count);
            let score = (0.8 * totals.sum_actual + 0.2 * totals.sum_worst) * likelihood as f64;
            (department, totals, likelihood, score)
        })
        .collect();
    let scores: Vec<f64> = scored.iter().map(|s| s.3).collect();
    let normalized = min_max_normalize(&scores);

    let mut table: Vec<DepartmentRisk> = scored
        .into_iter()
        .zip(normalized)
        .map(|((department, totals, likelihood, score), norm)| DepartmentRisk {
            department,
            injury_count: totals.count,
            sum_actual_severity: round_to(totals.sum_actual, 3),
            sum_worst_severity: round_to(totals.sum_worst, 3),
            likelihood,
            risk_score: round_to(score, 3),
            normalized_score: round_to(norm, 3),
        })
        .collect();
    sort_desc_by(&mut table, |r| r.normalized_score);

    DepartmentRiskReport {
        labels: table.iter().map(|r| r.department.clone()).collect(),
        series: vec![
            Series::new(
                "Normalized Injury Risk Score",
                table.iter().map(|r| r.normalized_score).collect(),
            ),
            Series::new(
                "Injury Risk Score",
                table.iter().map(|r| r.risk_score).collect(),
            ),
        ],
        table,
        meta: RiskMeta {
            records_used: used,
            sheet: SHEET,
        },
    }
}

/// Actual-outcome risk per department: `sum actual * likelihood`, highest first.
pub fn actual_risk_scores(incident: &Table, spec: &FilterSpec) -> Vec<ActualRisk> {
    let incident = filter::apply(incident, spec);
    let cols = IncidentColumns::resolve(&incident);
    let (_, groups) = cols.injury_totals(&incident, false);
    if groups.is_empty() {
        return Vec::new();
    }
    let counts: Vec<usize> = groups.values().map(|t| t.count).collect();
    let breaks = QuintileBreaks::from_counts(&counts);
    let scored: Vec<(String, u8, f64)> = groups
        .into_iter()
        .map(|(department, totals)| {
            let likelihood = breaks.likelihood(totals.count);
            (department, likelihood, totals.sum_actual * likelihood as f64)
        })
        .collect();
    let normalized = min_max_normalize(&scored.iter().map(|s| s.2).collect::<Vec<_>>());

    let mut rows: Vec<ActualRisk> = scored
        .into_iter()
        .zip(normalized)
        .map(|((department, likelihood, score), norm)| ActualRisk {
            department,
            likelihood,
            actual_risk_score: round_to(score, 3),
            normalized_score: round_to(norm, 3),
        })
        .collect();
    sort_desc_by(&mut rows, |r| r.actual_risk_score);
    rows
}

/// High-potential near misses per department: actual score at most 2, worst-case at least 4.
pub fn potential_risk_scores(incident: &Table, spec: &FilterSpec) -> Vec<PotentialRisk> {
    let incident = filter::apply(incident, spec);
    let cols = IncidentColumns::resolve(&incident);
    let (Some(actual), Some(worst)) = (cols.actual, cols.worst) else {
        return Vec::new();
    };

    let mut groups: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    for row in 0..incident.len() {
        if !cols.has_id(&incident, row)
            || actual.value(&incident, row).is_missing()
            || worst.value(&incident, row).is_missing()
        {
            continue;
        }
        let actual_score = cols.actual_score(&incident, row);
        let worst_score = cols.worst_score(&incident, row);
        if actual_score > 2.0 || worst_score < 4.0 {
            continue;
        }
        let Some(department) = cols.department(&incident, row) else {
            continue;
        };
        let entry = groups.entry(department).or_default();
        entry.0 += 1;
        entry.1 += worst_score;
    }
    if groups.is_empty() {
        return Vec::new();
    }

    let counts: Vec<usize> = groups.values().map(|g| g.0).collect();
    let breaks = QuintileBreaks::from_counts(&counts);
    let scored: Vec<(String, u8, f64)> = groups
        .into_iter()
        .map(|(department, (count, sum_worst))| {
            let likelihood = breaks.likelihood(count);
            (department, likelihood, sum_worst * likelihood as f64)
        })
        .collect();
    let normalized = min_max_normalize(&scored.iter().map(|s| s.2).collect::<Vec<_>>());

    let mut rows: Vec<PotentialRisk> = scored
        .into_iter()
        .zip(normalized)
        .map(|((department, likelihood, score), norm)| PotentialRisk {
            department,
            potential_likelihood: likelihood,
            potential_risk_score: round_to(score, 3),
            normalized_potential_score: round_to(norm, 3),
        })
        .collect();
    sort_desc_by(&mut rows, |r| r.potential_risk_score);
    rows
}

#[derive(Debug, Default)]
struct MeanAcc {
    sum: f64,
    n: usize,
}

impl MeanAcc {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.n += 1;
        }
    }

    /// Groups with no usable values read as 0.
    fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }
}

/// Composite 0-100 index per department; lower severity, risk, delay and gaps score higher.
pub fn hse_performance_index(table: &Table, spec: &FilterSpec) -> Vec<PerformanceIndex> {
    let table = filter::apply(table, spec);
    let Some(dept) = columns::resolve(&table, &["department"]) else {
        return Vec::new();
    };
    let metrics = [
        columns::resolve(&table, &["severity_score"]),
        columns::resolve(&table, &["risk_score"]),
        columns::resolve(&table, columns::REPORTING_DELAY),
        columns::resolve(&table, columns::RESOLUTION_TIME),
        columns::resolve(&table, columns::ROOT_CAUSE_MISSING),
        columns::resolve(&table, columns::CORRECTIVE_ACTIONS_MISSING),
    ];

    let mut groups: BTreeMap<String, [MeanAcc; 6]> = BTreeMap::new();
    for row in 0..table.len() {
        let Some(department) = dept.value(&table, row).as_text() else {
            continue;
        };
        let accs = groups.entry(department).or_default();
        for (acc, col) in accs.iter_mut().zip(&metrics) {
            acc.push(col.and_then(|c| c.number(&table, row)));
        }
    }

    let mut rows: Vec<PerformanceIndex> = groups
        .into_iter()
        .map(|(department, accs)| {
            let sev = accs[0].mean().clamp(0.0, 5.0);
            let risk = accs[1].mean().clamp(0.0, 5.0);
            let rep = accs[2].mean().clamp(0.0, 30.0);
            let res = accs[3].mean().clamp(0.0, 60.0);
            let rc = accs[4].mean().clamp(0.0, 1.0);
            let ca = accs[5].mean().clamp(0.0, 1.0);
            let index = ((5.0 - sev) / 5.0 * 0.25
                + (5.0 - risk) / 5.0 * 0.25
                + (30.0 - rep) / 30.0 * 0.2
                + (60.0 - res) / 60.0 * 0.2
                + (1.0 - rc) * 0.05
                + (1.0 - ca) * 0.05)
                * 100.0;
            PerformanceIndex {
                department,
                severity_score: round_to(sev, 2),
                risk_score: round_to(risk, 2),
                reporting_delay_days: round_to(rep, 2),
                resolution_time_days: round_to(res, 2),
                root_cause_is_missing: round_to(rc, 2),
                corrective_actions_is_missing: round_to(ca, 2),
                hse_index: round_to(index, 2),
            }
        })
        .collect();
    sort_desc_by(&mut rows, |r| r.hse_index);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn injury_table(rows: &[(&str, &str, &str, &str)]) -> Table {
        let columns = [
            "Incident Number",
            "Incident Type(s)",
            "Actual Consequence (Incident)",
            "Worst Case Consequence (Incident)",
            "Department",
        ];
        let rows = rows
            .iter()
            .enumerate()
            .map(|(i, (kind, actual, worst, dept))| {
                vec![
                    Value::text(format!("INC-{i}")),
                    Value::text(*kind),
                    Value::text(*actual),
                    Value::text(*worst),
                    if dept.is_empty() {
                        Value::Missing
                    } else {
                        Value::text(*dept)
                    },
                ]
            })
            .collect();
        Table::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    #[test]
    fn quantile_interpolates_like_a_dataframe() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&sorted, 0.2) - 1.6).abs() < 1e-9);
        assert!((quantile(&sorted, 0.8) - 3.4).abs() < 1e-9);
        assert_eq!(quantile(&[7.0], 0.5), 7.0);
    }

    #[test]
    fn likelihood_is_monotonic_in_count() {
        let counts = [1, 2, 3, 5, 8, 13];
        let breaks = QuintileBreaks::from_counts(&counts);
        let ranks: Vec<u8> = counts.iter().map(|&c| breaks.likelihood(c)).collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ranks.first(), Some(&1));
        assert_eq!(ranks.last(), Some(&5));
    }

    #[test]
    fn single_department_forces_likelihood_one() {
        let breaks = QuintileBreaks::from_counts(&[40]);
        assert_eq!(breaks.cuts(), [1.0; 4]);
        assert_eq!(breaks.likelihood(1), 1);
        assert_eq!(breaks.likelihood(40), 5);
    }

    #[test]
    fn flat_scores_normalize_to_zero() {
        assert_eq!(min_max_normalize(&[3.0, 3.0, 3.0]), vec![0.0, 0.0, 0.0]);
        assert!(min_max_normalize(&[]).is_empty());
        assert_eq!(min_max_normalize(&[1.0, 3.0]), vec![0.0, 1.0]);
    }

    #[test]
    fn department_risk_weights_actual_over_worst() {
        let table = injury_table(&[
            ("Injury", "C3 - Severe", "C4 - Major", "Process"),
            ("Injury", "C1 - Minor", "C2 - Serious", "Process"),
            ("injury", "C0 - No Ill Effect", "C1 - Minor", "Warehouse"),
            ("Fire", "C4 - Major", "C5 - Catastrophic", "Warehouse"),
            ("Injury", "C2 - Serious", "unknown", ""),
        ]);
        let report = department_risk(&table, &FilterSpec::default());
        assert_eq!(report.meta.records_used, 4);
        assert_eq!(report.labels, vec!["Process", "Unknown", "Warehouse"]);

        let process = &report.table[0];
        assert_eq!(process.injury_count, 2);
        assert_eq!(process.likelihood, 5);
        assert_eq!(process.sum_actual_severity, 6.0);
        assert_eq!(process.sum_worst_severity, 8.0);
        assert!((process.risk_score - 32.0).abs() < 1e-9);
        assert_eq!(process.normalized_score, 1.0);

        let unknown = &report.table[1];
        assert_eq!(unknown.likelihood, 1);
        assert!((unknown.risk_score - 2.4).abs() < 1e-9);
        assert_eq!(report.series[0].name, "Normalized Injury Risk Score");
    }

    #[test]
    fn equal_scores_normalize_to_zero_per_department() {
        let table = injury_table(&[
            ("Injury", "C1 - Minor", "C1 - Minor", "A"),
            ("Injury", "C1 - Minor", "C1 - Minor", "B"),
        ]);
        let report = department_risk(&table, &FilterSpec::default());
        assert!(report.table.iter().all(|r| r.normalized_score == 0.0));
    }

    #[test]
    fn empty_input_keeps_report_shape() {
        let report = department_risk(&Table::empty(), &FilterSpec::default());
        assert!(report.labels.is_empty());
        assert!(report.series.is_empty());
        assert_eq!(report.meta.sheet, "Incident");
        assert!(actual_risk_scores(&Table::empty(), &FilterSpec::default()).is_empty());
        assert!(potential_risk_scores(&Table::empty(), &FilterSpec::default()).is_empty());
    }

    #[test]
    fn actual_risk_drops_rows_without_department() {
        let table = injury_table(&[
            ("Injury", "C3 - Severe", "C3 - Severe", "A"),
            ("Injury", "C2 - Serious", "C3 - Severe", ""),
        ]);
        let rows = actual_risk_scores(&table, &FilterSpec::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].actual_risk_score, 4.0);
    }

    #[test]
    fn potential_risk_selects_low_actual_high_worst() {
        let table = injury_table(&[
            ("Fire", "C0 - No Ill Effect", "C4 - Major", "A"),
            ("Spill", "C1 - Minor", "C3 - Severe", "A"),
            ("Injury", "C2 - Serious", "C5 - Catastrophic", "B"),
            ("Spill", "Not recorded", "C5 - Catastrophic", "B"),
        ]);
        let rows = potential_risk_scores(&table, &FilterSpec::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].department, "A");
        assert_eq!(rows[0].potential_likelihood, 5);
        assert_eq!(rows[0].potential_risk_score, 45.0);
        assert_eq!(rows[1].potential_likelihood, 1);
        assert_eq!(rows[1].potential_risk_score, 5.0);
    }

    #[test]
    fn performance_index_rewards_low_severity() {
        let columns = ["department", "severity_score", "risk_score", "root_cause_is_missing"];
        let rows = vec![
            vec!["Good".into(), 1.0.into(), 1.0.into(), false.into()],
            vec!["Bad".into(), 5.0.into(), 5.0.into(), true.into()],
            vec!["Bad".into(), 5.0.into(), Value::Missing, true.into()],
        ];
        let table = Table::new(columns.iter().map(|c| c.to_string()).collect(), rows);
        let index = hse_performance_index(&table, &FilterSpec::default());
        assert_eq!(index[0].department, "Good");
        // 0.8*25 + 0.8*25 + 20 + 20 + 5 + 5
        assert!((index[0].hse_index - 90.0).abs() < 1e-9);
        // 0 + 0 + 20 + 20 + 0 + 5
        assert!((index[1].hse_index - 45.0).abs() < 1e-9);
    }
}
