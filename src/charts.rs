//! Chart-ready shapes for the dashboard.
//!
//! Every builder filters its table first and returns the empty shape of its payload when nothing is
//! left, so callers never branch on "no data".

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;

use crate::aggregate::{self, Crosstab, Pareto};
use crate::columns::{self, Column};
use crate::filter::{self, FilterSpec};
use crate::models::{ChartData, Series};
use crate::severity::ConsequenceLevel;
use crate::table::{round_to, MonthPeriod, Table};

const TYPE_DISTRIBUTION_LIMIT: usize = 20;
const TOP_FINDINGS_LIMIT: usize = 20;
const REPEATED_LIMIT: usize = 15;
const INJURY_ORDER: [&str; 5] = ["Near Miss", "First Aid", "Recordable", "Lost Time", "Fatality"];
const HAZARD_SEVERITY_ORDER: [ConsequenceLevel; 4] = [
    ConsequenceLevel::C0,
    ConsequenceLevel::C1,
    ConsequenceLevel::C2,
    ConsequenceLevel::C3,
];

fn counts_chart(counts: Vec<(String, usize)>, name: &str) -> ChartData {
    if counts.is_empty() {
        return ChartData::empty();
    }
    let (labels, data): (Vec<String>, Vec<usize>) = counts.into_iter().unzip();
    ChartData {
        labels,
        series: vec![Series::counts(name, &data)],
    }
}

/// Collapses runs of whitespace, non-breaking spaces included, and trims.
fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_placeholder(text: &str) -> bool {
    matches!(text, "" | "nan" | "NaN" | "None" | "null" | "NULL")
}

/// Cleaned text of every row in `col`, skipping missing and placeholder cells.
fn clean_values(table: &Table, col: Column<'_>) -> Vec<Option<String>> {
    (0..table.len())
        .map(|row| {
            let text = squash(&col.text(table, row));
            (!is_placeholder(&text)).then_some(text)
        })
        .collect()
}

fn month_of(table: &Table, col: Column<'_>, row: usize) -> Option<MonthPeriod> {
    col.value(table, row).as_date().map(MonthPeriod::of)
}

/// Daily record counts, oldest first.
pub fn incident_trend(table: &Table, spec: &FilterSpec) -> ChartData {
    let table = filter::apply(table, spec);
    let Some(col) = columns::resolve_or_first(&table, columns::OCCURRENCE_DATE) else {
        return ChartData::empty();
    };
    let mut days: BTreeMap<String, usize> = BTreeMap::new();
    for row in 0..table.len() {
        if let Some(date) = col.value(&table, row).as_date() {
            *days.entry(date.format("%Y-%m-%d").to_string()).or_default() += 1;
        }
    }
    counts_chart(days.into_iter().collect(), "Count")
}

/// Top twenty incident types, splitting comma-joined values.
pub fn incident_type_distribution(table: &Table, spec: &FilterSpec) -> ChartData {
    let table = filter::apply(table, spec);
    let Some(col) = columns::resolve_or_first(&table, columns::FILTER_INCIDENT_TYPE) else {
        return ChartData::empty();
    };
    let parts = (0..table.len())
        .filter_map(|row| col.value(&table, row).as_text())
        .flat_map(|text| {
            text.split(',')
                .map(|p| p.trim().to_string())
                .collect::<Vec<_>>()
        });
    let counts = aggregate::value_counts(parts)
        .into_iter()
        .take(TYPE_DISTRIBUTION_LIMIT)
        .collect();
    counts_chart(counts, "Count")
}

fn split_semicolons(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(';').map(|p| p.trim().to_string()).filter(|p| !p.is_empty())
}

fn type_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:nan|null|none|n/a)$").expect("valid placeholder pattern"))
}

fn cause_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:nan|null|none|n/a|not applicable)$").expect("valid placeholder pattern")
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeOption {
    pub label: String,
    pub value: String,
    pub count: usize,
}

/// Selectable incident types for the root-cause Pareto, led by an "All" entry.
pub fn root_cause_incident_types(table: &Table, spec: &FilterSpec) -> Vec<TypeOption> {
    let table = filter::apply(table, spec);
    let Some(col) = columns::resolve_or_first(&table, columns::ROOT_CAUSE_TYPE) else {
        return Vec::new();
    };
    let types = (0..table.len())
        .filter_map(|row| col.value(&table, row).as_text())
        .flat_map(|text| split_semicolons(&text).collect::<Vec<_>>())
        .filter(|t| !type_placeholder().is_match(t));

    let mut options = vec![TypeOption {
        label: "All".to_string(),
        value: "All".to_string(),
        count: table.len(),
    }];
    options.extend(
        aggregate::value_counts(types)
            .into_iter()
            .map(|(label, count)| TypeOption {
                value: label.clone(),
                label,
                count,
            }),
    );
    options
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootCausePareto {
    #[serde(flatten)]
    pub pareto: Pareto,
    pub incident_type: String,
}

/// Root-cause Pareto, optionally narrowed to rows carrying one incident type.
pub fn root_cause_pareto(
    table: &Table,
    spec: &FilterSpec,
    incident_type: Option<&str>,
    top_n: usize,
) -> RootCausePareto {
    let selected = incident_type
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("all"));
    let label = incident_type.unwrap_or("All").to_string();
    let empty = || RootCausePareto {
        pareto: Pareto::default(),
        incident_type: label.clone(),
    };

    let mut table = filter::apply(table, spec);
    if let Some(selected) = selected {
        let Some(col) = columns::resolve_or_first(&table, columns::ROOT_CAUSE_TYPE) else {
            return empty();
        };
        let wanted = selected.to_lowercase();
        let mut keep = Vec::new();
        for row in 0..table.len() {
            let text = col.text(&table, row);
            let hits = text
                .split(';')
                .filter(|p| p.trim().to_lowercase() == wanted)
                .count();
            keep.extend(std::iter::repeat(row).take(hits));
        }
        table = table.select_rows(&keep);
    }

    let Some(col) = columns::resolve_or_first(&table, columns::ROOT_CAUSE) else {
        return empty();
    };
    let causes: Vec<String> = (0..table.len())
        .filter_map(|row| col.value(&table, row).as_text())
        .flat_map(|text| split_semicolons(&text).collect::<Vec<_>>())
        .filter(|c| !cause_placeholder().is_match(c))
        .collect();
    if causes.is_empty() {
        return empty();
    }
    RootCausePareto {
        pareto: aggregate::pareto(causes, top_n),
        incident_type: label,
    }
}

/// Injury classes in escalating order, followed by any other labels present.
pub fn injury_severity(table: &Table, spec: &FilterSpec) -> ChartData {
    let table = filter::apply(table, spec);
    let Some(col) = columns::resolve_or_first(&table, columns::INJURY_CLASSIFICATION) else {
        return ChartData::empty();
    };
    let counts = aggregate::value_counts(
        (0..table.len()).filter_map(|row| col.value(&table, row).as_text()),
    );
    let mut ordered: Vec<(String, usize)> = INJURY_ORDER
        .iter()
        .filter_map(|label| counts.iter().find(|(l, _)| l == label).cloned())
        .collect();
    ordered.extend(
        counts
            .into_iter()
            .filter(|(l, _)| !INJURY_ORDER.contains(&l.as_str())),
    );
    counts_chart(ordered, "Count")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub x: Vec<String>,
    pub y: Vec<String>,
    pub z: Vec<Vec<f64>>,
    pub metric: &'static str,
}

impl Heatmap {
    fn empty() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            metric: "count",
        }
    }
}

/// Department × month grid of mean risk/severity, or of record counts when neither column exists.
pub fn department_month_heatmap(table: &Table, spec: &FilterSpec) -> Heatmap {
    let table = filter::apply(table, spec);
    let department = columns::resolve_any(&table, &[&["department"], &["section"]])
        .or_else(|| columns::resolve_or_first(&table, &[]));
    let date = columns::resolve_or_first(&table, columns::OCCURRENCE_DATE);
    let (Some(department), Some(date)) = (department, date) else {
        return Heatmap::empty();
    };
    let metric_col = columns::resolve(&table, columns::RISK_OR_SEVERITY);

    let mut cells: BTreeMap<(String, MonthPeriod), (f64, usize)> = BTreeMap::new();
    for row in 0..table.len() {
        let Some(month) = month_of(&table, date, row) else {
            continue;
        };
        let value = match metric_col {
            Some(col) => match col.number(&table, row) {
                Some(v) => v,
                None => continue,
            },
            None => 1.0,
        };
        let dept = department
            .value(&table, row)
            .as_text()
            .unwrap_or_else(|| "Unknown".to_string());
        let cell = cells.entry((dept, month)).or_default();
        cell.0 += value;
        cell.1 += 1;
    }

    let y: Vec<String> = cells
        .keys()
        .map(|(d, _)| d.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let months: Vec<MonthPeriod> = cells
        .keys()
        .map(|(_, m)| *m)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let z = y
        .iter()
        .map(|dept| {
            months
                .iter()
                .map(|month| match cells.get(&(dept.clone(), *month)) {
                    Some(&(sum, n)) if metric_col.is_some() => sum / n as f64,
                    Some(&(_, n)) => n as f64,
                    None => 0.0,
                })
                .collect()
        })
        .collect();

    Heatmap {
        x: months.iter().map(ToString::to_string).collect(),
        y,
        z,
        metric: if metric_col.is_some() { "avg" } else { "count" },
    }
}

/// Actual × worst-case consequence counts.
pub fn consequence_gap(table: &Table, spec: &FilterSpec) -> Crosstab {
    let table = filter::apply(table, spec);
    let actual = columns::resolve_or_first(&table, columns::ACTUAL_CONSEQUENCE);
    let worst = columns::resolve_or_first(&table, columns::WORST_CONSEQUENCE);
    let (Some(actual), Some(worst)) = (actual, worst) else {
        return Crosstab::default();
    };
    let pairs: Vec<(String, String)> = (0..table.len())
        .filter_map(|row| {
            Some((
                actual.value(&table, row).as_text()?,
                worst.value(&table, row).as_text()?,
            ))
        })
        .collect();
    aggregate::crosstab(&pairs, None)
}

pub fn audit_status_distribution(audit: &Table, spec: &FilterSpec) -> ChartData {
    let audit = filter::apply(audit, spec);
    let Some(col) = columns::resolve_or_first(&audit, columns::AUDIT_STATUS) else {
        return ChartData::empty();
    };
    counts_chart(
        aggregate::value_counts((0..audit.len()).map(|row| col.text(&audit, row))),
        "Count",
    )
}

/// Mean audit rating per start month; months without a numeric rating plot as 0.
pub fn audit_rating_trend(audit: &Table, spec: &FilterSpec) -> ChartData {
    let audit = filter::apply(audit, spec);
    let date = columns::resolve_or_first(&audit, columns::AUDIT_START);
    let rating = columns::resolve(&audit, columns::AUDIT_RATING);
    let (Some(date), Some(rating)) = (date, rating) else {
        return ChartData::empty();
    };
    let mut months: BTreeMap<MonthPeriod, (f64, usize)> = BTreeMap::new();
    for row in 0..audit.len() {
        let Some(month) = month_of(&audit, date, row) else {
            continue;
        };
        let entry = months.entry(month).or_default();
        if let Some(value) = rating.number(&audit, row) {
            entry.0 += value;
            entry.1 += 1;
        }
    }
    if months.is_empty() {
        return ChartData::empty();
    }
    let (labels, data) = months
        .into_iter()
        .map(|(month, (sum, n))| {
            let mean = if n > 0 { round_to(sum / n as f64, 2) } else { 0.0 };
            (month.to_string(), mean)
        })
        .unzip();
    ChartData::single(labels, "Avg Rating", data)
}

/// Audits initiated and closed per month, one entry per audit id.
pub fn audit_monthly_volume(audit: &Table, spec: &FilterSpec) -> ChartData {
    let audit = filter::apply(audit, spec);
    let id = columns::resolve(&audit, columns::AUDIT_ID);
    let start = columns::resolve(&audit, columns::AUDIT_SCHEDULED);
    let closed = columns::resolve(&audit, columns::AUDIT_CLOSED);
    if start.is_none() && closed.is_none() {
        return ChartData::empty();
    }

    // Per audit: earliest start, latest close.
    let mut audits: BTreeMap<String, (Option<NaiveDateTime>, Option<NaiveDateTime>)> = BTreeMap::new();
    for row in 0..audit.len() {
        let key = match id {
            Some(col) => match col.value(&audit, row).as_text() {
                Some(id) => id,
                None => continue,
            },
            None => format!("AUD-{}", row + 1),
        };
        let started = start.and_then(|c| c.value(&audit, row).as_datetime());
        let finished = closed.and_then(|c| c.value(&audit, row).as_datetime());
        let entry = audits.entry(key).or_default();
        entry.0 = match (entry.0, started) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        entry.1 = match (entry.1, finished) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    let mut initiated: BTreeMap<MonthPeriod, usize> = BTreeMap::new();
    let mut completed: BTreeMap<MonthPeriod, usize> = BTreeMap::new();
    for (first, last) in audits.values() {
        if let Some(first) = first {
            *initiated.entry(MonthPeriod::of(first.date())).or_default() += 1;
        }
        if let Some(last) = last {
            *completed.entry(MonthPeriod::of(last.date())).or_default() += 1;
        }
    }
    if initiated.is_empty() && completed.is_empty() {
        return ChartData::empty();
    }

    let mut span: BTreeMap<MonthPeriod, usize> = BTreeMap::new();
    for month in initiated.keys().chain(completed.keys()) {
        span.insert(*month, 0);
    }
    let months: Vec<MonthPeriod> = aggregate::fill_month_gaps(&span)
        .into_iter()
        .map(|(m, _)| m)
        .collect();
    let series_for = |counts: &BTreeMap<MonthPeriod, usize>| -> Vec<usize> {
        months
            .iter()
            .map(|m| counts.get(m).copied().unwrap_or(0))
            .collect()
    };

    let mut series = Vec::new();
    if start.is_some() && !initiated.is_empty() {
        series.push(Series::counts("Audits Initiated", &series_for(&initiated)));
    }
    if closed.is_some() && !completed.is_empty() {
        series.push(Series::counts("Audits Closed", &series_for(&completed)));
    }
    ChartData {
        labels: months.iter().map(ToString::to_string).collect(),
        series,
    }
}

/// Inspections per month, one series per status.
pub fn inspection_coverage(inspection: &Table, spec: &FilterSpec) -> ChartData {
    let inspection = filter::apply(inspection, spec);
    let date = columns::resolve_or_first(&inspection, columns::AUDIT_START);
    let status = columns::resolve_or_first(&inspection, columns::AUDIT_STATUS);
    let (Some(date), Some(status)) = (date, status) else {
        return ChartData::empty();
    };
    let pairs: Vec<(String, String)> = (0..inspection.len())
        .filter_map(|row| {
            let month = month_of(&inspection, date, row)?;
            Some((month.to_string(), status.text(&inspection, row)))
        })
        .collect();
    if pairs.is_empty() {
        return ChartData::empty();
    }
    let pivot = aggregate::crosstab(&pairs, None);
    let series = pivot
        .cols
        .iter()
        .enumerate()
        .map(|(ci, name)| {
            let data: Vec<usize> = pivot.z.iter().map(|row| row[ci]).collect();
            Series::counts(name.clone(), &data)
        })
        .collect();
    ChartData {
        labels: pivot.rows,
        series,
    }
}

fn finding_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:n/?a|na|nan|null|none|not\s*applicable)$").expect("valid finding pattern")
    })
}

fn finding_negation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:no(?:\s+|$)|no\s+(?:finding|findings|observation|observations|deficien(?:cy|cies)|issue|issues|recommendations?)$)",
        )
        .expect("valid negation pattern")
    })
}

const FINDING_TRIM: &[char] = &[' ', '\t', '\r', '\n', '-', '–', '•', '·', ';', ':', ',', '.'];

fn normalize_finding(text: &str) -> String {
    squash(text).trim_matches(FINDING_TRIM).to_string()
}

/// Twenty most frequent audit or inspection findings after cleanup.
///
/// Placeholders and "no findings" style negations are dropped. When the only usable column is a
/// checklist category, semicolon/comma joined categories are counted separately.
pub fn top_findings(table: &Table, spec: &FilterSpec) -> ChartData {
    let table = filter::apply(table, spec);
    let Some(col) = columns::resolve_or_first(&table, columns::FINDINGS) else {
        return ChartData::empty();
    };
    let category_like = matches!(
        col.name.trim().to_lowercase().as_str(),
        "checklist_category" | "checklist category"
    );

    let mut tokens = Vec::new();
    for row in 0..table.len() {
        let Some(raw) = col.value(&table, row).as_text() else {
            continue;
        };
        let text = normalize_finding(&raw);
        if text.is_empty() || finding_placeholder().is_match(&text) || finding_negation().is_match(&text) {
            continue;
        }
        if category_like {
            tokens.extend(
                text.split([';', ','])
                    .map(normalize_finding)
                    .filter(|t| !t.is_empty()),
            );
        } else {
            tokens.push(text);
        }
    }
    let counts = aggregate::value_counts(tokens)
        .into_iter()
        .take(TOP_FINDINGS_LIMIT)
        .collect();
    counts_chart(counts, "Count")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HazardSeverityChart {
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    pub totals: Vec<usize>,
    pub legend: Vec<String>,
    pub records_used: usize,
    pub min_count_for_others: usize,
}

/// Hazards per incident type stacked by worst-case consequence C0 to C3.
pub fn hazard_severity_by_type(hazard: &Table, spec: &FilterSpec, min_count: usize) -> HazardSeverityChart {
    let hazard = filter::apply(hazard, spec);
    let kind = columns::resolve(&hazard, columns::HAZARD_TYPE);
    let severity = columns::resolve(&hazard, columns::HAZARD_WORST_CONSEQUENCE);
    let (Some(kind), Some(severity)) = (kind, severity) else {
        return HazardSeverityChart::default();
    };

    let (types, levels): (Vec<String>, Vec<String>) = clean_values(&hazard, kind)
        .into_iter()
        .zip(clean_values(&hazard, severity))
        .filter_map(|(t, s)| Some((t?, s?)))
        .unzip();
    if types.is_empty() {
        return HazardSeverityChart::default();
    }
    let records_used = types.len();

    let grouped = aggregate::group_others(types, min_count);
    let pairs: Vec<(String, String)> = grouped.into_iter().zip(levels).collect();
    let legend: Vec<&str> = HAZARD_SEVERITY_ORDER.iter().map(|l| l.label()).collect();
    let mut matrix = aggregate::crosstab(&pairs, Some(legend.as_slice()));
    matrix.sort_rows_by_total();

    let series = legend
        .iter()
        .enumerate()
        .map(|(ci, name)| {
            let data: Vec<usize> = matrix.z.iter().map(|row| row[ci]).collect();
            Series::counts(*name, &data)
        })
        .collect();

    HazardSeverityChart {
        totals: matrix.row_totals(),
        labels: matrix.rows,
        series,
        legend: legend.iter().map(|l| l.to_string()).collect(),
        records_used,
        min_count_for_others: min_count,
    }
}

/// Hazard counts per incident type, all categories.
pub fn hazard_type_counts(hazard: &Table, spec: &FilterSpec) -> ChartData {
    let hazard = filter::apply(hazard, spec);
    let Some(col) = columns::resolve(&hazard, columns::HAZARD_TYPE) else {
        return ChartData::empty();
    };
    let counts = aggregate::value_counts(clean_values(&hazard, col).into_iter().flatten());
    counts_chart(counts, "Hazards")
}

/// Summed cost per occurrence month, rounded to whole units.
pub fn cost_trend(table: &Table, spec: &FilterSpec) -> ChartData {
    let table = filter::apply(table, spec);
    let date = columns::resolve_or_first(&table, columns::OCCURRENCE_DATE);
    let cost = columns::resolve(&table, columns::COST);
    let (Some(date), Some(cost)) = (date, cost) else {
        return ChartData::empty();
    };
    let mut months: BTreeMap<MonthPeriod, f64> = BTreeMap::new();
    for row in 0..table.len() {
        if let Some(month) = month_of(&table, date, row) {
            *months.entry(month).or_default() += cost.number(&table, row).unwrap_or(0.0);
        }
    }
    if months.is_empty() {
        return ChartData::empty();
    }
    let (labels, data) = months
        .into_iter()
        .map(|(m, total)| (m.to_string(), round_to(total, 0)))
        .unzip();
    ChartData::single(labels, "Total Cost", data)
}

/// Locations with the most incidents flagged as repeats.
pub fn repeated_incidents(incident: &Table, spec: &FilterSpec) -> ChartData {
    let incident = filter::apply(incident, spec);
    let flag = columns::resolve(&incident, columns::REPEATED);
    let location = columns::resolve(&incident, columns::REPEATED_LOCATION);
    let (Some(flag), Some(location)) = (flag, location) else {
        return ChartData::empty();
    };
    let repeated = (0..incident.len())
        .filter(|&row| {
            matches!(
                flag.text(&incident, row).to_lowercase().as_str(),
                "yes" | "true" | "1"
            )
        })
        .map(|row| location.text(&incident, row));
    let counts = aggregate::value_counts(repeated)
        .into_iter()
        .take(REPEATED_LIMIT)
        .collect();
    counts_chart(counts, "Repeated Count")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn table(columns: &[&str], rows: Vec<Vec<&str>>) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.into_iter()
                .map(|r| r.into_iter().map(Value::from).collect())
                .collect(),
        )
    }

    fn none() -> FilterSpec {
        FilterSpec::default()
    }

    #[test]
    fn empty_tables_yield_empty_shapes() {
        let empty = Table::empty();
        assert!(incident_trend(&empty, &none()).is_empty());
        assert!(incident_type_distribution(&empty, &none()).series.is_empty());
        assert!(audit_monthly_volume(&empty, &none()).is_empty());
        assert!(top_findings(&empty, &none()).is_empty());
        assert!(hazard_severity_by_type(&empty, &none(), 8).labels.is_empty());
        assert!(department_month_heatmap(&empty, &none()).z.is_empty());
        assert!(consequence_gap(&empty, &none()).rows.is_empty());
        assert!(root_cause_pareto(&empty, &none(), None, 15).pareto.labels.is_empty());
    }

    #[test]
    fn trend_counts_per_day() {
        let t = table(
            &["occurrence_date"],
            vec![vec!["2024-01-02"], vec!["2024-01-01 08:30"], vec!["2024-01-02"]],
        );
        let chart = incident_trend(&t, &none());
        assert_eq!(chart.labels, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(chart.series[0].data, vec![1.0, 2.0]);
    }

    #[test]
    fn type_distribution_splits_on_commas() {
        let t = table(&["incident_type"], vec![vec!["Fire, Spill"], vec!["Fire"]]);
        let chart = incident_type_distribution(&t, &none());
        assert_eq!(chart.labels, vec!["Fire", "Spill"]);
        assert_eq!(chart.series[0].data, vec![2.0, 1.0]);
    }

    #[test]
    fn pareto_drops_placeholders_and_honours_type_selection() {
        let t = table(
            &["incident_type", "root cause"],
            vec![
                vec!["Fire; Injury", "Training; N/A"],
                vec!["Fire", "Training"],
                vec!["Injury", "Housekeeping"],
                vec!["Injury", "Maintenance"],
            ],
        );
        let all = root_cause_pareto(&t, &none(), None, 15);
        assert_eq!(all.pareto.labels, vec!["Training", "Housekeeping", "Maintenance"]);
        assert_eq!(all.incident_type, "All");

        let fire = root_cause_pareto(&t, &none(), Some("fire"), 15);
        assert_eq!(fire.pareto.labels, vec!["Training"]);
        assert_eq!(fire.pareto.bars, vec![2]);
        assert_eq!(fire.pareto.cum_pct, vec![100.0]);
    }

    #[test]
    fn incident_type_options_start_with_all() {
        let t = table(&["incident_type"], vec![vec!["Fire; Spill"], vec!["Fire"], vec!["none"]]);
        let options = root_cause_incident_types(&t, &none());
        assert_eq!(options[0].label, "All");
        assert_eq!(options[0].count, 3);
        assert_eq!(options[1].label, "Fire");
        assert_eq!(options[1].count, 2);
        assert_eq!(options.len(), 3);
    }

    #[test]
    fn injury_severity_uses_escalating_order() {
        let t = table(
            &["injury classification"],
            vec![vec!["Fatality"], vec!["First Aid"], vec!["Other"], vec!["Other"]],
        );
        let chart = injury_severity(&t, &none());
        assert_eq!(chart.labels, vec!["First Aid", "Fatality", "Other"]);
    }

    #[test]
    fn heatmap_averages_risk_by_department_and_month() {
        let t = table(
            &["department", "occurrence_date", "risk_score"],
            vec![
                vec!["Ops", "2024-01-05", "2"],
                vec!["Ops", "2024-01-20", "4"],
                vec!["Lab", "2024-02-01", "1"],
            ],
        );
        let map = department_month_heatmap(&t, &none());
        assert_eq!(map.metric, "avg");
        assert_eq!(map.x, vec!["2024-01", "2024-02"]);
        assert_eq!(map.y, vec!["Lab", "Ops"]);
        assert_eq!(map.z, vec![vec![0.0, 1.0], vec![3.0, 0.0]]);
    }

    #[test]
    fn audit_volume_dedupes_and_fills_gaps() {
        let t = table(
            &["audit number", "start date", "entered closed"],
            vec![
                vec!["A-1", "2024-01-10", ""],
                vec!["A-1", "2024-01-03", "2024-04-02"],
                vec!["A-2", "2024-02-15", "2024-02-20"],
            ],
        );
        let chart = audit_monthly_volume(&t, &none());
        assert_eq!(chart.labels, vec!["2024-01", "2024-02", "2024-03", "2024-04"]);
        assert_eq!(chart.series[0].name, "Audits Initiated");
        assert_eq!(chart.series[0].data, vec![1.0, 1.0, 0.0, 0.0]);
        assert_eq!(chart.series[1].name, "Audits Closed");
        assert_eq!(chart.series[1].data, vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn audit_volume_skips_rows_without_an_id() {
        let t = table(
            &["audit number", "start date"],
            vec![
                vec!["", "2024-01-05"],
                vec!["", "2024-03-05"],
                vec!["A-1", "2024-02-05"],
            ],
        );
        let chart = audit_monthly_volume(&t, &none());
        assert_eq!(chart.labels, vec!["2024-02"]);
        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.series[0].data, vec![1.0]);
    }

    #[test]
    fn audit_volume_without_id_column_counts_each_row() {
        let t = table(&["start date"], vec![vec!["2024-01-05"], vec!["2024-03-05"]]);
        let chart = audit_monthly_volume(&t, &none());
        assert_eq!(chart.labels, vec!["2024-01", "2024-02", "2024-03"]);
        assert_eq!(chart.series[0].data, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn findings_drop_negations_and_split_categories() {
        let t = table(
            &["checklist category"],
            vec![
                vec!["PPE; Housekeeping."],
                vec!["No findings"],
                vec!["N/A"],
                vec!["  PPE  "],
            ],
        );
        let chart = top_findings(&t, &none());
        assert_eq!(chart.labels, vec!["PPE", "Housekeeping"]);
        assert_eq!(chart.series[0].data, vec![2.0, 1.0]);
    }

    #[test]
    fn hazard_severity_groups_small_types_and_fixes_columns() {
        let mut rows = vec![vec!["Site HSE Rules", "C1 - Minor"]; 3];
        rows.push(vec!["Spill", "C3 - Severe"]);
        rows.push(vec!["Noise", "C0 - No Ill Effect"]);
        rows.push(vec!["nan", "C1 - Minor"]);
        let t = table(
            &["incident type(s)", "worst case consequence potential (hazard id)"],
            rows,
        );
        let chart = hazard_severity_by_type(&t, &none(), 2);
        assert_eq!(chart.labels, vec!["Site HSE Rules", "Others"]);
        assert_eq!(chart.totals, vec![3, 2]);
        assert_eq!(chart.legend.len(), 4);
        assert_eq!(chart.series[1].data, vec![3.0, 0.0]);
        assert_eq!(chart.series[3].data, vec![0.0, 1.0]);
        assert_eq!(chart.records_used, 5);
    }

    #[test]
    fn repeated_incidents_count_flagged_locations() {
        let t = table(
            &["repeated_incident", "location"],
            vec![vec!["Yes", "Plant A"], vec!["no", "Plant A"], vec!["TRUE", "Plant A"], vec!["1", "Yard"]],
        );
        let chart = repeated_incidents(&t, &none());
        assert_eq!(chart.labels, vec!["Plant A", "Yard"]);
        assert_eq!(chart.series[0].name, "Repeated Count");
        assert_eq!(chart.series[0].data, vec![2.0, 1.0]);
    }

    #[test]
    fn cost_trend_sums_per_month() {
        let t = table(
            &["occurrence_date", "total cost"],
            vec![vec!["2024-01-02", "100.4"], vec!["2024-01-09", "50"], vec!["2024-02-01", "x"]],
        );
        let chart = cost_trend(&t, &none());
        assert_eq!(chart.labels, vec!["2024-01", "2024-02"]);
        assert_eq!(chart.series[0].data, vec![150.0, 0.0]);
    }
}
