//! Declarative row filtering, filter summaries and dropdown options.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::columns::{self, Column};
use crate::table::{round_to, Table, Value};

/// Declarative row filter. Every field is optional; an absent field or an empty list is no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub departments: Vec<String>,
    pub locations: Vec<String>,
    pub sublocations: Vec<String>,
    pub statuses: Vec<String>,
    pub incident_types: Vec<String>,
    pub violation_types: Vec<String>,
    pub min_severity: Option<f64>,
    pub max_severity: Option<f64>,
    pub min_risk: Option<f64>,
    pub max_risk: Option<f64>,
}

impl FilterSpec {
    pub fn dates(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        Self {
            start_date,
            end_date,
            ..Self::default()
        }
    }

    /// Names of the options that constrain anything.
    pub fn active_filters(&self) -> Vec<&'static str> {
        let lists: [(&'static str, &Vec<String>); 6] = [
            ("departments", &self.departments),
            ("locations", &self.locations),
            ("sublocations", &self.sublocations),
            ("statuses", &self.statuses),
            ("incident_types", &self.incident_types),
            ("violation_types", &self.violation_types),
        ];
        let bounds = [
            ("min_severity", self.min_severity),
            ("max_severity", self.max_severity),
            ("min_risk", self.min_risk),
            ("max_risk", self.max_risk),
        ];

        let mut active = Vec::new();
        if self.start_date.is_some() {
            active.push("start_date");
        }
        if self.end_date.is_some() {
            active.push("end_date");
        }
        active.extend(
            lists
                .iter()
                .filter(|(_, values)| needles(values).next().is_some())
                .map(|(name, _)| *name),
        );
        active.extend(bounds.iter().filter(|(_, b)| b.is_some()).map(|(name, _)| *name));
        active
    }

    pub fn is_empty(&self) -> bool {
        self.active_filters().is_empty()
    }
}

fn needles(values: &[String]) -> impl Iterator<Item = String> + '_ {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// Narrows `table` by every active predicate of `spec`.
///
/// Predicates whose column cannot be resolved on this table are skipped. Each predicate only
/// removes rows, so the result is the intersection and applying it twice changes nothing.
pub fn apply(table: &Table, spec: &FilterSpec) -> Table {
    if table.is_empty() || spec.is_empty() {
        return table.clone();
    }
    let mut keep = vec![true; table.len()];

    if spec.start_date.is_some() || spec.end_date.is_some() {
        if let Some(col) = columns::resolve(table, columns::FILTER_DATE) {
            narrow(table, col, &mut keep, |value| {
                let Some(date) = value.as_date() else {
                    return false;
                };
                spec.start_date.map_or(true, |start| date >= start)
                    && spec.end_date.map_or(true, |end| date <= end)
            });
        }
    }

    let lists = [
        (columns::FILTER_DEPARTMENT, &spec.departments),
        (columns::FILTER_LOCATION, &spec.locations),
        (columns::FILTER_SUBLOCATION, &spec.sublocations),
        (columns::FILTER_STATUS, &spec.statuses),
        (columns::FILTER_INCIDENT_TYPE, &spec.incident_types),
        (columns::FILTER_VIOLATION_TYPE, &spec.violation_types),
    ];
    for (candidates, values) in lists {
        let wanted: Vec<String> = needles(values).collect();
        if wanted.is_empty() {
            continue;
        }
        if let Some(col) = columns::resolve(table, candidates) {
            narrow(table, col, &mut keep, |value| {
                let haystack = value.display_text().to_lowercase();
                wanted.iter().any(|needle| haystack.contains(needle.as_str()))
            });
        }
    }

    let ranges = [
        (columns::FILTER_SEVERITY, spec.min_severity, spec.max_severity),
        (columns::FILTER_RISK, spec.min_risk, spec.max_risk),
    ];
    for (candidates, min, max) in ranges {
        if min.is_none() && max.is_none() {
            continue;
        }
        if let Some(col) = columns::resolve(table, candidates) {
            narrow(table, col, &mut keep, |value| {
                let Some(n) = value.as_number() else {
                    return false;
                };
                min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi)
            });
        }
    }

    let indices: Vec<usize> = keep
        .iter()
        .enumerate()
        .filter_map(|(i, k)| k.then_some(i))
        .collect();
    debug!(before = table.len(), after = indices.len(), "filter applied");
    table.select_rows(&indices)
}

fn narrow<F>(table: &Table, col: Column<'_>, keep: &mut [bool], predicate: F)
where
    F: Fn(&Value) -> bool,
{
    for (row, flag) in keep.iter_mut().enumerate() {
        if *flag && !predicate(table.cell(row, col.index)) {
            *flag = false;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSummary {
    pub original_count: usize,
    pub filtered_count: usize,
    pub removed_count: usize,
    pub percent_retained: f64,
    pub active_filters: Vec<String>,
}

/// How much a filter narrowed a table.
pub fn filter_summary(original: &Table, filtered: &Table, spec: &FilterSpec) -> FilterSummary {
    let original_count = original.len();
    let filtered_count = filtered.len();
    let percent_retained = if original_count == 0 {
        0.0
    } else {
        round_to(filtered_count as f64 / original_count as f64 * 100.0, 1)
    };
    FilterSummary {
        original_count,
        filtered_count,
        removed_count: original_count.saturating_sub(filtered_count),
        percent_retained,
        active_filters: spec.active_filters().into_iter().map(String::from).collect(),
    }
}

const NULL_LIKE: &[&str] = &["nan", "none", "not specified", "not assigned", "n/a", "na", ""];

const INCIDENT_LOCATIONS: &[&str] = &["Location", "Sub-Location", "Location (EPCL)"];
const AUDIT_LOCATIONS: &[&str] = &["Audit Location", "Location (EPCL)"];
const DEPARTMENTS: &[&str] = &["Department", "Sub-department", "Section"];
const STATUSES: &[&str] = &["Status"];
const AUDIT_STATUSES: &[&str] = &["Audit Status"];
const COMPANIES: &[&str] = &["Group Company"];
const INCIDENT_TYPES: &[&str] = &["Incident Type(s)", "Category"];
const VIOLATION_TYPES: &[&str] = &["Violation Type (Hazard ID)"];
const INCIDENT_CONSEQUENCES: &[&str] = &[
    "Worst Case Consequence (Incident)",
    "Actual Consequence (Incident)",
    "Relevant Consequence (Incident)",
];
const HAZARD_CONSEQUENCES: &[&str] = &[
    "Worst Case Consequence Potential (Hazard ID)",
    "Relevant Consequence (Hazard ID)",
];

/// Dropdown values for every filterable field, gathered across all four sheets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub locations: Vec<String>,
    pub departments: Vec<String>,
    pub statuses: Vec<String>,
    pub companies: Vec<String>,
    pub incident_types: Vec<String>,
    pub violation_types: Vec<String>,
    pub consequences: Vec<String>,
    pub counts: BTreeMap<String, usize>,
}

pub fn filter_options(
    incident: &Table,
    hazard: &Table,
    audit: &Table,
    inspection: &Table,
) -> FilterOptions {
    let mut locations = BTreeSet::new();
    collect_unique(incident, INCIDENT_LOCATIONS, &mut locations);
    collect_unique(hazard, INCIDENT_LOCATIONS, &mut locations);
    collect_unique(audit, AUDIT_LOCATIONS, &mut locations);
    collect_unique(inspection, AUDIT_LOCATIONS, &mut locations);

    let mut departments = BTreeSet::new();
    collect_unique(incident, DEPARTMENTS, &mut departments);
    collect_unique(hazard, DEPARTMENTS, &mut departments);

    let mut statuses = BTreeSet::new();
    collect_unique(incident, STATUSES, &mut statuses);
    collect_unique(hazard, STATUSES, &mut statuses);
    collect_unique(audit, AUDIT_STATUSES, &mut statuses);
    collect_unique(inspection, AUDIT_STATUSES, &mut statuses);

    let mut companies = BTreeSet::new();
    for table in [incident, hazard, audit, inspection] {
        collect_unique(table, COMPANIES, &mut companies);
    }

    let mut raw_types = BTreeSet::new();
    collect_unique(incident, INCIDENT_TYPES, &mut raw_types);
    let incident_types: BTreeSet<String> = raw_types
        .iter()
        .flat_map(|t| t.split(';'))
        .map(|part| part.trim().to_string())
        .filter(|part| !is_null_like(part))
        .collect();

    let mut violation_types = BTreeSet::new();
    collect_unique(hazard, VIOLATION_TYPES, &mut violation_types);

    let mut consequences = BTreeSet::new();
    collect_unique(incident, INCIDENT_CONSEQUENCES, &mut consequences);
    collect_unique(hazard, HAZARD_CONSEQUENCES, &mut consequences);

    let mut options = FilterOptions {
        locations: locations.into_iter().collect(),
        departments: departments.into_iter().collect(),
        statuses: statuses.into_iter().collect(),
        companies: companies.into_iter().collect(),
        incident_types: incident_types.into_iter().collect(),
        violation_types: violation_types.into_iter().collect(),
        consequences: consequences.into_iter().collect(),
        counts: BTreeMap::new(),
    };
    let counts = [
        ("locations", options.locations.len()),
        ("departments", options.departments.len()),
        ("statuses", options.statuses.len()),
        ("companies", options.companies.len()),
        ("incident_types", options.incident_types.len()),
        ("violation_types", options.violation_types.len()),
        ("consequences", options.consequences.len()),
    ];
    options.counts = counts
        .into_iter()
        .map(|(name, n)| (name.to_string(), n))
        .collect();
    options
}

fn is_null_like(value: &str) -> bool {
    NULL_LIKE.contains(&value.trim().to_lowercase().as_str())
}

fn collect_unique(table: &Table, names: &[&str], into: &mut BTreeSet<String>) {
    for name in names {
        let wanted = name.trim().to_lowercase();
        let Some(index) = table
            .columns()
            .iter()
            .position(|c| c.trim().to_lowercase() == wanted)
        else {
            continue;
        };
        for value in table.column_values(index) {
            if let Some(text) = value.as_text() {
                let text = text.trim();
                if !is_null_like(text) {
                    into.insert(text.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incidents() -> Table {
        let columns = ["occurrence_date", "department", "status", "severity_score"];
        let rows = vec![
            vec!["2024-01-05".into(), "Process - PVC".into(), "Open".into(), 3.0.into()],
            vec!["2024-02-10 14:30:00".into(), "HSE".into(), "Closed".into(), 1.0.into()],
            vec!["garbage".into(), "Maintenance".into(), "Open".into(), "high".into()],
            vec!["2024-03-31".into(), "PVC Utilities".into(), "Pending Review".into(), 2.0.into()],
        ];
        Table::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_spec_keeps_everything() {
        let t = incidents();
        assert_eq!(apply(&t, &FilterSpec::default()), t);
    }

    #[test]
    fn department_filter_uses_loose_contains() {
        let spec = FilterSpec {
            departments: vec!["pvc".into()],
            ..FilterSpec::default()
        };
        let out = apply(&incidents(), &spec);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn end_date_includes_the_whole_day() {
        let spec = FilterSpec::dates(Some(date(2024, 2, 1)), Some(date(2024, 2, 10)));
        let out = apply(&incidents(), &spec);
        assert_eq!(out.len(), 1);
        assert_eq!(out.cell(0, 1).display_text(), "HSE");
    }

    #[test]
    fn unparseable_dates_drop_only_under_an_active_bound() {
        let spec = FilterSpec::dates(None, Some(date(2030, 1, 1)));
        assert_eq!(apply(&incidents(), &spec).len(), 3);
    }

    #[test]
    fn numeric_bounds_are_inclusive_and_skip_text() {
        let spec = FilterSpec {
            min_severity: Some(2.0),
            max_severity: Some(3.0),
            ..FilterSpec::default()
        };
        assert_eq!(apply(&incidents(), &spec).len(), 2);
    }

    #[test]
    fn unresolvable_column_is_a_no_op() {
        let spec = FilterSpec {
            violation_types: vec!["PPE".into()],
            min_risk: Some(4.0),
            ..FilterSpec::default()
        };
        assert_eq!(apply(&incidents(), &spec).len(), 4);
    }

    #[test]
    fn applying_twice_matches_applying_once() {
        let spec = FilterSpec {
            start_date: Some(date(2024, 1, 1)),
            statuses: vec!["open".into(), "review".into()],
            min_severity: Some(1.0),
            ..FilterSpec::default()
        };
        let once = apply(&incidents(), &spec);
        let twice = apply(&once, &spec);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn summary_reports_retention_and_active_names() {
        let t = incidents();
        let spec = FilterSpec {
            statuses: vec!["closed".into()],
            departments: vec!["  ".into()],
            ..FilterSpec::default()
        };
        let filtered = apply(&t, &spec);
        let summary = filter_summary(&t, &filtered, &spec);
        assert_eq!(summary.filtered_count, 1);
        assert_eq!(summary.percent_retained, 25.0);
        assert_eq!(summary.active_filters, vec!["statuses".to_string()]);
    }

    #[test]
    fn options_split_types_and_drop_null_likes() {
        let incident = Table::new(
            vec!["Incident Type(s)".into(), "Department".into(), "Group Company".into()],
            vec![
                vec!["Injury; Near Miss".into(), "PVC".into(), "EPCL".into()],
                vec!["Injury".into(), "not specified".into(), Value::Missing],
            ],
        );
        let audit = Table::new(
            vec!["Audit Status".into(), "Audit Location".into()],
            vec![vec!["Closed".into(), "N/A".into()]],
        );
        let options = filter_options(&incident, &Table::empty(), &audit, &Table::empty());
        assert_eq!(options.incident_types, vec!["Injury", "Near Miss"]);
        assert_eq!(options.departments, vec!["PVC"]);
        assert_eq!(options.statuses, vec!["Closed"]);
        assert!(options.locations.is_empty());
        assert_eq!(options.counts["companies"], 1);
    }
}
