//! Heinrich safety pyramid counts and their departmental and locational breakdowns.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::columns::{self, text_or_empty, Column};
use crate::filter::{self, FilterSpec};
use crate::severity::{
    classify_heinrich, is_audit_unsafe_condition, is_hazard_unsafe_condition, ConsequenceLevel,
    IncidentView, PyramidTier,
};
use crate::table::{round_to, Table};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PyramidLevel {
    pub level: u8,
    pub description: &'static str,
    pub color_code: &'static str,
    pub count: usize,
    pub percent: f64,
}

/// Per-row pyramid tier for every incident.
pub fn incident_tiers(incident: &Table) -> Vec<Option<PyramidTier>> {
    let type_col = columns::resolve(incident, columns::INCIDENT_TYPE);
    let actual_col = columns::resolve(incident, columns::ACTUAL_CONSEQUENCE);
    let worst_col = columns::resolve(incident, columns::WORST_CONSEQUENCE);
    (0..incident.len())
        .map(|row| {
            let incident_type = text_or_empty(incident, type_col, row);
            let actual = text_or_empty(incident, actual_col, row);
            let worst = text_or_empty(incident, worst_col, row);
            classify_heinrich(&IncidentView {
                incident_type: &incident_type,
                actual: &actual,
                worst: &worst,
            })
        })
        .collect()
}

/// Hazard rows whose worst-case potential is exactly C1 or C2.
pub fn hazard_unsafe_conditions(hazard: &Table) -> usize {
    count_matching(hazard, columns::HAZARD_WORST_CONSEQUENCE, is_hazard_unsafe_condition)
}

/// Audit rows that mention C1 or C2 anywhere in their consequence field.
pub fn audit_unsafe_conditions(audit: &Table) -> usize {
    count_matching(audit, columns::AUDIT_WORST_CONSEQUENCE, is_audit_unsafe_condition)
}

fn count_matching(table: &Table, candidates: &[&str], predicate: fn(&str) -> bool) -> usize {
    let Some(col) = columns::resolve(table, candidates) else {
        return 0;
    };
    (0..table.len())
        .filter(|&row| predicate(&col.text(table, row)))
        .count()
}

/// Always five rows, levels 1 to 5. Rows matching no rule are left out of every count.
pub fn heinrich_pyramid(incident: &Table, hazard: &Table, audit: &Table) -> Vec<PyramidLevel> {
    let mut counts: BTreeMap<PyramidTier, usize> = BTreeMap::new();
    for tier in incident_tiers(incident).into_iter().flatten() {
        *counts.entry(tier).or_default() += 1;
    }
    *counts.entry(PyramidTier::UnsafeCondition).or_default() +=
        hazard_unsafe_conditions(hazard) + audit_unsafe_conditions(audit);

    let total: usize = counts.values().sum();
    PyramidTier::ALL
        .iter()
        .map(|&tier| {
            let count = counts.get(&tier).copied().unwrap_or(0);
            PyramidLevel {
                level: tier.level(),
                description: tier.description(),
                color_code: tier.color(),
                count,
                percent: if total > 0 {
                    round_to(count as f64 / total as f64 * 100.0, 1)
                } else {
                    0.0
                },
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayerCounts {
    pub fatalities: usize,
    pub lost_workday_cases: usize,
    pub recordable_injuries: usize,
    pub near_misses: usize,
    pub at_risk_behaviors: usize,
    pub total_incidents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentLayers {
    pub department: String,
    #[serde(flatten)]
    pub layers: LayerCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationLayers {
    pub location: String,
    #[serde(flatten)]
    pub layers: LayerCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PyramidBreakdown {
    pub by_department: Vec<DepartmentLayers>,
    pub by_location: Vec<LocationLayers>,
    pub data_sources: BTreeMap<&'static str, &'static str>,
}

fn data_sources() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        (
            "fatalities",
            "Incident sheet (severity_score >= 4-5 OR actual/worst_consequence contains 'fatal')",
        ),
        (
            "lost_workday_cases",
            "Incident sheet (severity_score >= 3, excluding fatalities)",
        ),
        (
            "recordable_injuries",
            "Incident sheet (severity_score >= 2, excluding LTI and fatalities)",
        ),
        (
            "near_misses",
            "Hazard ID sheet + Incident sheet (incident_type contains 'near miss')",
        ),
        (
            "at_risk_behaviors",
            "Audit Findings sheet + Inspection Findings sheet (location matches)",
        ),
    ])
}

/// Incident columns shared by both breakdowns.
struct SeverityColumns<'a> {
    severity: Option<Column<'a>>,
    actual: Option<Column<'a>>,
    worst: Option<Column<'a>>,
    incident_type: Option<Column<'a>>,
}

impl<'a> SeverityColumns<'a> {
    fn resolve(incident: &'a Table) -> Self {
        Self {
            severity: columns::resolve(incident, columns::SEVERITY_SCORE),
            actual: columns::resolve(incident, columns::ACTUAL_CONSEQUENCE),
            worst: columns::resolve(incident, columns::WORST_CONSEQUENCE),
            incident_type: columns::resolve(incident, &["incident_type", "category"]),
        }
    }

    /// Fatal, lost-workday and recordable counts over one group of rows.
    ///
    /// The fatality threshold adapts to the group: 5 when any row reaches 5, otherwise 4.
    fn injury_layers(&self, incident: &Table, rows: &[usize], layers: &mut LayerCounts) {
        let Some(sev) = self.severity else {
            return;
        };
        let values: Vec<Option<f64>> = rows.iter().map(|&r| sev.number(incident, r)).collect();
        let max = values.iter().flatten().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        });
        let threshold = max.map(|m| if m >= 5.0 { 5.0 } else { 4.0 });

        for (&row, value) in rows.iter().zip(&values) {
            let mentions_fatal = [self.actual, self.worst].iter().any(|col| {
                text_or_empty(incident, *col, row)
                    .to_lowercase()
                    .contains("fatal")
            });
            let fatal = mentions_fatal
                || matches!((value, threshold), (Some(v), Some(t)) if *v >= t);
            let lost_time = !fatal && value.is_some_and(|v| v >= 3.0);
            let recordable = !fatal && !lost_time && value.is_some_and(|v| v >= 2.0);

            layers.fatalities += usize::from(fatal);
            layers.lost_workday_cases += usize::from(lost_time);
            layers.recordable_injuries += usize::from(recordable);
        }
    }

    fn near_miss_incidents(&self, incident: &Table, rows: &[usize]) -> usize {
        let Some(col) = self.incident_type else {
            return 0;
        };
        rows.iter()
            .filter(|&&r| {
                let text = col.text(incident, r).to_lowercase();
                text.contains("near miss") || text.contains("near-miss")
            })
            .count()
    }
}

/// Row indices grouped by the exact text of `col`, in order of first appearance. Missing cells are skipped.
fn group_rows(table: &Table, col: Column<'_>) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for row in 0..table.len() {
        let Some(key) = col.value(table, row).as_text() else {
            continue;
        };
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, rows)) => rows.push(row),
            None => groups.push((key, vec![row])),
        }
    }
    groups
}

fn count_where(table: &Table, candidates: &[&str], predicate: impl Fn(&str) -> bool) -> usize {
    let Some(col) = columns::resolve(table, candidates) else {
        return 0;
    };
    (0..table.len())
        .filter(|&row| col.value(table, row).as_text().is_some_and(|t| predicate(&t)))
        .count()
}

/// Pyramid layers per department and per location. The filter narrows incidents and hazards only.
pub fn pyramid_breakdown(
    incident: &Table,
    hazard: &Table,
    audit: &Table,
    inspection: &Table,
    spec: &FilterSpec,
) -> PyramidBreakdown {
    let incident = filter::apply(incident, spec);
    let hazard = filter::apply(hazard, spec);
    let mut breakdown = PyramidBreakdown {
        data_sources: data_sources(),
        ..PyramidBreakdown::default()
    };
    if incident.is_empty() {
        return breakdown;
    }
    let cols = SeverityColumns::resolve(&incident);

    if let Some(dept_col) = columns::resolve(&incident, columns::DEPARTMENT) {
        for (department, rows) in group_rows(&incident, dept_col) {
            let mut layers = LayerCounts {
                total_incidents: rows.len(),
                ..LayerCounts::default()
            };
            cols.injury_layers(&incident, &rows, &mut layers);
            let needle = department.to_lowercase();
            layers.near_misses = cols.near_miss_incidents(&incident, &rows)
                + count_where(&hazard, columns::DEPARTMENT, |d| d == department);
            layers.at_risk_behaviors = [audit, inspection]
                .iter()
                .map(|t| {
                    count_where(t, columns::FINDING_LOCATION, |loc| {
                        loc.to_lowercase().contains(&needle)
                    })
                })
                .sum();
            breakdown.by_department.push(DepartmentLayers { department, layers });
        }
    }

    if let Some(loc_col) = columns::resolve(&incident, columns::LOCATION) {
        let audit_locations: &[&str] = &["location", "finding_location", "audit_location"];
        for (location, rows) in group_rows(&incident, loc_col) {
            let mut layers = LayerCounts {
                total_incidents: rows.len(),
                ..LayerCounts::default()
            };
            cols.injury_layers(&incident, &rows, &mut layers);
            layers.near_misses = cols.near_miss_incidents(&incident, &rows)
                + count_where(&hazard, columns::LOCATION, |l| l == location);
            layers.at_risk_behaviors = [audit, inspection]
                .iter()
                .map(|t| count_where(t, audit_locations, |l| l == location))
                .sum();
            breakdown.by_location.push(LocationLayers { location, layers });
        }
    }

    breakdown
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HseMetrics {
    pub total_incidents: usize,
    pub near_miss_ratio: String,
    pub fatality_actual: usize,
    pub lost_workday_cases_actual: usize,
    pub recordable_injuries_actual: usize,
    pub near_misses_actual: usize,
    pub unsafe_condition: usize,
}

/// Headline pyramid counts. The ratio is near misses per injury, or `"N/A"` without injuries.
pub fn hse_metrics(incident: &Table, hazard: &Table, audit: &Table) -> HseMetrics {
    let type_col = columns::resolve(incident, columns::INCIDENT_TYPE);
    let actual_col = columns::resolve(incident, columns::ACTUAL_CONSEQUENCE);
    let worst_col = columns::resolve(incident, columns::WORST_CONSEQUENCE);

    let mut injuries = 0usize;
    let mut fatalities = 0usize;
    let mut lost_workday = 0usize;
    let mut recordable = 0usize;
    let mut near_misses = 0usize;
    for row in 0..incident.len() {
        let incident_type = text_or_empty(incident, type_col, row);
        let actual = text_or_empty(incident, actual_col, row);
        let worst = text_or_empty(incident, worst_col, row);
        let view = IncidentView {
            incident_type: &incident_type,
            actual: &actual,
            worst: &worst,
        };
        if view.is_near_miss() {
            near_misses += 1;
        }
        if !view.is_injury() {
            continue;
        }
        injuries += 1;
        match view.actual_level() {
            Some(ConsequenceLevel::C4 | ConsequenceLevel::C5) => {
                fatalities += 1;
                recordable += 1;
            }
            Some(ConsequenceLevel::C3) => {
                lost_workday += 1;
                recordable += 1;
            }
            Some(ConsequenceLevel::C2) => recordable += 1,
            _ => {}
        }
    }

    let near_miss_ratio = if injuries > 0 {
        format!("{:.2}:1", near_misses as f64 / injuries as f64)
    } else {
        "N/A".to_string()
    };

    HseMetrics {
        total_incidents: incident.len(),
        near_miss_ratio,
        fatality_actual: fatalities,
        lost_workday_cases_actual: lost_workday,
        recordable_injuries_actual: recordable,
        near_misses_actual: near_misses,
        unsafe_condition: hazard_unsafe_conditions(hazard) + audit_unsafe_conditions(audit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn incidents() -> Table {
        table(
            &[
                "Incident Type(s)",
                "Actual Consequence (Incident)",
                "Worst Case Consequence (Incident)",
            ],
            vec![
                vec!["Injury".into(), "C4 - Major".into(), "C4 - Major".into()],
                vec!["injury".into(), "C3 - Severe".into(), "C4 - Major".into()],
                vec!["Injury".into(), "C1 - Minor".into(), "C2 - Serious".into()],
                vec!["Fire".into(), "C0 - No Ill Effect".into(), "C5 - Catastrophic".into()],
                vec!["Fire".into(), "C0 - No Ill Effect".into(), "C1 - Minor".into()],
            ],
        )
    }

    #[test]
    fn pyramid_always_has_five_levels() {
        let levels = heinrich_pyramid(&Table::empty(), &Table::empty(), &Table::empty());
        assert_eq!(levels.len(), 5);
        assert!(levels.iter().all(|l| l.count == 0 && l.percent == 0.0));
        assert_eq!(levels[4].color_code, "#20C997");
    }

    #[test]
    fn pyramid_counts_skip_unqualified_rows() {
        let hazard = table(
            &["Worst Case Consequence Potential (Hazard ID)"],
            vec![vec!["C1 - Minor".into()], vec!["C3 - Severe".into()]],
        );
        let audit = table(
            &["Worst Case Consequence"],
            vec![vec!["C2 - Serious; C3 - Severe".into()]],
        );
        let levels = heinrich_pyramid(&incidents(), &hazard, &audit);
        let counts: Vec<usize> = levels.iter().map(|l| l.count).collect();
        assert_eq!(counts, vec![1, 1, 1, 1, 2]);
        assert_eq!(levels[4].percent, 33.3);
        let total: usize = counts.iter().sum();
        assert!(total < incidents().len() + hazard.len() + audit.len());
    }

    #[test]
    fn metrics_count_recordables_from_c2() {
        let metrics = hse_metrics(&incidents(), &Table::empty(), &Table::empty());
        assert_eq!(metrics.total_incidents, 5);
        assert_eq!(metrics.fatality_actual, 1);
        assert_eq!(metrics.lost_workday_cases_actual, 1);
        assert_eq!(metrics.recordable_injuries_actual, 2);
        assert_eq!(metrics.near_misses_actual, 1);
        assert_eq!(metrics.near_miss_ratio, "0.33:1");
    }

    #[test]
    fn metrics_without_injuries_report_na() {
        let metrics = hse_metrics(&Table::empty(), &Table::empty(), &Table::empty());
        assert_eq!(metrics.near_miss_ratio, "N/A");
        assert_eq!(metrics.total_incidents, 0);
    }

    #[test]
    fn fatality_threshold_adapts_per_group() {
        let incident = table(
            &["department", "severity_score", "incident_type"],
            vec![
                vec!["A".into(), 4.0.into(), "Injury".into()],
                vec!["A".into(), 3.0.into(), "Near Miss".into()],
                vec!["B".into(), 5.0.into(), "Injury".into()],
                vec!["B".into(), 4.0.into(), "Injury".into()],
                vec!["B".into(), 2.0.into(), "Injury".into()],
            ],
        );
        let hazard = table(&["department"], vec![vec!["A".into()], vec!["B".into()]]);
        let audit = table(&["finding_location"], vec![vec!["Dept A yard".into()]]);
        let out = pyramid_breakdown(
            &incident,
            &hazard,
            &audit,
            &Table::empty(),
            &FilterSpec::default(),
        );

        let a = &out.by_department[0];
        assert_eq!(a.department, "A");
        assert_eq!(a.layers.fatalities, 1);
        assert_eq!(a.layers.lost_workday_cases, 1);
        assert_eq!(a.layers.near_misses, 2);
        assert_eq!(a.layers.at_risk_behaviors, 1);

        let b = &out.by_department[1];
        assert_eq!(b.layers.fatalities, 1);
        assert_eq!(b.layers.lost_workday_cases, 1);
        assert_eq!(b.layers.recordable_injuries, 1);
        assert_eq!(b.layers.total_incidents, 3);
        assert!(out.by_location.is_empty());
    }

    #[test]
    fn fatal_text_counts_without_high_score() {
        let incident = table(
            &["location", "severity_score", "actual_consequence_incident"],
            vec![vec!["Yard".into(), 1.0.into(), "Fatal injury".into()]],
        );
        let out = pyramid_breakdown(
            &incident,
            &Table::empty(),
            &Table::empty(),
            &Table::empty(),
            &FilterSpec::default(),
        );
        assert_eq!(out.by_location[0].layers.fatalities, 1);
    }
}
