//! Column discovery over tables whose headers differ from sheet to sheet.
//!
//! Each logical role has an ordered candidate list, most preferred first. [`resolve`] runs an exact
//! pass over every candidate before it tries any substring match, so an exact hit on a later
//! candidate still beats a loose hit on an earlier one.

use tracing::debug;

use crate::table::{Table, Value};

/// A logical field bound to a concrete column of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column<'a> {
    pub name: &'a str,
    pub index: usize,
}

impl Column<'_> {
    pub fn value<'t>(&self, table: &'t Table, row: usize) -> &'t Value {
        table.cell(row, self.index)
    }

    /// Cell text, empty for missing cells.
    pub fn text(&self, table: &Table, row: usize) -> String {
        self.value(table, row).display_text()
    }

    pub fn number(&self, table: &Table, row: usize) -> Option<f64> {
        self.value(table, row).as_number()
    }
}

/// Text of `column` at `row`, or an empty string when the column is absent.
pub fn text_or_empty(table: &Table, column: Option<Column<'_>>, row: usize) -> String {
    column.map(|c| c.text(table, row)).unwrap_or_default()
}

/// Finds the column matching `candidates`, or `None`. Tables without rows never resolve.
pub fn resolve<'a>(table: &'a Table, candidates: &[&str]) -> Option<Column<'a>> {
    if table.is_empty() {
        return None;
    }
    let normalized: Vec<String> = table
        .columns()
        .iter()
        .map(|c| c.trim().to_lowercase())
        .collect();

    let bind = |index: usize| Column {
        name: table.columns()[index].as_str(),
        index,
    };

    for candidate in candidates {
        let key = candidate.trim().to_lowercase();
        if let Some(index) = normalized.iter().position(|c| *c == key) {
            return Some(bind(index));
        }
    }

    for candidate in candidates {
        let key = candidate.trim().to_lowercase();
        if let Some(index) = normalized.iter().position(|c| c.contains(&key)) {
            return Some(bind(index));
        }
    }

    debug!(?candidates, "no column matched");
    None
}

/// Resolves `candidates`, falling back to the table's first column.
pub fn resolve_or_first<'a>(table: &'a Table, candidates: &[&str]) -> Option<Column<'a>> {
    resolve(table, candidates).or_else(|| {
        table.first_column().filter(|_| !table.is_empty()).map(|index| Column {
            name: table.columns()[index].as_str(),
            index,
        })
    })
}

/// Tries each candidate list in turn.
pub fn resolve_any<'a>(table: &'a Table, groups: &[&[&str]]) -> Option<Column<'a>> {
    groups.iter().find_map(|group| resolve(table, group))
}

pub const FILTER_DATE: &[&str] = &["occurrence_date", "date", "start_date", "reported_date"];
pub const FILTER_DEPARTMENT: &[&str] = &["department", "section", "sub_department"];
pub const FILTER_LOCATION: &[&str] = &["location", "audit_location", "finding_location"];
pub const FILTER_SUBLOCATION: &[&str] = &["sublocation", "sub_location", "location.1"];
pub const FILTER_STATUS: &[&str] = &["status", "incident_status", "audit_status", "hazard_status"];
pub const FILTER_INCIDENT_TYPE: &[&str] =
    &["incident_type", "incident type(s)", "category", "accident type"];
pub const FILTER_SEVERITY: &[&str] = &["severity_score", "severity"];
pub const FILTER_RISK: &[&str] = &["risk_score", "risk"];
pub const FILTER_VIOLATION_TYPE: &[&str] = &[
    "violation_type_hazard_id",
    "violation type (hazard)",
    "violation_type",
];

pub const OCCURRENCE_DATE: &[&str] = &[
    "occurrence_date",
    "date of occurrence",
    "date reported",
    "date entered",
];
pub const EVENT_DATE: &[&str] = &["occurrence_date", "date", "reported_date"];
pub const AUDIT_START: &[&str] = &["start_date", "start date"];
pub const AUDIT_SCHEDULED: &[&str] = &["start date", "start_date", "scheduled date", "scheduled_date"];
pub const AUDIT_CLOSED: &[&str] = &[
    "entered closed",
    "entered_closed",
    "completion date",
    "completion_date",
    "end date",
    "end_date",
];
pub const AUDIT_ID: &[&str] = &["audit number", "audit_number", "audit id", "audit_id"];

pub const DEPARTMENT: &[&str] = &["department", "sub_department"];
pub const LOCATION: &[&str] = &["location", "sublocation", "location.1"];
pub const FINDING_LOCATION: &[&str] = &["finding_location", "location", "audit_location"];
pub const STATUS: &[&str] = &["status"];
pub const AUDIT_STATUS: &[&str] = &["audit_status", "audit status", "status"];

pub const SEVERITY_SCORE: &[&str] = &["severity_score", "severity"];
pub const SEVERITY_OR_RISK: &[&str] = &["severity_score", "risk_score"];
pub const RISK_OR_SEVERITY: &[&str] = &["risk_score", "severity_score"];
pub const RISK_SCORE: &[&str] = &["risk_score", "risk_level"];
pub const SEVERITY_TEXT: &[&str] = &["actual_consequence_incident", "severity"];
pub const PROCESS_SAFETY: &[&str] = &["psm", "pse_category"];

pub const ACTUAL_CONSEQUENCE: &[&str] = &[
    "actual_consequence_incident",
    "actual consequence (incident)",
    "actual consequence",
];
pub const WORST_CONSEQUENCE: &[&str] = &[
    "worst_case_consequence_incident",
    "worst case consequence (incident)",
    "worst case consequence",
];
pub const HAZARD_WORST_CONSEQUENCE: &[&str] = &[
    "worst case consequence potential (hazard id)",
    "worst_case_consequence_potential_hazard_id",
    "worst case consequence",
];
pub const AUDIT_WORST_CONSEQUENCE: &[&str] = &["worst case consequence", "worst_case_consequence"];

pub const INCIDENT_NUMBER: &[&str] = &["incident number", "incident_number"];
pub const AUDIT_NUMBER: &[&str] = &["audit number", "audit_number"];
pub const INCIDENT_TYPE: &[&str] = &["incident type(s)", "incident_type", "incident type", "category"];

pub const ROOT_CAUSE: &[&str] = &[
    "root cause",
    "root_cause",
    "key factor",
    "key_factor",
    "contributing factor",
    "contributing_factor",
];
pub const ROOT_CAUSE_MISSING: &[&str] = &["root_cause_is_missing"];
pub const CORRECTIVE_ACTIONS_MISSING: &[&str] = &["corrective_actions_is_missing"];
pub const REPORTING_DELAY: &[&str] = &["reporting_delay_days"];
pub const RESOLUTION_TIME: &[&str] = &["resolution_time_days"];

pub const AUDIT_RATING: &[&str] = &["audit_rating", "audit rating"];
pub const FINDINGS: &[&str] = &[
    "finding",
    "findings",
    "observation",
    "observations",
    "non_conformance",
    "non conformance",
    "issue",
    "issues",
    "remark",
    "remarks",
    "description",
    "checklist_category",
    "checklist category",
];
pub const HAZARD_TYPE: &[&str] = &[
    "incident_type(s)",
    "incident type(s)",
    "incident_types",
    "incident type",
    "incident_type",
];
pub const ROOT_CAUSE_TYPE: &[&str] = &["incident_type(s)", "incident_type", "incident type(s)", "category"];
pub const INJURY_CLASSIFICATION: &[&str] = &[
    "injury_classification",
    "injury classification",
    "actual_consequence_incident",
    "actual consequence (incident)",
    "relevant_consequence_incident",
    "relevant consequence (incident)",
];
pub const COST: &[&str] = &["total cost", "estimated_cost_impact"];
pub const REPEATED: &[&str] = &[
    "repeated_incident",
    "repeated incident",
    "repeated_event",
    "repeated event",
];
pub const REPEATED_LOCATION: &[&str] = &[
    "specific_location_of_occurrence",
    "specific location of occurrence",
    "sub_location",
    "sub-location",
    "sublocation",
    "location",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str]) -> Table {
        let row = columns.iter().map(|_| Value::text("x")).collect();
        Table::new(columns.iter().map(|c| c.to_string()).collect(), vec![row])
    }

    #[test]
    fn exact_match_beats_earlier_substring_candidate() {
        let t = table(&["Dept", "Department Code"]);
        let col = resolve(&t, &["department", "dept"]).unwrap();
        assert_eq!(col.name, "Dept");
        assert_eq!(col.index, 0);
    }

    #[test]
    fn falls_back_to_substring_match() {
        let t = table(&["Incident Number", "Sub-Department Name"]);
        assert_eq!(resolve(&t, &["department"]).unwrap().name, "Sub-Department Name");
    }

    #[test]
    fn exact_match_ignores_case_and_padding() {
        let t = table(&["  Occurrence_Date ", "status"]);
        assert_eq!(resolve(&t, &["occurrence_date"]).unwrap().index, 0);
    }

    #[test]
    fn empty_table_never_resolves() {
        let t = Table::new(vec!["department".into()], vec![]);
        assert!(resolve(&t, &["department"]).is_none());
        assert!(resolve_or_first(&t, &["department"]).is_none());
        assert!(resolve(&Table::empty(), &["department"]).is_none());
    }

    #[test]
    fn first_column_fallback_is_caller_policy() {
        let t = table(&["title", "notes"]);
        assert!(resolve(&t, &["department"]).is_none());
        assert_eq!(resolve_or_first(&t, &["department"]).unwrap().name, "title");
    }
}
