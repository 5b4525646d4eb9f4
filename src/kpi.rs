use chrono::NaiveDate;
use serde::Serialize;

use crate::columns::{self, text_or_empty};
use crate::filter::{self, FilterSpec};
use crate::models::Rating;
use crate::severity::{classify_severity, severity_score_of, ConsequenceLevel, SeverityClass};
use crate::table::{round_to, Table, Value};

pub const DEFAULT_HOURS_WORKED: f64 = 2_000_000.0;
const RATE_BASE: f64 = 200_000.0;

/// Incidents per 200,000 hours. Non-positive hours give 0.
pub fn incident_rate(count: usize, hours_worked: f64) -> f64 {
    if hours_worked > 0.0 {
        count as f64 * RATE_BASE / hours_worked
    } else {
        0.0
    }
}

pub fn trir_benchmark(rate: f64) -> Rating {
    if rate < 1.0 {
        Rating::new("Excellent", "#4caf50")
    } else if rate < 3.0 {
        Rating::new("Good", "#8bc34a")
    } else if rate <= 5.0 {
        Rating::new("Average", "#ffc107")
    } else {
        Rating::new("Needs Improvement", "#f44336")
    }
}

pub fn near_miss_benchmark(ratio: f64) -> Rating {
    if ratio >= 10.0 {
        Rating::new("Excellent reporting culture", "#4caf50")
    } else if ratio >= 5.0 {
        Rating::new("Good", "#8bc34a")
    } else if ratio >= 2.0 {
        Rating::new("Fair", "#ffc107")
    } else {
        Rating::new("Under-reporting likely", "#f44336")
    }
}

pub fn safety_rating(score: f64) -> Rating {
    if score >= 90.0 {
        Rating::new("Excellent", "#4caf50")
    } else if score >= 75.0 {
        Rating::new("Good", "#8bc34a")
    } else if score >= 60.0 {
        Rating::new("Fair", "#ffc107")
    } else if score >= 40.0 {
        Rating::new("Poor", "#ff9800")
    } else {
        Rating::new("Critical", "#f44336")
    }
}

pub fn leading_lagging_assessment(ratio: f64) -> Rating {
    if ratio >= 10.0 {
        Rating::new("Excellent - Proactive safety culture", "#4caf50")
    } else if ratio >= 5.0 {
        Rating::new("Good - Balanced approach", "#8bc34a")
    } else if ratio >= 2.0 {
        Rating::new("Fair - Room for improvement", "#ffc107")
    } else {
        Rating::new("Poor - Too reactive", "#f44336")
    }
}

fn count_at_least(table: &Table, candidates: &[&str], threshold: f64) -> Option<usize> {
    let col = columns::resolve(table, candidates)?;
    Some(
        (0..table.len())
            .filter(|&row| col.number(table, row).is_some_and(|n| n >= threshold))
            .count(),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrirKpi {
    pub value: f64,
    pub recordable_incidents: usize,
    pub total_hours_worked: f64,
    pub benchmark: &'static str,
    pub color: &'static str,
    pub industry_standard: &'static str,
}

/// Total recordable incident rate. Without a severity column every row counts as recordable.
pub fn trir(incident: &Table, spec: &FilterSpec, hours_worked: f64) -> TrirKpi {
    let incident = filter::apply(incident, spec);
    let recordable = count_at_least(&incident, columns::SEVERITY_OR_RISK, 2.0)
        .unwrap_or_else(|| incident.len());
    let rate = incident_rate(recordable, hours_worked);
    let rating = trir_benchmark(rate);
    TrirKpi {
        value: round_to(rate, 2),
        recordable_incidents: recordable,
        total_hours_worked: hours_worked,
        benchmark: rating.label,
        color: rating.color,
        industry_standard: "< 1.0 Excellent, < 3.0 Good, <= 5.0 Average",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LtirKpi {
    pub value: f64,
    pub lost_time_incidents: usize,
    pub total_hours_worked: f64,
}

/// Lost time incident rate; no severity column means no lost-time cases.
pub fn ltir(incident: &Table, spec: &FilterSpec, hours_worked: f64) -> LtirKpi {
    let incident = filter::apply(incident, spec);
    let lost_time = count_at_least(&incident, columns::SEVERITY_OR_RISK, 3.0).unwrap_or(0);
    LtirKpi {
        value: round_to(incident_rate(lost_time, hours_worked), 2),
        lost_time_incidents: lost_time,
        total_hours_worked: hours_worked,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PstirKpi {
    pub value: f64,
    pub psm_incidents: usize,
    pub total_hours_worked: f64,
}

/// Process safety rate over rows carrying any PSM/PSE tag.
pub fn pstir(incident: &Table, spec: &FilterSpec, hours_worked: f64) -> PstirKpi {
    let incident = filter::apply(incident, spec);
    let tagged = columns::resolve(&incident, columns::PROCESS_SAFETY).map_or(0, |col| {
        (0..incident.len())
            .filter(|&row| !col.value(&incident, row).is_missing())
            .count()
    });
    PstirKpi {
        value: round_to(incident_rate(tagged, hours_worked), 2),
        psm_incidents: tagged,
        total_hours_worked: hours_worked,
    }
}

/// `(near-miss typed incidents + hazards) / incidents`, 0 without incidents.
pub fn near_miss_ratio(incident: &Table, hazard: &Table) -> f64 {
    if incident.is_empty() {
        return 0.0;
    }
    let typed = columns::resolve(incident, &["incident_type", "incident type(s)"]).map_or(0, |col| {
        (0..incident.len())
            .filter(|&row| {
                let text = col.text(incident, row).to_lowercase();
                ["near miss", "near-miss", "nearmiss"]
                    .iter()
                    .any(|k| text.contains(k))
            })
            .count()
    });
    round_to((typed + hazard.len()) as f64 / incident.len() as f64, 2)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearMissKpi {
    pub ratio: f64,
    pub near_misses: usize,
    pub incidents: usize,
    pub benchmark: &'static str,
    pub color: &'static str,
    pub industry_standard: &'static str,
}

pub fn near_miss_kpi(incident: &Table, hazard: &Table, spec: &FilterSpec) -> NearMissKpi {
    let incident = filter::apply(incident, spec);
    let hazard = filter::apply(hazard, spec);
    let ratio = near_miss_ratio(&incident, &hazard);
    let rating = near_miss_benchmark(ratio);
    NearMissKpi {
        ratio,
        near_misses: hazard.len(),
        incidents: incident.len(),
        benchmark: rating.label,
        color: rating.color,
        industry_standard: "10:1 indicates healthy reporting culture",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyFactor {
    pub factor: String,
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyIndex {
    pub score: f64,
    pub rating: &'static str,
    pub color: &'static str,
    pub base_score: f64,
    pub total_deductions: f64,
    pub total_bonuses: f64,
    pub breakdown: Vec<SafetyFactor>,
}

fn is_high_risk(value: &Value) -> bool {
    match value {
        Value::Number(n) => *n >= 3.0,
        Value::Text(s) => {
            let s = s.to_lowercase();
            ["high", "critical", "severe"].iter().any(|k| s.contains(k))
        }
        _ => false,
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|k| text.contains(k))
}

/// 0-100 site health score. `as_of` is the day used for days-since-last-incident.
pub fn site_safety_index(
    incident: &Table,
    hazard: &Table,
    audit: &Table,
    spec: &FilterSpec,
    as_of: NaiveDate,
) -> SafetyIndex {
    let incident = filter::apply(incident, spec);
    let hazard = filter::apply(hazard, spec);
    let base = 100.0;
    let mut deductions = 0.0;
    let mut bonuses = 0.0;
    let mut breakdown = Vec::new();

    if !incident.is_empty() {
        let score_col = columns::resolve(&incident, columns::SEVERITY_OR_RISK);
        let text_col = columns::resolve(&incident, columns::SEVERITY_TEXT);
        let (mut serious, mut minor) = (0usize, 0usize);
        for row in 0..incident.len() {
            let score = score_col.map_or(&Value::Missing, |c| c.value(&incident, row));
            let text = text_col.map_or(&Value::Missing, |c| c.value(&incident, row));
            match classify_severity(score, text) {
                SeverityClass::SeriousOrFatal => serious += 1,
                SeverityClass::MinorInjury => minor += 1,
                SeverityClass::FirstAidOrNearMiss => {}
            }
        }
        let serious_hit = serious as f64 * 10.0;
        let minor_hit = minor as f64 * 3.0;
        deductions += serious_hit + minor_hit;
        if serious > 0 {
            breakdown.push(SafetyFactor {
                factor: format!("Serious Injuries ({serious})"),
                impact: -serious_hit,
            });
        }
        if minor > 0 {
            breakdown.push(SafetyFactor {
                factor: format!("Minor Injuries ({minor})"),
                impact: -minor_hit,
            });
        }
    }

    if let Some(col) = columns::resolve(&hazard, columns::RISK_SCORE) {
        let high = (0..hazard.len())
            .filter(|&row| is_high_risk(col.value(&hazard, row)))
            .count();
        let hit = high as f64 * 2.0;
        deductions += hit;
        if high > 0 {
            breakdown.push(SafetyFactor {
                factor: format!("High-Risk Hazards ({high})"),
                impact: -hit,
            });
        }
    }

    if let Some(col) = columns::resolve(&incident, columns::STATUS) {
        let open = (0..incident.len())
            .filter(|&row| {
                contains_any(&col.text(&incident, row), &["open", "pending", "progress", "review"])
            })
            .count();
        deductions += open as f64;
        if open > 0 {
            breakdown.push(SafetyFactor {
                factor: format!("Open Corrective Actions ({open})"),
                impact: -(open as f64),
            });
        }
    }

    if let Some(col) = columns::resolve(&incident, &["occurrence_date", "date"]) {
        let last = (0..incident.len())
            .filter_map(|row| col.value(&incident, row).as_date())
            .max();
        if let Some(last) = last {
            let days = (as_of - last).num_days().max(0);
            let bonus = (days as f64 * 0.1).min(10.0);
            bonuses += bonus;
            breakdown.push(SafetyFactor {
                factor: format!("Days Since Last Incident ({days})"),
                impact: round_to(bonus, 2),
            });
        }
    }

    if let Some(col) = columns::resolve(audit, &["audit_status", "status"]) {
        let completed = (0..audit.len())
            .filter(|&row| contains_any(&col.text(audit, row), &["closed", "complete"]))
            .count();
        let bonus = (completed as f64 * 0.5).min(5.0);
        bonuses += bonus;
        if completed > 0 {
            breakdown.push(SafetyFactor {
                factor: format!("Completed Audits ({completed})"),
                impact: round_to(bonus, 2),
            });
        }
    }

    let score = (base - deductions + bonuses).clamp(0.0, 100.0);
    let rating = safety_rating(score);
    SafetyIndex {
        score: round_to(score, 2),
        rating: rating.label,
        color: rating.color,
        base_score: base,
        total_deductions: round_to(deductions, 2),
        total_bonuses: round_to(bonuses, 2),
        breakdown,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeadingIndicators {
    #[serde(rename = "Hazards")]
    pub hazards: usize,
    #[serde(rename = "Audits")]
    pub audits: usize,
    #[serde(rename = "Inspections")]
    pub inspections: usize,
    #[serde(rename = "Near-miss")]
    pub near_misses: usize,
}

impl LeadingIndicators {
    pub fn total(&self) -> usize {
        self.hazards + self.audits + self.inspections + self.near_misses
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LaggingIndicators {
    #[serde(rename = "Injuries")]
    pub injuries: usize,
    #[serde(rename = "Incidents")]
    pub incidents: usize,
    #[serde(rename = "Fatalities")]
    pub fatalities: usize,
    #[serde(rename = "Serious Injuries")]
    pub serious_injuries: usize,
}

impl LaggingIndicators {
    pub fn total(&self) -> usize {
        self.injuries + self.incidents + self.fatalities + self.serious_injuries
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadingLagging {
    pub leading_indicators: LeadingIndicators,
    pub lagging_indicators: LaggingIndicators,
    pub total_leading: usize,
    pub total_lagging: usize,
    pub ratio: f64,
    pub ratio_text: String,
    pub assessment: &'static str,
    pub color: &'static str,
    pub recommendation: &'static str,
}

/// Rows with an id in `candidates`; every row when no id column exists.
fn count_with_id(table: &Table, candidates: &[&str]) -> usize {
    match columns::resolve(table, candidates) {
        Some(col) => (0..table.len())
            .filter(|&row| !col.value(table, row).is_missing())
            .count(),
        None => table.len(),
    }
}

/// Formats a ratio the way a float prints in a dashboard label: `3.0`, `2.35`.
fn ratio_label(ratio: f64) -> String {
    if ratio.fract() == 0.0 {
        format!("{ratio:.1}:1")
    } else {
        format!("{ratio}:1")
    }
}

/// Proactive versus reactive indicator counts over the full tables.
pub fn leading_vs_lagging(
    incident: &Table,
    hazard: &Table,
    audit: &Table,
    inspection: &Table,
) -> LeadingLagging {
    let mut leading = LeadingIndicators {
        hazards: count_with_id(hazard, columns::INCIDENT_NUMBER),
        audits: count_with_id(audit, columns::AUDIT_NUMBER),
        inspections: count_with_id(inspection, columns::AUDIT_NUMBER),
        near_misses: 0,
    };
    let mut lagging = LaggingIndicators {
        incidents: count_with_id(incident, columns::INCIDENT_NUMBER),
        ..LaggingIndicators::default()
    };

    let actual_col = columns::resolve(incident, columns::ACTUAL_CONSEQUENCE);
    let worst_col = columns::resolve(incident, columns::WORST_CONSEQUENCE);
    if let (Some(actual), Some(worst)) = (actual_col, worst_col) {
        leading.near_misses = (0..incident.len())
            .filter(|&row| {
                severity_score_of(actual.value(incident, row)) == 1
                    && severity_score_of(worst.value(incident, row)) >= 4
            })
            .count();
    }

    if let Some(type_col) = columns::resolve(incident, columns::INCIDENT_TYPE) {
        for row in 0..incident.len() {
            if type_col.text(incident, row).trim().to_lowercase() != "injury" {
                continue;
            }
            lagging.injuries += 1;
            let actual = text_or_empty(incident, actual_col, row);
            match ConsequenceLevel::from_label(&actual) {
                Some(ConsequenceLevel::C4 | ConsequenceLevel::C5) => lagging.fatalities += 1,
                Some(ConsequenceLevel::C3) => lagging.serious_injuries += 1,
                _ => {}
            }
        }
    }

    let total_leading = leading.total();
    let total_lagging = lagging.total();
    let (ratio, ratio_text) = if total_lagging > 0 {
        let ratio = round_to(total_leading as f64 / total_lagging as f64, 2);
        (ratio, ratio_label(ratio))
    } else {
        (0.0, "N/A".to_string())
    };
    let assessment = leading_lagging_assessment(ratio);

    LeadingLagging {
        leading_indicators: leading,
        lagging_indicators: lagging,
        total_leading,
        total_lagging,
        ratio,
        ratio_text,
        assessment: assessment.label,
        color: assessment.color,
        recommendation: "Industry best practice: Leading indicators should be 5-10x lagging indicators",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub trir: TrirKpi,
    pub ltir: LtirKpi,
    pub pstir: PstirKpi,
    pub near_miss_ratio: NearMissKpi,
    pub safety_index: SafetyIndex,
}

pub fn kpi_summary(
    incident: &Table,
    hazard: &Table,
    audit: &Table,
    spec: &FilterSpec,
    hours_worked: f64,
    as_of: NaiveDate,
) -> KpiSummary {
    KpiSummary {
        trir: trir(incident, spec, hours_worked),
        ltir: ltir(incident, spec, hours_worked),
        pstir: pstir(incident, spec, hours_worked),
        near_miss_ratio: near_miss_kpi(incident, hazard, spec),
        safety_index: site_safety_index(incident, hazard, audit, spec, as_of),
    }
}
