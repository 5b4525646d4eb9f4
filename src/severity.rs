use std::fmt;

use serde::Serialize;

use crate::table::Value;

/// Canonical consequence codes, C0 (no ill effect) through C5 (catastrophic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ConsequenceLevel {
    C0,
    C1,
    C2,
    C3,
    C4,
    C5,
}

impl ConsequenceLevel {
    pub const ALL: [ConsequenceLevel; 6] = [
        ConsequenceLevel::C0,
        ConsequenceLevel::C1,
        ConsequenceLevel::C2,
        ConsequenceLevel::C3,
        ConsequenceLevel::C4,
        ConsequenceLevel::C5,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ConsequenceLevel::C0 => "C0 - No Ill Effect",
            ConsequenceLevel::C1 => "C1 - Minor",
            ConsequenceLevel::C2 => "C2 - Serious",
            ConsequenceLevel::C3 => "C3 - Severe",
            ConsequenceLevel::C4 => "C4 - Major",
            ConsequenceLevel::C5 => "C5 - Catastrophic",
        }
    }

    /// Matches only the six canonical labels; anything else is `None`.
    pub fn from_label(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Self::ALL.into_iter().find(|level| level.label() == trimmed)
    }

    /// Risk-matrix score. C4 and C5 share the top score.
    pub fn score(self) -> u8 {
        match self {
            ConsequenceLevel::C0 => 1,
            ConsequenceLevel::C1 => 2,
            ConsequenceLevel::C2 => 3,
            ConsequenceLevel::C3 => 4,
            ConsequenceLevel::C4 | ConsequenceLevel::C5 => 5,
        }
    }
}

/// Score of a consequence label, 0 for anything outside the canonical six.
pub fn severity_score(label: &str) -> u8 {
    ConsequenceLevel::from_label(label).map_or(0, ConsequenceLevel::score)
}

pub fn severity_score_of(value: &Value) -> u8 {
    value.as_text().map_or(0, |text| severity_score(&text))
}

/// Coarse injury bucket used by the site safety index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SeverityClass {
    SeriousOrFatal,
    MinorInjury,
    FirstAidOrNearMiss,
}

impl SeverityClass {
    pub fn label(self) -> &'static str {
        match self {
            SeverityClass::SeriousOrFatal => "Serious Injury/Fatality",
            SeverityClass::MinorInjury => "Minor Injury",
            SeverityClass::FirstAidOrNearMiss => "First Aid/Near Miss",
        }
    }
}

impl fmt::Display for SeverityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const SERIOUS_WORDS: &[&str] = &["critical", "fatal", "severe", "c4", "c3"];
const MINOR_WORDS: &[&str] = &["serious", "high", "c2", "moderate"];
const FIRST_AID_WORDS: &[&str] = &["minor", "low", "c1", "first aid", "near miss"];

/// Text keywords win over the numeric score; unusable input lands in the least severe bucket.
pub fn classify_severity(score: &Value, text: &Value) -> SeverityClass {
    if let Some(text) = text.as_text() {
        let text = text.trim().to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| text.contains(w));
        if has(SERIOUS_WORDS) {
            return SeverityClass::SeriousOrFatal;
        }
        if has(MINOR_WORDS) {
            return SeverityClass::MinorInjury;
        }
        if has(FIRST_AID_WORDS) {
            return SeverityClass::FirstAidOrNearMiss;
        }
    }
    match score.as_number() {
        Some(n) if n >= 3.0 => SeverityClass::SeriousOrFatal,
        Some(n) if n >= 2.0 => SeverityClass::MinorInjury,
        _ => SeverityClass::FirstAidOrNearMiss,
    }
}

/// Heinrich safety pyramid tiers, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PyramidTier {
    Fatality = 1,
    SeriousInjury = 2,
    MinorInjury = 3,
    NearMiss = 4,
    UnsafeCondition = 5,
}

impl PyramidTier {
    pub const ALL: [PyramidTier; 5] = [
        PyramidTier::Fatality,
        PyramidTier::SeriousInjury,
        PyramidTier::MinorInjury,
        PyramidTier::NearMiss,
        PyramidTier::UnsafeCondition,
    ];

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            PyramidTier::Fatality => "Fatalities (C4 and C5 Injuries)",
            PyramidTier::SeriousInjury => "Serious Injuries (C3)",
            PyramidTier::MinorInjury => "Minor Injuries (C1 and C2)",
            PyramidTier::NearMiss => "Near Misses (C0 actual, C3 to C5 worst)",
            PyramidTier::UnsafeCondition => "Unsafe Conditions (Hazards + Audit Findings)",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            PyramidTier::Fatality => "#DC3545",
            PyramidTier::SeriousInjury => "#FD7E14",
            PyramidTier::MinorInjury => "#FFC107",
            PyramidTier::NearMiss => "#28A745",
            PyramidTier::UnsafeCondition => "#20C997",
        }
    }
}

/// The fields of an incident row the pyramid looks at.
#[derive(Debug, Clone, Copy)]
pub struct IncidentView<'a> {
    pub incident_type: &'a str,
    pub actual: &'a str,
    pub worst: &'a str,
}

impl IncidentView<'_> {
    pub fn is_injury(&self) -> bool {
        self.incident_type.trim().to_lowercase() == "injury"
    }

    pub fn actual_level(&self) -> Option<ConsequenceLevel> {
        ConsequenceLevel::from_label(self.actual)
    }

    /// C0 outcome with a C3 or worse potential.
    pub fn is_near_miss(&self) -> bool {
        self.actual.trim().starts_with("C0")
            && ["C3", "C4", "C5"].iter().any(|code| self.worst.contains(code))
    }
}

/// First matching rule wins; incidents never reach the unsafe-condition tier.
pub fn classify_heinrich(row: &IncidentView<'_>) -> Option<PyramidTier> {
    if row.is_injury() {
        match row.actual_level() {
            Some(ConsequenceLevel::C4 | ConsequenceLevel::C5) => return Some(PyramidTier::Fatality),
            Some(ConsequenceLevel::C3) => return Some(PyramidTier::SeriousInjury),
            Some(ConsequenceLevel::C1 | ConsequenceLevel::C2) => {
                return Some(PyramidTier::MinorInjury)
            }
            _ => {}
        }
    }
    row.is_near_miss().then_some(PyramidTier::NearMiss)
}

const UNSAFE_LABELS: [&str; 2] = ["C1 - Minor", "C2 - Serious"];

/// Hazard worst-case potential must be exactly C1 or C2.
pub fn is_hazard_unsafe_condition(worst: &str) -> bool {
    UNSAFE_LABELS.contains(&worst.trim())
}

/// Audit consequence fields can be semicolon-joined, so any mention counts.
pub fn is_audit_unsafe_condition(worst: &str) -> bool {
    UNSAFE_LABELS.iter().any(|label| worst.contains(label))
}
