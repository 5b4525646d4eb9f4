use serde::Serialize;

/// One named data series of a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub data: Vec<f64>,
}

impl Series {
    pub fn new(name: impl Into<String>, data: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn counts(name: impl Into<String>, counts: &[usize]) -> Self {
        Self::new(name, counts.iter().map(|&c| c as f64).collect())
    }
}

/// The chart payload returned by most trend and distribution builders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub series: Vec<Series>,
}

impl ChartData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(labels: Vec<String>, name: impl Into<String>, data: Vec<f64>) -> Self {
        Self {
            labels,
            series: vec![Series::new(name, data)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A benchmark verdict with its dashboard colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rating {
    pub label: &'static str,
    pub color: &'static str,
}

impl Rating {
    pub const fn new(label: &'static str, color: &'static str) -> Self {
        Self { label, color }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentRisk {
    pub department: String,
    pub injury_count: usize,
    pub sum_actual_severity: f64,
    pub sum_worst_severity: f64,
    pub likelihood: u8,
    pub risk_score: f64,
    pub normalized_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskMeta {
    pub records_used: usize,
    pub sheet: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentRiskReport {
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    pub table: Vec<DepartmentRisk>,
    pub meta: RiskMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualRisk {
    pub department: String,
    pub likelihood: u8,
    pub actual_risk_score: f64,
    pub normalized_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PotentialRisk {
    pub department: String,
    pub potential_likelihood: u8,
    pub potential_risk_score: f64,
    pub normalized_potential_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceIndex {
    pub department: String,
    pub severity_score: f64,
    pub risk_score: f64,
    pub reporting_delay_days: f64,
    pub resolution_time_days: f64,
    pub root_cause_is_missing: f64,
    pub corrective_actions_is_missing: f64,
    pub hse_index: f64,
}
