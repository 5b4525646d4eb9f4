//! Markdown insight text.
//!
//! The deterministic builders here always produce something readable. An [`InsightSource`] may
//! replace that text with generated prose, but only through [`insights_with_fallback`], which falls
//! back to the deterministic text whenever the source errors, stalls, or returns nothing useful.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::aggregate;
use crate::error::{HseError, Result};
use crate::models::PerformanceIndex;
use crate::table::{MonthPeriod, Table, Value};

const TIME_CANDIDATES: &[&str] = &[
    "date",
    "occurrence_date",
    "entered_date",
    "reported_date",
    "created_date",
    "start_date",
    "scheduled_date",
];
const CATEGORY_CANDIDATES: &[&str] = &["department", "dept", "category", "location", "site", "area"];
const METRIC_CANDIDATES: [(&str, &[&str]); 4] = [
    ("severity", &["severity_score", "severity", "severity_level"]),
    ("risk", &["risk_score", "risk", "risk_level"]),
    ("cost", &["cost", "estimated_cost", "cost_usd", "cost_inr"]),
    ("manhours", &["manhours", "man_hours", "man_hrs", "hours"]),
];

/// What to summarize. Unset columns are inferred from common names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InsightRequest {
    pub title: Option<String>,
    pub time_col: Option<String>,
    pub category_col: Option<String>,
    pub metrics: Vec<String>,
    pub value_cols: BTreeMap<String, String>,
    pub top_n: usize,
}

impl Default for InsightRequest {
    fn default() -> Self {
        Self {
            title: None,
            time_col: None,
            category_col: None,
            metrics: ["count", "severity", "risk", "cost", "manhours"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            value_cols: BTreeMap::new(),
            top_n: 5,
        }
    }
}

/// Formats with thousands separators and a fixed number of decimals.
fn grouped(value: f64, decimals: usize) -> String {
    let raw = format!("{:.*}", decimals, value.abs());
    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (raw, None),
    };
    let mut out = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac {
        out.push('.');
        out.push_str(&frac);
    }
    if value < 0.0 && out.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.insert(0, '-');
    }
    out
}

fn pick(table: &Table, requested: Option<&String>, candidates: &[&str]) -> Option<usize> {
    match requested {
        Some(name) => table.column_index(name),
        None => candidates.iter().find_map(|c| table.column_index(c)),
    }
}

/// Numeric reading that tolerates thousands separators and percent signs.
fn loose_number(value: &Value) -> Option<f64> {
    match value {
        Value::Text(s) => s.replace([',', '%'], "").trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        other => other.as_number(),
    }
}

fn category_of(table: &Table, col: usize, row: usize) -> String {
    let text = table.cell(row, col).display_text().trim().to_string();
    if text.is_empty() {
        "Unknown".to_string()
    } else {
        text
    }
}

/// Deterministic markdown summary of an arbitrary table.
pub fn data_insights(table: &Table, request: &InsightRequest) -> String {
    let title = request.title.as_deref().unwrap_or("Insights");
    if table.is_empty() {
        return format!("## {title}\n\n- **Summary**: No data provided.");
    }

    let time_col = pick(table, request.time_col.as_ref(), TIME_CANDIDATES);
    let cat_col = pick(table, request.category_col.as_ref(), CATEGORY_CANDIDATES);
    let wants = |metric: &str| request.metrics.iter().any(|m| m.eq_ignore_ascii_case(metric));

    let dates: Vec<NaiveDate> = time_col.map_or_else(Vec::new, |col| {
        (0..table.len())
            .filter_map(|row| table.cell(row, col).as_date())
            .collect()
    });

    let mut out = format!("## {title}\n");
    let _ = writeln!(out, "- **Rows**: {}", grouped(table.len() as f64, 0));
    if let (Some(min), Some(max)) = (dates.iter().min(), dates.iter().max()) {
        let _ = writeln!(out, "- **Date range**: {min} to {max}");
    }

    if let Some(col) = cat_col {
        let counts = aggregate::value_counts((0..table.len()).map(|row| category_of(table, col, row)));
        if !counts.is_empty() {
            out.push_str("\n### Top contributors\n");
            for (label, n) in counts.iter().take(request.top_n) {
                let _ = writeln!(out, "- **{label}**: {}", grouped(*n as f64, 0));
            }
        }
    }

    let mut quality = Vec::new();
    for (name, candidates) in METRIC_CANDIDATES {
        let Some(col) = pick(table, request.value_cols.get(name), candidates) else {
            continue;
        };
        let values: Vec<Option<f64>> = (0..table.len())
            .map(|row| loose_number(table.cell(row, col)))
            .collect();
        let missing = values.iter().filter(|v| v.is_none()).count();
        let rate = missing as f64 / table.len() as f64 * 100.0;
        if rate >= 30.0 {
            quality.push(format!(
                "- **{name}** missing {rate:.0}%; improve capture to strengthen insights."
            ));
        }
        if wants(name) {
            metric_block(&mut out, name, table, cat_col, &values);
        }
    }

    if let Some(line) = monthly_trend(&dates) {
        out.push_str("\n### Trend\n");
        let _ = writeln!(out, "{line}");
    }

    if !quality.is_empty() {
        out.push_str("\n### Data quality\n");
        for note in quality {
            let _ = writeln!(out, "{note}");
        }
    }
    out.trim_end().to_string()
}

fn metric_block(out: &mut String, name: &str, table: &Table, cat_col: Option<usize>, values: &[Option<f64>]) {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return;
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut heading = name.to_string();
    if let Some(first) = heading.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    let _ = writeln!(out, "\n### {heading} statistics");
    let _ = writeln!(out, "- **Mean**: {}", grouped(mean, 2));
    let _ = writeln!(out, "- **Min/Max**: {} / {}", grouped(min, 2), grouped(max, 2));

    let Some(col) = cat_col else {
        return;
    };
    let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (row, value) in values.iter().enumerate() {
        if let Some(v) = value {
            let entry = groups.entry(category_of(table, col, row)).or_default();
            entry.0 += v;
            entry.1 += 1;
        }
    }
    let mut means: Vec<(String, f64)> = groups
        .into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect();
    means.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let tops: Vec<String> = means
        .iter()
        .take(3)
        .map(|(k, v)| format!("{k} ({})", grouped(*v, 2)))
        .collect();
    if !tops.is_empty() {
        let _ = writeln!(out, "- **Top by {name} (avg)**: {}", tops.join(", "));
    }
}

/// Direction of the monthly count over the last three observed months.
fn monthly_trend(dates: &[NaiveDate]) -> Option<String> {
    let mut months: BTreeMap<MonthPeriod, usize> = BTreeMap::new();
    for date in dates {
        *months.entry(MonthPeriod::of(*date)).or_default() += 1;
    }
    if months.len() < 3 {
        return None;
    }
    let last3: Vec<usize> = months.values().rev().take(3).rev().copied().collect();
    if last3.iter().all(|n| *n == last3[0]) {
        return None;
    }
    let pct = (last3[2] as f64 - last3[0] as f64) / last3[0].max(1) as f64 * 100.0;
    let direction = if pct > 0.0 { "up" } else { "down" };
    Some(format!(
        "- **Monthly count trend**: {direction} {:.1}% over last 3 months",
        pct.abs()
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScorecardKpis {
    pub incidents: usize,
    pub hazards: usize,
    pub audits_completed: usize,
    pub inspections: usize,
}

pub fn scorecard_kpis(incident: &Table, hazard: &Table, audit: &Table, inspection: &Table) -> ScorecardKpis {
    let audits_completed = audit.column_index("audit_status").map_or(0, |col| {
        audit
            .column_values(col)
            .filter(|v| v.display_text().to_lowercase() == "closed")
            .count()
    });
    ScorecardKpis {
        incidents: incident.len(),
        hazards: hazard.len(),
        audits_completed,
        inspections: inspection.len(),
    }
}

pub fn scorecard_summary(kpis: &ScorecardKpis) -> String {
    [
        "## Unified HSE Scorecard".to_string(),
        format!("- **Incidents**: {}", kpis.incidents),
        format!("- **Hazards**: {}", kpis.hazards),
        format!("- **Audits completed**: {}", kpis.audits_completed),
        format!("- **Inspections**: {}", kpis.inspections),
        "\n### Recommendations".to_string(),
        "- **Action**: Set monthly targets for incident/hazard reduction.".to_string(),
        "- **Action**: Ensure timely closure of audits and follow-ups.".to_string(),
        "- **Action**: Maintain inspection cadence in high-risk areas.".to_string(),
    ]
    .join("\n")
}

/// Fallback text for the department performance index; `scores` is sorted best first.
pub fn performance_index_summary(scores: &[PerformanceIndex]) -> String {
    let title = "## HSE Performance Index";
    let (Some(top), Some(bottom)) = (scores.first(), scores.last()) else {
        return format!("{title}\n\n- **Summary**: Not enough data to analyze.");
    };
    [
        title.to_string(),
        format!("- **Top**: {} ({:.1})", top.department, top.hse_index),
        format!("- **Bottom**: {} ({:.1})", bottom.department, bottom.hse_index),
        "\n### Recommendations".to_string(),
        "- **Action**: Target low-scoring departments with focused interventions on severity/risk reduction."
            .to_string(),
        "- **Action**: Reduce reporting and resolution delays where averages are highest.".to_string(),
        "- **Action**: Share practices from top performers to lift underperformers.".to_string(),
    ]
    .join("\n")
}

/// Something that can turn a prompt and a JSON context into markdown.
pub trait InsightSource {
    fn name(&self) -> &str;

    fn generate(&self, prompt: &str, context: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Runs an external program, feeding the prompt and context on stdin and reading markdown from stdout.
#[derive(Debug, Clone)]
pub struct CommandInsightSource {
    program: String,
    args: Vec<String>,
}

impl CommandInsightSource {
    pub fn new(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| HseError::InvalidArgument("insight command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl InsightSource for CommandInsightSource {
    fn name(&self) -> &str {
        &self.program
    }

    async fn generate(&self, prompt: &str, context: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HseError::InsightSource(format!("failed to start {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = format!("{prompt}\n\n{context}\n");
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| HseError::InsightSource(format!("failed to write prompt: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| HseError::InsightSource(format!("{} did not finish: {e}", self.program)))?;
        if !output.status.success() {
            return Err(HseError::InsightSource(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn is_usable(text: &str) -> bool {
    let lower = text.to_lowercase();
    !text.trim().is_empty() && !lower.starts_with("openai") && !lower.contains("not installed")
}

/// Generated text from `source`, or `fallback()` on error, timeout, or unusable output.
pub async fn insights_with_fallback<S, F>(
    source: &S,
    prompt: &str,
    context: &str,
    timeout: Duration,
    fallback: F,
) -> String
where
    S: InsightSource,
    F: FnOnce() -> String,
{
    match tokio::time::timeout(timeout, source.generate(prompt, context)).await {
        Ok(Ok(text)) if is_usable(&text) => {
            debug!(source = source.name(), "using generated insights");
            text
        }
        Ok(Ok(_)) => {
            warn!(source = source.name(), "insight source returned nothing usable; using fallback");
            fallback()
        }
        Ok(Err(err)) => {
            warn!(source = source.name(), error = %err, "insight source failed; using fallback");
            fallback()
        }
        Err(_) => {
            warn!(source = source.name(), ?timeout, "insight source timed out; using fallback");
            fallback()
        }
    }
}
