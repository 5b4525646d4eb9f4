use std::fmt::Write;

use chrono::NaiveDate;

use crate::forecast::IncidentForecast;
use crate::kpi::{KpiSummary, LeadingLagging};
use crate::models::DepartmentRiskReport;
use crate::pyramid::PyramidLevel;

pub fn build_report(
    scope: Option<&str>,
    as_of: NaiveDate,
    kpis: &KpiSummary,
    pyramid: &[PyramidLevel],
    risk: &DepartmentRiskReport,
    indicators: &LeadingLagging,
    forecast: &IncidentForecast,
) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all sites");

    let _ = writeln!(output, "# HSE Performance Report");
    let _ = writeln!(output, "Generated for {} (as of {})", scope_label, as_of);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Indicators");
    let _ = writeln!(
        output,
        "- TRIR {:.2} ({}) from {} recordable incidents over {} hours",
        kpis.trir.value,
        kpis.trir.benchmark,
        kpis.trir.recordable_incidents,
        kpis.trir.total_hours_worked
    );
    let _ = writeln!(
        output,
        "- LTIR {:.2} from {} lost-time incidents",
        kpis.ltir.value, kpis.ltir.lost_time_incidents
    );
    let _ = writeln!(
        output,
        "- PSTIR {:.2} from {} process safety incidents",
        kpis.pstir.value, kpis.pstir.psm_incidents
    );
    let _ = writeln!(
        output,
        "- Near-miss ratio {:.2} ({})",
        kpis.near_miss_ratio.ratio, kpis.near_miss_ratio.benchmark
    );

    let index = &kpis.safety_index;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Site Safety Index");
    let _ = writeln!(output, "Score {:.2} ({})", index.score, index.rating);
    for factor in &index.breakdown {
        let _ = writeln!(output, "- {}: {:+.1}", factor.factor, factor.impact);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Heinrich Pyramid");
    if pyramid.iter().all(|level| level.count == 0) {
        let _ = writeln!(output, "No classifiable events recorded.");
    } else {
        for level in pyramid {
            let _ = writeln!(
                output,
                "- Level {} {}: {} ({:.1}%)",
                level.level, level.description, level.count, level.percent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Departments");
    if risk.table.is_empty() {
        let _ = writeln!(output, "No injuries recorded for this scope.");
    } else {
        for row in risk.table.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} score {:.2} (normalized {:.2}) across {} injuries",
                row.department, row.risk_score, row.normalized_score, row.injury_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Leading vs Lagging");
    let _ = writeln!(
        output,
        "{} leading / {} lagging, ratio {}: {}",
        indicators.total_leading,
        indicators.total_lagging,
        indicators.ratio_text,
        indicators.assessment
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Incident Forecast");
    if forecast.forecast.is_empty() {
        let _ = writeln!(output, "Not enough dated incidents to project.");
    } else {
        for point in &forecast.forecast {
            let _ = writeln!(
                output,
                "- {}: {:.2} expected (range {:.2} to {:.2})",
                point.month, point.predicted_count, point.confidence_lower, point.confidence_upper
            );
        }
    }

    output
}
