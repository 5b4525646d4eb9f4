use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hse_analytics::config::{self, HseConfig};
use hse_analytics::insights::{self, CommandInsightSource, InsightRequest};
use hse_analytics::loader::Datasets;
use hse_analytics::{charts, filter, forecast, kpi, pyramid, report, risk, FilterSpec, Table};

#[derive(Parser)]
#[command(name = "hse-analytics")]
#[command(about = "Safety KPIs, risk scores, and forecasts from HSE record exports", long_about = None)]
struct Cli {
    /// Config file (defaults to ./hse.toml when present)
    #[arg(long, global = true, env = "HSE_CONFIG")]
    config: Option<PathBuf>,
    /// Incident table (CSV or JSON)
    #[arg(long, global = true)]
    incident: Option<PathBuf>,
    /// Hazard identification table
    #[arg(long, global = true)]
    hazard: Option<PathBuf>,
    /// Audit table
    #[arg(long, global = true)]
    audit: Option<PathBuf>,
    /// Inspection table
    #[arg(long, global = true)]
    inspection: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// Keep records on or after this date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,
    /// Keep records on or before this date (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<NaiveDate>,
    #[arg(long = "department")]
    departments: Vec<String>,
    #[arg(long = "location")]
    locations: Vec<String>,
    #[arg(long = "sublocation")]
    sublocations: Vec<String>,
    #[arg(long = "status")]
    statuses: Vec<String>,
    #[arg(long = "incident-type")]
    incident_types: Vec<String>,
    #[arg(long = "violation-type")]
    violation_types: Vec<String>,
    #[arg(long)]
    min_severity: Option<f64>,
    #[arg(long)]
    max_severity: Option<f64>,
    #[arg(long)]
    min_risk: Option<f64>,
    #[arg(long)]
    max_risk: Option<f64>,
}

impl FilterArgs {
    fn spec(&self) -> FilterSpec {
        FilterSpec {
            start_date: self.start_date,
            end_date: self.end_date,
            departments: self.departments.clone(),
            locations: self.locations.clone(),
            sublocations: self.sublocations.clone(),
            statuses: self.statuses.clone(),
            incident_types: self.incident_types.clone(),
            violation_types: self.violation_types.clone(),
            min_severity: self.min_severity,
            max_severity: self.max_severity,
            min_risk: self.min_risk,
            max_risk: self.max_risk,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// TRIR, LTIR, PSTIR, near-miss ratio, and the site safety index
    Kpis {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        hours_worked: Option<f64>,
        /// Reference day for days-since-last-incident (defaults to today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Heinrich safety pyramid
    Pyramid {
        #[command(flatten)]
        filters: FilterArgs,
        /// Split the layers by department and location
        #[arg(long)]
        breakdown: bool,
    },
    /// Leading versus lagging indicators and headline HSE counts
    Indicators {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Department risk scores
    Risk {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, value_enum, default_value_t = RiskView::Department)]
        view: RiskView,
    },
    /// Trend projections
    Forecast {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, value_enum, default_value_t = ForecastKind::Incidents)]
        kind: ForecastKind,
        #[arg(long)]
        months: Option<usize>,
    },
    /// Chart-ready series
    Chart {
        #[arg(value_enum)]
        name: ChartName,
        #[command(flatten)]
        filters: FilterArgs,
        /// Table for dataset-agnostic charts (findings, cost-trend)
        #[arg(long, value_enum)]
        dataset: Option<DatasetKind>,
        /// Incident type for the root-cause Pareto
        #[arg(long)]
        root_cause_type: Option<String>,
        #[arg(long)]
        top_n: Option<usize>,
    },
    /// Dropdown values for every filterable field
    FilterOptions,
    /// Markdown insights for one table
    Insights {
        #[arg(long, value_enum, default_value_t = DatasetKind::Incident)]
        dataset: DatasetKind,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        time_col: Option<String>,
        #[arg(long)]
        category_col: Option<String>,
        #[arg(long = "metric")]
        metrics: Vec<String>,
        #[arg(long)]
        top_n: Option<usize>,
        /// Skip the configured insight command
        #[arg(long)]
        offline: bool,
    },
    /// Cross-dataset scorecard and performance index summaries
    Scorecard {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        filters: FilterArgs,
        /// Label for the report header (defaults to the first department or location filter)
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        hours_worked: Option<f64>,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RiskView {
    Department,
    Actual,
    Potential,
    Performance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ForecastKind {
    Incidents,
    Risk,
    Lag,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DatasetKind {
    Incident,
    Hazard,
    Audit,
    Inspection,
}

impl DatasetKind {
    fn table(self, datasets: &Datasets) -> &Table {
        match self {
            DatasetKind::Incident => &datasets.incident,
            DatasetKind::Hazard => &datasets.hazard,
            DatasetKind::Audit => &datasets.audit,
            DatasetKind::Inspection => &datasets.inspection,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ChartName {
    IncidentTrend,
    IncidentTypes,
    RootCauseTypes,
    RootCause,
    InjurySeverity,
    DepartmentHeatmap,
    ConsequenceGap,
    AuditStatus,
    AuditRating,
    AuditVolume,
    InspectionCoverage,
    Findings,
    HazardSeverity,
    HazardTypes,
    CostTrend,
    RepeatedIncidents,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn chart_json(
    name: ChartName,
    datasets: &Datasets,
    spec: &FilterSpec,
    config: &HseConfig,
    dataset: Option<DatasetKind>,
    root_cause_type: Option<&str>,
    top_n: Option<usize>,
) -> serde_json::Result<serde_json::Value> {
    let incident = &datasets.incident;
    match name {
        ChartName::IncidentTrend => serde_json::to_value(charts::incident_trend(incident, spec)),
        ChartName::IncidentTypes => {
            serde_json::to_value(charts::incident_type_distribution(incident, spec))
        }
        ChartName::RootCauseTypes => {
            serde_json::to_value(charts::root_cause_incident_types(incident, spec))
        }
        ChartName::RootCause => serde_json::to_value(charts::root_cause_pareto(
            incident,
            spec,
            root_cause_type,
            top_n.unwrap_or(config.pareto_top_n),
        )),
        ChartName::InjurySeverity => serde_json::to_value(charts::injury_severity(incident, spec)),
        ChartName::DepartmentHeatmap => {
            serde_json::to_value(charts::department_month_heatmap(incident, spec))
        }
        ChartName::ConsequenceGap => serde_json::to_value(charts::consequence_gap(incident, spec)),
        ChartName::AuditStatus => {
            serde_json::to_value(charts::audit_status_distribution(&datasets.audit, spec))
        }
        ChartName::AuditRating => {
            serde_json::to_value(charts::audit_rating_trend(&datasets.audit, spec))
        }
        ChartName::AuditVolume => {
            serde_json::to_value(charts::audit_monthly_volume(&datasets.audit, spec))
        }
        ChartName::InspectionCoverage => {
            serde_json::to_value(charts::inspection_coverage(&datasets.inspection, spec))
        }
        ChartName::Findings => {
            let table = dataset.unwrap_or(DatasetKind::Audit).table(datasets);
            serde_json::to_value(charts::top_findings(table, spec))
        }
        ChartName::HazardSeverity => serde_json::to_value(charts::hazard_severity_by_type(
            &datasets.hazard,
            spec,
            config.others_min_count,
        )),
        ChartName::HazardTypes => {
            serde_json::to_value(charts::hazard_type_counts(&datasets.hazard, spec))
        }
        ChartName::CostTrend => {
            let table = dataset.unwrap_or(DatasetKind::Incident).table(datasets);
            serde_json::to_value(charts::cost_trend(table, spec))
        }
        ChartName::RepeatedIncidents => {
            serde_json::to_value(charts::repeated_incidents(incident, spec))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::load_config(cli.config.as_deref()).context("failed to load config")?;
    let overrides = [
        (cli.incident, &mut config.datasets.incident),
        (cli.hazard, &mut config.datasets.hazard),
        (cli.audit, &mut config.datasets.audit),
        (cli.inspection, &mut config.datasets.inspection),
    ];
    for (flag, slot) in overrides {
        if flag.is_some() {
            *slot = flag;
        }
    }
    let datasets = Datasets::load(&config.datasets).context("failed to load datasets")?;

    match cli.command {
        Commands::Kpis {
            filters,
            hours_worked,
            as_of,
        } => {
            let config = config
                .with_overrides(hours_worked, None)
                .context("invalid --hours-worked")?;
            let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
            let summary = kpi::kpi_summary(
                &datasets.incident,
                &datasets.hazard,
                &datasets.audit,
                &filters.spec(),
                config.hours_worked,
                as_of,
            );
            print_json(&summary)?;
        }
        Commands::Pyramid { filters, breakdown } => {
            let spec = filters.spec();
            if breakdown {
                print_json(&pyramid::pyramid_breakdown(
                    &datasets.incident,
                    &datasets.hazard,
                    &datasets.audit,
                    &datasets.inspection,
                    &spec,
                ))?;
            } else {
                let incident = filter::apply(&datasets.incident, &spec);
                let hazard = filter::apply(&datasets.hazard, &spec);
                print_json(&pyramid::heinrich_pyramid(&incident, &hazard, &datasets.audit))?;
            }
        }
        Commands::Indicators { filters } => {
            let spec = filters.spec();
            let incident = filter::apply(&datasets.incident, &spec);
            let hazard = filter::apply(&datasets.hazard, &spec);
            print_json(&serde_json::json!({
                "filter_summary": filter::filter_summary(&datasets.incident, &incident, &spec),
                "leading_vs_lagging": kpi::leading_vs_lagging(
                    &datasets.incident,
                    &datasets.hazard,
                    &datasets.audit,
                    &datasets.inspection,
                ),
                "hse_metrics": pyramid::hse_metrics(&incident, &hazard, &datasets.audit),
            }))?;
        }
        Commands::Risk { filters, view } => {
            let spec = filters.spec();
            let incident = &datasets.incident;
            match view {
                RiskView::Department => print_json(&risk::department_risk(incident, &spec))?,
                RiskView::Actual => print_json(&risk::actual_risk_scores(incident, &spec))?,
                RiskView::Potential => print_json(&risk::potential_risk_scores(incident, &spec))?,
                RiskView::Performance => {
                    print_json(&risk::hse_performance_index(incident, &spec))?
                }
            }
        }
        Commands::Forecast {
            filters,
            kind,
            months,
        } => {
            let spec = filters.spec();
            let months = config
                .with_overrides(None, months)
                .context("invalid --months")?
                .forecast_months;
            match kind {
                ForecastKind::Incidents => {
                    print_json(&forecast::incident_forecast(&datasets.incident, &spec, months))?
                }
                ForecastKind::Risk => print_json(&forecast::risk_trend_projection(
                    &datasets.incident,
                    &datasets.hazard,
                    &spec,
                    months,
                ))?,
                ForecastKind::Lag => print_json(&forecast::observation_lag_time(
                    &datasets.incident,
                    &datasets.hazard,
                    &spec,
                ))?,
            }
        }
        Commands::Chart {
            name,
            filters,
            dataset,
            root_cause_type,
            top_n,
        } => {
            let value = chart_json(
                name,
                &datasets,
                &filters.spec(),
                &config,
                dataset,
                root_cause_type.as_deref(),
                top_n,
            )?;
            print_json(&value)?;
        }
        Commands::FilterOptions => {
            print_json(&filter::filter_options(
                &datasets.incident,
                &datasets.hazard,
                &datasets.audit,
                &datasets.inspection,
            ))?;
        }
        Commands::Insights {
            dataset,
            filters,
            title,
            time_col,
            category_col,
            metrics,
            top_n,
            offline,
        } => {
            let table = filter::apply(dataset.table(&datasets), &filters.spec());
            let mut request = InsightRequest {
                title,
                time_col,
                category_col,
                ..InsightRequest::default()
            };
            if !metrics.is_empty() {
                request.metrics = metrics;
            }
            if let Some(n) = top_n {
                request.top_n = n;
            }
            let deterministic = insights::data_insights(&table, &request);

            let text = match (&config.insights.command, offline) {
                (Some(argv), false) => {
                    let source = CommandInsightSource::new(argv)?;
                    insights::insights_with_fallback(
                        &source,
                        "Rewrite this HSE data summary as concise markdown insights for site leadership.",
                        &deterministic,
                        Duration::from_secs(config.insights.timeout_secs),
                        || deterministic.clone(),
                    )
                    .await
                }
                _ => deterministic,
            };
            println!("{text}");
        }
        Commands::Scorecard { filters } => {
            let spec = filters.spec();
            let incident = filter::apply(&datasets.incident, &spec);
            let hazard = filter::apply(&datasets.hazard, &spec);
            let kpis = insights::scorecard_kpis(
                &incident,
                &hazard,
                &datasets.audit,
                &datasets.inspection,
            );
            println!("{}", insights::scorecard_summary(&kpis));
            println!();
            let index = risk::hse_performance_index(&datasets.incident, &spec);
            println!("{}", insights::performance_index_summary(&index));
        }
        Commands::Report {
            filters,
            scope,
            hours_worked,
            as_of,
            out,
        } => {
            let spec = filters.spec();
            let config = config
                .with_overrides(hours_worked, None)
                .context("invalid --hours-worked")?;
            let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
            let scope = scope
                .or_else(|| spec.departments.first().cloned())
                .or_else(|| spec.locations.first().cloned());

            let incident = filter::apply(&datasets.incident, &spec);
            let hazard = filter::apply(&datasets.hazard, &spec);
            let report = report::build_report(
                scope.as_deref(),
                as_of,
                &kpi::kpi_summary(
                    &datasets.incident,
                    &datasets.hazard,
                    &datasets.audit,
                    &spec,
                    config.hours_worked,
                    as_of,
                ),
                &pyramid::heinrich_pyramid(&incident, &hazard, &datasets.audit),
                &risk::department_risk(&datasets.incident, &spec),
                &kpi::leading_vs_lagging(
                    &datasets.incident,
                    &datasets.hazard,
                    &datasets.audit,
                    &datasets.inspection,
                ),
                &forecast::incident_forecast(&datasets.incident, &spec, config.forecast_months),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(path = %out.display(), "report written");
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
