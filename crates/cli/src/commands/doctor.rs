use melodex_core::config::{AppConfig, LoadOptions};
use melodex_core::{RawRow, Recommender};
use serde::Serialize;

use super::CommandResult;
use crate::catalog_file;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            match check_catalog(&config) {
                (check, Some(rows)) => {
                    checks.push(check);
                    checks.push(check_index_build(&config, &rows));
                }
                (check, None) => {
                    checks.push(check);
                    checks.push(skipped("index_build", "catalog did not load"));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped("catalog_readable", "configuration did not load"));
            checks.push(skipped("index_build", "configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_catalog(config: &AppConfig) -> (DoctorCheck, Option<Vec<RawRow>>) {
    let Some(path) = &config.catalog.path else {
        return (
            DoctorCheck {
                name: "catalog_readable",
                status: CheckStatus::Fail,
                details: "no catalog path configured".to_string(),
            },
            None,
        );
    };

    match catalog_file::load_rows(path) {
        Ok(rows) => (
            DoctorCheck {
                name: "catalog_readable",
                status: CheckStatus::Pass,
                details: format!("read {} rows from `{}`", rows.len(), path.display()),
            },
            Some(rows),
        ),
        Err(error) => (
            DoctorCheck {
                name: "catalog_readable",
                status: CheckStatus::Fail,
                details: format!("{error:#}"),
            },
            None,
        ),
    }
}

fn check_index_build(config: &AppConfig, rows: &[RawRow]) -> DoctorCheck {
    match Recommender::build(rows, &config.field_spec(), &config.engine_settings()) {
        Ok(recommender) => {
            let stats = recommender.build_stats();
            DoctorCheck {
                name: "index_build",
                status: CheckStatus::Pass,
                details: format!(
                    "{} songs indexed ({} duplicates dropped), {} terms",
                    stats.rows, stats.duplicates_dropped, stats.vocabulary_size
                ),
            }
        }
        Err(error) => DoctorCheck {
            name: "index_build",
            status: CheckStatus::Fail,
            details: format!("{}: {error}", error.error_class()),
        },
    }
}

fn skipped(name: &'static str, reason: &str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: format!("skipped because {reason}"),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
