use proptalk_core::config::{AppConfig, ExtractorKind, LlmProvider, LoadOptions};
use proptalk_db::repositories::{PropertyRepository, SqlPropertyRepository};
use proptalk_db::{connect_with_config, migrations};
use serde::Serialize;

use crate::commands::{exit, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn from_checks(checks: Vec<DoctorCheck>) -> Self {
        let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
        let (overall_status, summary) = if failed {
            (CheckStatus::Fail, "doctor: one or more readiness checks failed")
        } else {
            (CheckStatus::Pass, "doctor: ready")
        };
        Self { overall_status, summary: summary.to_string(), checks }
    }
}

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code =
        if report.overall_status == CheckStatus::Fail { exit::CHECK_FAILED } else { exit::OK };

    let output = if json_output {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => json,
            Err(error) => {
                return CommandResult::failure(
                    "doctor",
                    "serialization",
                    error.to_string(),
                    exit::CHECK_FAILED,
                )
            }
        }
    } else {
        render_human(&report)
    };
    CommandResult { exit_code, output }
}

pub fn build_report(options: &LoadOptions) -> DoctorReport {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            let mut checks = vec![DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            }];
            for name in ["slack_readiness", "extractor_readiness", "database_connectivity", "inventory"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
            return DoctorReport::from_checks(checks);
        }
    };

    let mut checks = vec![
        DoctorCheck {
            name: "config_validation",
            status: CheckStatus::Pass,
            details: "configuration loaded and validated".to_string(),
        },
        check_slack(&config),
        check_extractor(&config),
    ];
    checks.extend(check_database(&config));
    DoctorReport::from_checks(checks)
}

fn check_slack(config: &AppConfig) -> DoctorCheck {
    if config.slack.enabled {
        DoctorCheck {
            name: "slack_readiness",
            status: CheckStatus::Pass,
            details: "slack enabled; token formats validated".to_string(),
        }
    } else {
        DoctorCheck {
            name: "slack_readiness",
            status: CheckStatus::Skipped,
            details: "slack disabled".to_string(),
        }
    }
}

fn check_extractor(config: &AppConfig) -> DoctorCheck {
    match config.conversation.extractor {
        ExtractorKind::Rules => DoctorCheck {
            name: "extractor_readiness",
            status: CheckStatus::Pass,
            details: "rule-based extractor".to_string(),
        },
        ExtractorKind::Llm => {
            let needs_key = matches!(config.llm.provider, LlmProvider::OpenAi | LlmProvider::Anthropic);
            if needs_key && config.llm.api_key.is_none() {
                DoctorCheck {
                    name: "extractor_readiness",
                    status: CheckStatus::Fail,
                    details: format!("llm.api_key is required for {:?}", config.llm.provider),
                }
            } else {
                DoctorCheck {
                    name: "extractor_readiness",
                    status: CheckStatus::Pass,
                    details: format!("llm extractor via {:?} ({})", config.llm.provider, config.llm.model),
                }
            }
        }
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "inventory",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let mut checks = vec![DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        }];

        let applied = migrations::applied_count(&pool).await.unwrap_or(0);
        let inventory = if applied == 0 {
            DoctorCheck {
                name: "inventory",
                status: CheckStatus::Warn,
                details: "schema not migrated; run `proptalk migrate`".to_string(),
            }
        } else {
            match SqlPropertyRepository::new(pool.clone()).count().await {
                Ok(0) => DoctorCheck {
                    name: "inventory",
                    status: CheckStatus::Warn,
                    details: "no properties loaded; run `proptalk seed`".to_string(),
                },
                Ok(count) => DoctorCheck {
                    name: "inventory",
                    status: CheckStatus::Pass,
                    details: format!("{count} properties listed"),
                },
                Err(error) => DoctorCheck {
                    name: "inventory",
                    status: CheckStatus::Fail,
                    details: format!("inventory count failed: {error}"),
                },
            }
        };
        checks.push(inventory);

        pool.close().await;
        checks
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }
    lines.join("\n")
}
