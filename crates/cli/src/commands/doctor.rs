use parley_core::config::{AppConfig, LlmProvider, LoadOptions};
use parley_db::{connect_with_settings, ping};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_DB_CONNECTIVITY};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
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

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = exit_code(&report);

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

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_settings(&config));
            checks.extend(check_stores(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_settings", "database_connectivity", "checkpoint_store"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let overall_status = if checks.iter().any(|check| check.status == CheckStatus::Fail) {
        CheckStatus::Fail
    } else if checks.iter().any(|check| check.status == CheckStatus::Warn) {
        CheckStatus::Warn
    } else {
        CheckStatus::Pass
    };
    let summary = match overall_status {
        CheckStatus::Pass => "doctor: all readiness checks passed",
        CheckStatus::Warn => "doctor: ready with degraded features",
        _ => "doctor: one or more readiness checks failed",
    }
    .to_string();

    DoctorReport { overall_status, summary, checks }
}

/// Settings only: the model endpoint is not called.
fn check_llm_settings(config: &AppConfig) -> DoctorCheck {
    let base_url = config
        .llm
        .base_url
        .clone()
        .unwrap_or_else(|| config.llm.provider.default_base_url().to_string());
    let embeddings = match config.llm.provider {
        LlmProvider::Anthropic => "no embeddings endpoint; retrieval falls back to SQL rows",
        LlmProvider::OpenAi | LlmProvider::Ollama => "embeddings available",
    };

    DoctorCheck {
        name: "llm_settings",
        status: if config.llm.provider == LlmProvider::Anthropic {
            CheckStatus::Warn
        } else {
            CheckStatus::Pass
        },
        details: format!(
            "{} model `{}` at `{base_url}`; {embeddings}",
            config.llm.provider.as_str(),
            config.llm.model
        ),
    }
}

fn check_stores(config: &AppConfig) -> Vec<DoctorCheck> {
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

    let memory_url = config.memory.effective_url(&config.database);
    runtime.block_on(async {
        let database = match reach(&config.database.url, config).await {
            Ok(()) => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            },
            Err(error) => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: error,
            },
        };

        let memory = match reach(&memory_url, config).await {
            Ok(()) => DoctorCheck {
                name: "checkpoint_store",
                status: CheckStatus::Pass,
                details: format!("durable checkpoints at `{memory_url}`"),
            },
            Err(error) if config.memory.required => DoctorCheck {
                name: "checkpoint_store",
                status: CheckStatus::Fail,
                details: format!("{error}; memory.required is set, startup would fail"),
            },
            Err(error) => DoctorCheck {
                name: "checkpoint_store",
                status: CheckStatus::Warn,
                details: format!("{error}; conversations would use volatile memory"),
            },
        };

        vec![database, memory]
    })
}

async fn reach(url: &str, config: &AppConfig) -> Result<(), String> {
    let pool = connect_with_settings(url, 1, config.database.timeout_secs)
        .await
        .map_err(|error| format!("failed to connect to `{url}`: {error}"))?;
    let result = ping(&pool).await.map_err(|error| format!("ping failed for `{url}`: {error}"));
    pool.close().await;
    result
}

fn exit_code(report: &DoctorReport) -> u8 {
    let failed = |name: &str| {
        report.checks.iter().any(|check| check.name == name && check.status == CheckStatus::Fail)
    };
    if failed("config_validation") {
        EXIT_CONFIG
    } else if report.overall_status == CheckStatus::Fail {
        EXIT_DB_CONNECTIVITY
    } else {
        0
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
