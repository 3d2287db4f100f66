use serde::Serialize;
use telos_agent::automation::HttpAutomationSink;
use telos_agent::prompts::{FilePromptSource, PromptSource};
use telos_core::config::{AppConfig, LoadOptions};
use telos_core::tokens::TokenAccountant;

use super::{block_on, escape_json, CommandResult, EXIT_CHECK_FAILED};

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

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self::new(name, CheckStatus::Skipped, "skipped because configuration did not load")
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { EXIT_CHECK_FAILED } else { 0 };

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
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_budget_consistency(&config));
            checks.push(check_prompt_source(&config));
            checks.push(check_automation(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            checks.push(DoctorCheck::skipped("budget_consistency"));
            checks.push(DoctorCheck::skipped("prompt_source"));
            checks.push(DoctorCheck::skipped("automation_readiness"));
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let any_warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (any_failed, any_warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready, with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_budget_consistency(config: &AppConfig) -> DoctorCheck {
    let budget = &config.budget;
    if budget.is_consistent() {
        return DoctorCheck::new(
            "budget_consistency",
            CheckStatus::Pass,
            format!("sub-budgets sum to {} of {} tokens", budget.sub_budget_sum(), budget.total),
        );
    }

    DoctorCheck::new(
        "budget_consistency",
        CheckStatus::Warn,
        format!(
            "sub-budgets sum to {} tokens, above the total of {}; prompts may be trimmed unevenly",
            budget.sub_budget_sum(),
            budget.total
        ),
    )
}

fn check_prompt_source(config: &AppConfig) -> DoctorCheck {
    let Some(dir) = config.chat.prompt_dir.as_ref() else {
        return DoctorCheck::new(
            "prompt_source",
            CheckStatus::Pass,
            "no prompt directory configured; the built-in prompt is used",
        );
    };

    let source = FilePromptSource::briefing(dir);
    match block_on(source.load()) {
        Ok(Ok(prompt)) => {
            let tokens = TokenAccountant::default().estimate_tokens(&prompt);
            let status = if tokens > config.budget.system_prompt {
                CheckStatus::Warn
            } else {
                CheckStatus::Pass
            };
            DoctorCheck::new(
                "prompt_source",
                status,
                format!(
                    "loaded prompt from `{}` (~{tokens} tokens, budget {})",
                    dir.display(),
                    config.budget.system_prompt
                ),
            )
        }
        Ok(Err(error)) => DoctorCheck::new("prompt_source", CheckStatus::Fail, error.to_string()),
        Err(error) => DoctorCheck::new("prompt_source", CheckStatus::Fail, error),
    }
}

fn check_automation(config: &AppConfig) -> DoctorCheck {
    if !config.automation.enabled {
        return DoctorCheck::new(
            "automation_readiness",
            CheckStatus::Skipped,
            "automation hand-off is disabled",
        );
    }

    match HttpAutomationSink::from_config(&config.automation) {
        Ok(Some(sink)) => {
            let signing = if config.automation.webhook_secret.is_some() {
                "signed"
            } else {
                "unsigned"
            };
            DoctorCheck::new(
                "automation_readiness",
                CheckStatus::Pass,
                format!("leads will be posted to `{}` ({signing})", sink.endpoint()),
            )
        }
        Ok(None) => DoctorCheck::new(
            "automation_readiness",
            CheckStatus::Skipped,
            "automation hand-off is disabled",
        ),
        Err(error) => {
            DoctorCheck::new("automation_readiness", CheckStatus::Fail, error.to_string())
        }
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
