use closelink_core::config::{AppConfig, LoadOptions};
use closelink_crm::CloseClient;
use serde::Serialize;
use serde_json::Value;

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

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
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
            checks.push(check_webhook_signature_key(&config));
            if config.close.has_api_key() {
                checks.push(DoctorCheck {
                    name: "api_key_present",
                    status: CheckStatus::Pass,
                    details: "close.api_key is set".to_string(),
                });
                checks.push(check_credential(&config));
            } else {
                checks.push(DoctorCheck {
                    name: "api_key_present",
                    status: CheckStatus::Fail,
                    details: "close.api_key is empty; set CLOSELINK_CLOSE_API_KEY".to_string(),
                });
                checks.push(skipped("credential_check", "skipped because no API key is configured"));
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            let reason = "skipped because configuration did not load";
            checks.push(skipped("webhook_signature_key", reason));
            checks.push(skipped("api_key_present", reason));
            checks.push(skipped("credential_check", reason));
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str, details: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: details.to_string() }
}

fn check_webhook_signature_key(config: &AppConfig) -> DoctorCheck {
    if config.webhook.signature_key.is_some() {
        DoctorCheck {
            name: "webhook_signature_key",
            status: CheckStatus::Pass,
            details: format!(
                "deliveries verified with the {} scheme, {}s tolerance",
                config.webhook.scheme.as_str(),
                config.webhook.tolerance_secs
            ),
        }
    } else {
        skipped("webhook_signature_key", "no signature key configured; deliveries are not verified")
    }
}

fn check_credential(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "credential_check",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let client = CloseClient::from_config(&config.close)?;
        client.verify_credential().await
    });

    match result {
        Ok(me) => {
            let who = ["email", "first_name", "id"]
                .iter()
                .find_map(|key| me.get(*key).and_then(Value::as_str))
                .unwrap_or("unknown user");
            DoctorCheck {
                name: "credential_check",
                status: CheckStatus::Pass,
                details: format!("authenticated as {who} against {}", config.close.base_url),
            }
        }
        Err(error) => DoctorCheck {
            name: "credential_check",
            status: CheckStatus::Fail,
            details: format!("{} ({})", error, error.kind_str()),
        },
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
