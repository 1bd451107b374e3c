//! AIGov Gate - batch runner
//!
//! Reads a gate request (JSON) from a file, or stdin when the path is `-` or
//! missing, runs the stage and the compliance assessment, and prints the
//! decision as JSON. Exits with status 2 when deployment is denied and 1 when
//! the run itself fails.

use aigov_gate::config::LogFormat;
use aigov_gate::error::ErrorReport;
use aigov_gate::lifecycle::{Facts, LifecycleStage};
use aigov_gate::{GovernanceCore, Settings};
use anyhow::Context;
use serde::Deserialize;
use std::io::Read;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Input document of one gate run
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GateRequest {
    system_id: String,
    stage: LifecycleStage,
    #[serde(default)]
    input_data: Facts,
    framework: String,
    #[serde(default)]
    evidence: Facts,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load configuration
    let settings = Settings::load()?;
    init_tracing(settings.log_format);

    info!("🚀 Starting AIGov Gate...");
    info!("📋 Configuration loaded successfully");

    let request = read_request(std::env::args().nth(1).as_deref())?;

    let core = match GovernanceCore::build(settings).await {
        Ok(core) => core,
        Err(e) => {
            error!("❌ FATAL: Failed to build governance core: {}", e);
            return Err(e.into());
        }
    };

    let decision = match core
        .decide(
            &request.system_id,
            request.stage,
            request.input_data,
            &request.framework,
            &request.evidence,
        )
        .await
    {
        Ok(decision) => decision,
        Err(e) => {
            error!("❌ Gate run failed: {}", e);
            println!("{}", serde_json::to_string_pretty(&ErrorReport::from(&e))?);
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("{}", serde_json::to_string_pretty(&decision)?);

    Ok(if decision.deploy_allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn read_request(path: Option<&str>) -> anyhow::Result<GateRequest> {
    let raw = match path {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read gate request from stdin")?;
            buf
        }
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?,
    };
    serde_json::from_str(&raw).context("Invalid gate request JSON")
}

/// Initialize tracing with structured logging (to stderr, stdout carries the decision)
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,aigov_gate=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init(),
    }
}
