use anyhow::{Context, Result, bail};
use barb_pipeline::app::{build_pipeline, init_tracing};
use barb_pipeline::config::{DEFAULT_CONFIG_PATH, ExecutionMode, PipelineConfig};
use barb_pipeline::models::EnumerateRequest;
use barb_pipeline::pipeline::StageTask;
use barb_pipeline::server;
use chrono::NaiveDate;
use std::env;
use std::sync::Arc;
use tracing::info;

const USAGE: &str = "usage: barb-pipeline <serve | run | enumerate> [--start YYYY-MM-DD] [--end YYYY-MM-DD] [--reports a,b,c] [--config PATH]";

struct Args {
    command: String,
    config_path: String,
    request: EnumerateRequest,
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "serve".to_string());
    let mut parsed = Args {
        command,
        config_path: DEFAULT_CONFIG_PATH.to_string(),
        request: EnumerateRequest::default(),
    };

    while let Some(flag) = args.next() {
        let Some(value) = args.next() else {
            bail!("Missing value for {}\n{}", flag, USAGE);
        };
        match flag.as_str() {
            "--start" => parsed.request.start_date = Some(parse_date(&value)?),
            "--end" => parsed.request.end_date = Some(parse_date(&value)?),
            "--reports" => {
                parsed.request.query_list =
                    Some(value.split(',').map(|s| s.trim().to_string()).collect())
            }
            "--config" => parsed.config_path = value,
            other => bail!("Unknown option {}\n{}", other, USAGE),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let args = parse_args()?;
    let mut config = PipelineConfig::load(&args.config_path)
        .with_context(|| format!("Failed to load configuration from {}", args.config_path))?;
    init_tracing(&config.logging);

    match args.command.as_str() {
        "serve" => {
            let (host, port) = (config.server.host.clone(), config.server.port);
            info!("🚀 Starting Barb pipeline callback server ({:?} mode)", config.orchestration.mode);
            let pipeline = Arc::new(build_pipeline(config).await?);
            server::serve(pipeline, &host, port).await
        }
        "run" | "enumerate" => {
            if args.command == "run" {
                // Every stage runs in this process.
                config.orchestration.mode = ExecutionMode::Direct;
            }
            info!("🚀 Starting Barb pipeline {} ({:?} mode)", args.command, config.orchestration.mode);
            let pipeline = build_pipeline(config).await?;
            let status = pipeline
                .execute(StageTask::Enumerate(args.request))
                .await
                .context("Enumerate stage failed")?;
            info!("✅ Enumerate finished: {}", status);
            Ok(())
        }
        other => bail!("Unknown command '{}'\n{}", other, USAGE),
    }
}
