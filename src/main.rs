mod admin;
mod config;
mod error;
mod logging;
mod mapper;
mod models;
mod service;
mod sheets;

use admin::AdminClient;
use clap::Parser;
use config::Settings;
use error::AppError;
use logging::{init_logging, LogFormat};
use models::RunSummary;
use service::{http_client, SyncService};
use sheets::auth::ServiceAccountTokenSource;
use sheets::google::GoogleSheetsClient;
use std::process::ExitCode;
use tracing::{debug, error};

#[derive(Debug, Parser)]
#[command(name = "usage-sheet-sync")]
#[command(about = "Append admin API usage and cost reports to a spreadsheet")]
struct Cli {
    /// Fetch and map reports but skip every spreadsheet write
    #[arg(long)]
    dry_run: bool,

    /// Overrides LOOKBACK_HOURS
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
    lookback_hours: Option<i64>,

    /// Format for log lines on stderr and the summary on stdout
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if cli.dry_run {
        settings.dry_run = true;
    }
    if let Some(hours) = cli.lookback_hours {
        settings.lookback_hours = hours;
    }
}

fn summary_line(summary: &RunSummary) -> String {
    let run_at = models::format_timestamp(summary.run_at);
    if summary.dry_run {
        format!(
            "[dry-run] Would append {} usage rows and {} cost rows at {}",
            summary.usage.rows, summary.cost.rows, run_at
        )
    } else {
        format!(
            "Appended {} usage rows and {} cost rows at {}",
            summary.usage.rows, summary.cost.rows, run_at
        )
    }
}

fn render_summary(summary: &RunSummary, format: LogFormat) -> Result<String, AppError> {
    match format {
        LogFormat::Json => Ok(serde_json::to_string(summary)?),
        LogFormat::Pretty => Ok(summary_line(summary)),
    }
}

async fn run(cli: &Cli) -> Result<RunSummary, AppError> {
    let mut settings = Settings::from_env()?;
    apply_overrides(&mut settings, cli);
    debug!(?settings, "loaded configuration");

    let client = http_client()?;
    let tokens = ServiceAccountTokenSource::new(client.clone(), settings.service_account.clone())?;
    let identity = tokens.client_email().to_string();
    let sheets = GoogleSheetsClient::new(
        client.clone(),
        &settings.sheets_base_url,
        &settings.sheet_id,
        &identity,
        Box::new(tokens),
    )?;
    let admin = AdminClient::new(client, &settings);

    SyncService::new(admin, settings.lookback_hours, settings.dry_run)
        .run(&sheets)
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match run(&cli)
        .await
        .and_then(|summary| render_summary(&summary, cli.log_format))
    {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "sync failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
