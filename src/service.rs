use crate::admin::AdminClient;
use crate::error::AppError;
use crate::mapper::{map_cost, map_usage};
use crate::models::{CostRecord, LookbackWindow, Row, RunSummary, UsageRecord};
use crate::sheets::{SheetService, SheetWriter, COST_TAB, USAGE_TAB};
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

pub fn http_client() -> Result<Client, AppError> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

pub struct SyncService {
    admin: AdminClient,
    lookback_hours: i64,
    dry_run: bool,
}

impl SyncService {
    pub fn new(admin: AdminClient, lookback_hours: i64, dry_run: bool) -> Self {
        Self {
            admin,
            lookback_hours,
            dry_run,
        }
    }

    /// Fetches both reports, then appends them to the spreadsheet. Nothing is
    /// written to the sheet unless both fetches succeed.
    pub async fn run(&self, sheet: &dyn SheetService) -> Result<RunSummary, AppError> {
        let run_at = Utc::now();
        let window = LookbackWindow::ending_at(run_at, self.lookback_hours)?;
        info!(
            start = %window.start,
            end = %window.end,
            dry_run = self.dry_run,
            "starting sync"
        );

        let usage_entries = self.admin.fetch_usage(&window).await?;
        let cost_entries = self.admin.fetch_cost(&window).await?;

        let usage = map_usage(&usage_entries, run_at);
        let cost = map_cost(&cost_entries, run_at);
        note_missing_fields(USAGE_TAB, usage.iter().map(UsageRecord::missing_fields));
        note_missing_fields(COST_TAB, cost.iter().map(CostRecord::missing_fields));

        let usage_rows: Vec<Row> = usage.iter().map(UsageRecord::to_row).collect();
        let cost_rows: Vec<Row> = cost.iter().map(CostRecord::to_row).collect();

        let writer = SheetWriter::open(sheet, self.dry_run).await?;
        let usage = writer
            .write_tab(USAGE_TAB, &UsageRecord::HEADER, &usage_rows)
            .await?;
        let cost = writer
            .write_tab(COST_TAB, &CostRecord::HEADER, &cost_rows)
            .await?;

        info!(
            usage_rows = usage.rows,
            cost_rows = cost.rows,
            dry_run = self.dry_run,
            "sync finished"
        );
        Ok(RunSummary {
            run_at,
            dry_run: self.dry_run,
            usage,
            cost,
        })
    }
}

/// Logs each incomplete entry at debug and one warning per tab. Returns the
/// number of incomplete entries.
fn note_missing_fields<I>(tab: &str, missing: I) -> usize
where
    I: Iterator<Item = Vec<&'static str>>,
{
    let mut incomplete = 0usize;
    for (index, fields) in missing.enumerate() {
        if !fields.is_empty() {
            incomplete += 1;
            debug!(tab, index, missing = ?fields, "entry is missing fields");
        }
    }
    if incomplete > 0 {
        warn!(tab, entries = incomplete, "entries missing expected fields were written with empty cells");
    }
    incomplete
}
