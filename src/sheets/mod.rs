use crate::error::AppError;
use crate::models::{Row, TabOutcome};
use async_trait::async_trait;
use tracing::{debug, info};

pub mod auth;
pub mod google;

pub const USAGE_TAB: &str = "usage";
pub const COST_TAB: &str = "cost";

const PREVIEW_ROWS: usize = 3;

/// Minimal spreadsheet surface the sync needs. Implementations talk to one
/// spreadsheet chosen at construction time.
#[async_trait]
pub trait SheetService: Send + Sync {
    /// Titles of all tabs. Fails when the spreadsheet cannot be opened.
    async fn tab_titles(&self) -> Result<Vec<String>, AppError>;

    async fn add_tab(&self, title: &str) -> Result<(), AppError>;

    async fn write_header(&self, title: &str, header: &[&str]) -> Result<(), AppError>;

    /// Appends all rows below existing content in one call.
    async fn append_rows(&self, title: &str, rows: &[Row]) -> Result<(), AppError>;
}

pub struct SheetWriter<'a> {
    sheet: &'a dyn SheetService,
    dry_run: bool,
    existing_tabs: Vec<String>,
}

impl<'a> SheetWriter<'a> {
    /// Resolves the spreadsheet and records which tabs already exist.
    pub async fn open(sheet: &'a dyn SheetService, dry_run: bool) -> Result<Self, AppError> {
        let existing_tabs = sheet.tab_titles().await?;
        debug!(tabs = ?existing_tabs, "opened spreadsheet");
        Ok(Self {
            sheet,
            dry_run,
            existing_tabs,
        })
    }

    fn has_tab(&self, tab: &str) -> bool {
        self.existing_tabs.iter().any(|t| t == tab)
    }

    pub async fn write_tab(
        &self,
        tab: &str,
        header: &[&str],
        rows: &[Row],
    ) -> Result<TabOutcome, AppError> {
        let missing = !self.has_tab(tab);
        let outcome = TabOutcome {
            tab: tab.to_string(),
            created: missing,
            rows: rows.len(),
        };

        if self.dry_run {
            if missing {
                info!(tab, "dry-run: tab is missing and would be created with a header row");
            }
            for row in rows.iter().take(PREVIEW_ROWS) {
                let preview = serde_json::to_string(row)?;
                info!(tab, row = %preview, "dry-run: preview");
            }
            info!(tab, rows = rows.len(), "dry-run: skipping append");
            return Ok(outcome);
        }

        // Existing tabs are assumed to carry the header already.
        if missing {
            self.sheet.add_tab(tab).await?;
            self.sheet.write_header(tab, header).await?;
            info!(tab, "created tab with header row");
        }

        if rows.is_empty() {
            debug!(tab, "no rows to append");
        } else {
            self.sheet.append_rows(tab, rows).await?;
            info!(tab, rows = rows.len(), "appended rows");
        }

        Ok(outcome)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeSheet, SheetCall};
    use super::*;
    use crate::models::UsageRecord;
    use serde_json::json;

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| vec![json!(format!("row-{i}"))]).collect()
    }

    #[tokio::test]
    async fn missing_tab_is_created_with_header_before_rows() {
        let sheet = FakeSheet::with_tabs(&[]);
        let writer = SheetWriter::open(&sheet, false).await.expect("open");

        let outcome = writer
            .write_tab(USAGE_TAB, &UsageRecord::HEADER, &rows(2))
            .await
            .expect("write");
        assert!(outcome.created);
        assert_eq!(outcome.rows, 2);

        assert_eq!(
            sheet.calls(),
            vec![
                SheetCall::TabTitles,
                SheetCall::AddTab("usage".into()),
                SheetCall::WriteHeader("usage".into()),
                SheetCall::AppendRows("usage".into(), 2),
            ]
        );
        let stored = sheet.rows(USAGE_TAB);
        assert_eq!(
            stored[0],
            vec![
                json!("timestamp"),
                json!("workspace_id"),
                json!("model"),
                json!("input_tokens"),
                json!("output_tokens"),
                json!("cost_usd"),
                json!("raw_json"),
            ]
        );
        assert_eq!(stored[1], vec![json!("row-0")]);
    }

    #[tokio::test]
    async fn existing_tab_header_is_not_rewritten() {
        let sheet = FakeSheet::with_tabs(&[USAGE_TAB]);
        let writer = SheetWriter::open(&sheet, false).await.expect("open");

        let outcome = writer
            .write_tab(USAGE_TAB, &UsageRecord::HEADER, &rows(3))
            .await
            .expect("write");
        assert!(!outcome.created);
        assert_eq!(
            sheet.calls(),
            vec![SheetCall::TabTitles, SheetCall::AppendRows("usage".into(), 3)]
        );
    }

    #[tokio::test]
    async fn empty_batch_skips_append_call() {
        let sheet = FakeSheet::with_tabs(&[COST_TAB]);
        let writer = SheetWriter::open(&sheet, false).await.expect("open");

        let outcome = writer
            .write_tab(COST_TAB, &["a"], &[])
            .await
            .expect("write");
        assert_eq!(outcome.rows, 0);
        assert_eq!(sheet.write_calls(), 0);
    }

    #[tokio::test]
    async fn dry_run_reports_counts_without_writing() {
        let sheet = FakeSheet::with_tabs(&[]);
        let writer = SheetWriter::open(&sheet, true).await.expect("open");

        let outcome = writer
            .write_tab(USAGE_TAB, &UsageRecord::HEADER, &rows(5))
            .await
            .expect("write");
        assert!(outcome.created);
        assert_eq!(outcome.rows, 5);
        assert_eq!(sheet.calls(), vec![SheetCall::TabTitles]);
        assert!(sheet.rows(USAGE_TAB).is_empty());
    }
}
