use crate::config::LOOKBACK_HOURS_VAR;
use crate::error::AppError;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Number, Value};

/// One spreadsheet row, as sent to the values API.
pub type Row = Vec<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LookbackWindow {
    /// Fails when `hours` reaches past the range chrono can represent.
    pub fn ending_at(end: DateTime<Utc>, hours: i64) -> Result<Self, AppError> {
        let start = Duration::try_hours(hours)
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "{LOOKBACK_HOURS_VAR} is too large (got {hours}); the window start is not a representable date"
                ))
            })?;
        Ok(Self { start, end })
    }

    pub fn query(&self) -> [(&'static str, String); 2] {
        [
            ("starting_at", format_timestamp(self.start)),
            ("ending_at", format_timestamp(self.end)),
        ]
    }
}

/// A single report entry plus the start of the time bucket it was nested in, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub item: Value,
    pub bucket_start: Option<DateTime<Utc>>,
}

impl ReportEntry {
    pub fn new(item: Value) -> Self {
        Self {
            item,
            bucket_start: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub workspace_id: Option<String>,
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub raw_json: String,
}

impl UsageRecord {
    pub const HEADER: [&'static str; 7] = [
        "timestamp",
        "workspace_id",
        "model",
        "input_tokens",
        "output_tokens",
        "cost_usd",
        "raw_json",
    ];

    pub fn to_row(&self) -> Row {
        vec![
            Value::String(format_timestamp(self.timestamp)),
            text_cell(self.workspace_id.as_deref()),
            text_cell(self.model.as_deref()),
            int_cell(self.input_tokens),
            int_cell(self.output_tokens),
            decimal_cell(self.cost_usd),
            Value::String(self.raw_json.clone()),
        ]
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.workspace_id.is_none() {
            missing.push("workspace_id");
        }
        if self.model.is_none() {
            missing.push("model");
        }
        if self.input_tokens.is_none() {
            missing.push("input_tokens");
        }
        if self.output_tokens.is_none() {
            missing.push("output_tokens");
        }
        if self.cost_usd.is_none() {
            missing.push("cost_usd");
        }
        missing
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostRecord {
    pub timestamp: DateTime<Utc>,
    pub workspace_id: Option<String>,
    pub model: Option<String>,
    pub date: Option<NaiveDate>,
    pub cost_usd: Option<f64>,
    pub usage_type: Option<String>,
    pub raw_json: String,
}

impl CostRecord {
    pub const HEADER: [&'static str; 7] = [
        "timestamp",
        "workspace_id",
        "model",
        "date",
        "cost_usd",
        "usage_type",
        "raw_json",
    ];

    pub fn to_row(&self) -> Row {
        vec![
            Value::String(format_timestamp(self.timestamp)),
            text_cell(self.workspace_id.as_deref()),
            text_cell(self.model.as_deref()),
            self.date
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or_else(empty_cell),
            decimal_cell(self.cost_usd),
            text_cell(self.usage_type.as_deref()),
            Value::String(self.raw_json.clone()),
        ]
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.workspace_id.is_none() {
            missing.push("workspace_id");
        }
        if self.model.is_none() {
            missing.push("model");
        }
        if self.date.is_none() {
            missing.push("date");
        }
        if self.cost_usd.is_none() {
            missing.push("cost_usd");
        }
        if self.usage_type.is_none() {
            missing.push("usage_type");
        }
        missing
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabOutcome {
    pub tab: String,
    /// Tab was absent. In dry-run it would have been created.
    pub created: bool,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_at: DateTime<Utc>,
    pub dry_run: bool,
    pub usage: TabOutcome,
    pub cost: TabOutcome,
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn empty_cell() -> Value {
    Value::String(String::new())
}

fn text_cell(value: Option<&str>) -> Value {
    value
        .map(|v| Value::String(v.to_string()))
        .unwrap_or_else(empty_cell)
}

fn int_cell(value: Option<u64>) -> Value {
    value.map(Value::from).unwrap_or_else(empty_cell)
}

fn decimal_cell(value: Option<f64>) -> Value {
    value
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(empty_cell)
}
