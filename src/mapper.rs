use crate::models::{CostRecord, ReportEntry, UsageRecord};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

const USAGE_COLLECTION_KEYS: [&str; 2] = ["usage", "data"];
const COST_COLLECTION_KEYS: [&str; 2] = ["costs", "data"];

pub fn usage_entries(payload: &Value) -> Vec<ReportEntry> {
    collect_entries(payload, &USAGE_COLLECTION_KEYS)
}

pub fn cost_entries(payload: &Value) -> Vec<ReportEntry> {
    collect_entries(payload, &COST_COLLECTION_KEYS)
}

/// Picks the first non-empty entry array and flattens time buckets
/// (`{"starting_at": .., "results": [..]}`) into their results.
fn collect_entries(payload: &Value, keys: &[&str]) -> Vec<ReportEntry> {
    let items = match payload.as_array() {
        Some(items) => items.as_slice(),
        None => keys
            .iter()
            .filter_map(|key| payload.get(*key).and_then(Value::as_array))
            .find(|items| !items.is_empty())
            .map(Vec::as_slice)
            .unwrap_or_default(),
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item.get("results").and_then(Value::as_array) {
            Some(results) => {
                let bucket_start = item
                    .get("starting_at")
                    .and_then(Value::as_str)
                    .and_then(parse_rfc3339);
                out.extend(results.iter().map(|result| ReportEntry {
                    item: result.clone(),
                    bucket_start,
                }));
            }
            None => out.push(ReportEntry::new(item.clone())),
        }
    }
    out
}

pub fn map_usage(entries: &[ReportEntry], run_at: DateTime<Utc>) -> Vec<UsageRecord> {
    entries
        .iter()
        .map(|entry| {
            let item = &entry.item;
            UsageRecord {
                timestamp: run_at,
                workspace_id: text(item, &["workspace_id", "workspaceId"]),
                model: text(item, &["model"]),
                input_tokens: count(
                    item,
                    &["input_tokens", "inputTokens", "uncached_input_tokens"],
                ),
                output_tokens: count(item, &["output_tokens", "outputTokens"]),
                cost_usd: decimal(item, &["cost_usd", "costUsd"]),
                raw_json: item.to_string(),
            }
        })
        .collect()
}

pub fn map_cost(entries: &[ReportEntry], run_at: DateTime<Utc>) -> Vec<CostRecord> {
    entries
        .iter()
        .map(|entry| {
            let item = &entry.item;
            CostRecord {
                timestamp: run_at,
                workspace_id: text(item, &["workspace_id", "workspaceId"]),
                model: text(item, &["model"]),
                date: entry_date(item).or_else(|| entry.bucket_start.map(|ts| ts.date_naive())),
                cost_usd: decimal(item, &["cost_usd", "costUsd"]).or_else(|| amount_usd(item)),
                usage_type: text(item, &["usage_type", "usageType", "cost_type"]),
                raw_json: item.to_string(),
            }
        })
        .collect()
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn count(item: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn decimal(item: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// `amount` is reported in cents; only USD amounts are converted.
fn amount_usd(item: &Value) -> Option<f64> {
    if let Some(currency) = item.get("currency").and_then(Value::as_str) {
        if !currency.eq_ignore_ascii_case("USD") {
            return None;
        }
    }
    decimal(item, &["amount"]).map(|cents| cents / 100.0)
}

fn entry_date(item: &Value) -> Option<NaiveDate> {
    let raw = item.get("date").and_then(Value::as_str)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_rfc3339(raw).map(|ts| ts.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn run_at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0)
            .single()
            .expect("valid fixed timestamp")
    }

    #[test]
    fn usage_entries_reads_usage_then_data() {
        let payload = json!({ "usage": [], "data": [{ "model": "a" }, { "model": "b" }] });
        assert_eq!(usage_entries(&payload).len(), 2);

        let payload = json!({ "usage": [{ "model": "a" }], "data": [{ "model": "b" }] });
        let entries = usage_entries(&payload);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].item["model"], "a");
    }

    #[test]
    fn entries_are_empty_for_missing_or_empty_collections() {
        assert!(usage_entries(&json!({})).is_empty());
        assert!(cost_entries(&json!({ "data": [] })).is_empty());
        assert!(cost_entries(&json!({ "data": null })).is_empty());
    }

    #[test]
    fn bucketed_reports_flatten_results_and_keep_bucket_start() {
        let payload = json!({
            "data": [
                {
                    "starting_at": "2024-03-01T00:00:00Z",
                    "ending_at": "2024-03-02T00:00:00Z",
                    "results": [{ "amount": "150" }, { "amount": "50" }]
                },
                {
                    "starting_at": "2024-03-02T00:00:00Z",
                    "ending_at": "2024-03-03T00:00:00Z",
                    "results": []
                }
            ],
            "has_more": false
        });
        let entries = cost_entries(&payload);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].item, json!({ "amount": "150" }));

        let rows = map_cost(&entries, run_at());
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(rows[0].cost_usd, Some(1.5));
        assert_eq!(rows[1].cost_usd, Some(0.5));
    }

    #[test]
    fn map_usage_extracts_typed_fields() {
        let entries = usage_entries(&json!({
            "data": [{
                "workspace_id": "wrkspc_1",
                "model": "claude-sonnet-4",
                "input_tokens": 1200,
                "output_tokens": 300,
                "cost_usd": 0.42
            }]
        }));
        let rows = map_usage(&entries, run_at());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.timestamp, run_at());
        assert_eq!(row.workspace_id.as_deref(), Some("wrkspc_1"));
        assert_eq!(row.model.as_deref(), Some("claude-sonnet-4"));
        assert_eq!(row.input_tokens, Some(1200));
        assert_eq!(row.output_tokens, Some(300));
        assert_eq!(row.cost_usd, Some(0.42));
        assert!(row.missing_fields().is_empty());
    }

    #[test]
    fn map_usage_accepts_camel_case_and_uncached_aliases() {
        let entries = vec![
            ReportEntry::new(json!({ "workspaceId": "w", "inputTokens": 5, "outputTokens": "7", "costUsd": "1.25" })),
            ReportEntry::new(json!({ "uncached_input_tokens": 9 })),
        ];
        let rows = map_usage(&entries, run_at());
        assert_eq!(rows[0].workspace_id.as_deref(), Some("w"));
        assert_eq!(rows[0].input_tokens, Some(5));
        assert_eq!(rows[0].output_tokens, Some(7));
        assert_eq!(rows[0].cost_usd, Some(1.25));
        assert_eq!(rows[1].input_tokens, Some(9));
    }

    #[test]
    fn missing_fields_produce_rows_with_empty_values() {
        let entries = vec![ReportEntry::new(json!({ "unexpected": true }))];
        let rows = map_usage(&entries, run_at());
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].missing_fields(),
            vec!["workspace_id", "model", "input_tokens", "output_tokens", "cost_usd"]
        );
        assert_eq!(rows[0].to_row()[1], json!(""));
    }

    #[test]
    fn raw_json_round_trips_to_original_entry() {
        let original = json!({
            "workspace_id": null,
            "model": "claude-haiku",
            "nested": { "cache_creation": { "ephemeral_5m_input_tokens": 3 } },
            "list": [1, 2.5, "x"]
        });
        let entries = vec![ReportEntry::new(original.clone())];

        let usage = map_usage(&entries, run_at());
        let parsed: Value = serde_json::from_str(&usage[0].raw_json).expect("raw_json parses");
        assert_eq!(parsed, original);

        let cost = map_cost(&entries, run_at());
        let parsed: Value = serde_json::from_str(&cost[0].raw_json).expect("raw_json parses");
        assert_eq!(parsed, original);
    }

    #[test]
    fn null_workspace_is_treated_as_missing() {
        let entries = vec![ReportEntry::new(json!({ "workspace_id": null, "model": "m" }))];
        let rows = map_usage(&entries, run_at());
        assert!(rows[0].workspace_id.is_none());
    }

    #[test]
    fn map_cost_prefers_explicit_fields() {
        let entries = vec![ReportEntry {
            item: json!({
                "workspace_id": "w",
                "model": "claude-opus-4",
                "date": "2024-05-06",
                "cost_usd": 3.5,
                "amount": "999",
                "usage_type": "tokens",
                "cost_type": "web_search"
            }),
            bucket_start: parse_rfc3339("2024-01-01T00:00:00Z"),
        }];
        let rows = map_cost(&entries, run_at());
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 5, 6));
        assert_eq!(rows[0].cost_usd, Some(3.5));
        assert_eq!(rows[0].usage_type.as_deref(), Some("tokens"));
    }

    #[test]
    fn map_cost_falls_back_to_cost_type_and_rfc3339_date() {
        let entries = vec![ReportEntry::new(json!({
            "date": "2024-05-06T12:00:00Z",
            "cost_type": "web_search"
        }))];
        let rows = map_cost(&entries, run_at());
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 5, 6));
        assert_eq!(rows[0].usage_type.as_deref(), Some("web_search"));
        assert!(rows[0].cost_usd.is_none());
    }

    #[test]
    fn amount_in_other_currency_is_not_reported_as_usd() {
        let entries = vec![ReportEntry::new(json!({ "amount": "100", "currency": "EUR" }))];
        let rows = map_cost(&entries, run_at());
        assert!(rows[0].cost_usd.is_none());
    }
}
