use std::cmp::Ordering;

use thiserror::Error;
use tracing::debug;

use crate::fetcher::{QuerySession, RawRows, ScreenerService, Token};
use crate::types::{value_as_f64, Row, ScanDefinition, ScanOutcome, ScanRows, SortPolicy};

/// Source field holding the percent change.
const PERCENT_CHANGE_FIELD: &str = "per_chg";
/// Source field holding the last traded price.
const LAST_PRICE_FIELD: &str = "close";

/// A single row the scorer could not use. Drops the row, never the scan.
#[derive(Debug, Error, PartialEq)]
pub enum RowParseError {
    #[error("row is not an object")]
    NotAnObject,
    #[error("field {0} missing or not numeric")]
    BadField(&'static str),
    #[error("score is not finite")]
    NonFiniteScore,
}

/// Execute one scan and score its rows.
pub async fn run_scan<S: ScreenerService>(
    def: &ScanDefinition,
    session: &QuerySession<S>,
    token: &Token,
) -> ScanOutcome {
    let raw = session.execute(&def.query, token).await?;
    Ok(score_rows(def, raw))
}

/// Parse, score, rank and cap a raw row set.
pub fn score_rows(def: &ScanDefinition, raw: RawRows) -> ScanRows {
    let total = raw.len();
    let mut rows = Vec::with_capacity(total);
    let mut dropped_rows = 0usize;

    for value in raw {
        match parse_row(value) {
            Ok(row) => rows.push(row),
            Err(e) => {
                dropped_rows += 1;
                debug!(scan = %def.name, "Dropping row: {e}");
            }
        }
    }

    rank(&mut rows, def.sort_policy);
    rows.truncate(def.cap);

    if dropped_rows > 0 {
        debug!(
            scan = %def.name,
            total,
            dropped = dropped_rows,
            "{}: dropped {dropped_rows}/{total} malformed rows",
            def.name,
        );
    }

    ScanRows { rows, dropped_rows }
}

fn parse_row(value: serde_json::Value) -> Result<Row, RowParseError> {
    let serde_json::Value::Object(fields) = value else {
        return Err(RowParseError::NotAnObject);
    };

    let percent_change = fields
        .get(PERCENT_CHANGE_FIELD)
        .and_then(value_as_f64)
        .ok_or(RowParseError::BadField(PERCENT_CHANGE_FIELD))?;
    let last_price = fields
        .get(LAST_PRICE_FIELD)
        .and_then(value_as_f64)
        .ok_or(RowParseError::BadField(LAST_PRICE_FIELD))?;

    let potential_score = percent_change * last_price;
    if !potential_score.is_finite() {
        return Err(RowParseError::NonFiniteScore);
    }

    Ok(Row { fields, percent_change, potential_score })
}

/// Stable sort by `potential_score`; ties keep response order.
pub fn rank(rows: &mut [Row], policy: SortPolicy) {
    rows.sort_by(|a, b| compare_scores(a.potential_score, b.potential_score, policy));
}

/// Ordering of two scores under `policy`.
pub fn compare_scores(a: f64, b: f64, policy: SortPolicy) -> Ordering {
    let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    match policy {
        SortPolicy::ScoreDesc => ord.reverse(),
        SortPolicy::ScoreAsc => ord,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(symbol: &str, per_chg: f64, close: f64) -> serde_json::Value {
        json!({ "nsecode": symbol, "per_chg": per_chg.to_string(), "close": close })
    }

    fn symbols(rows: &[Row]) -> Vec<&str> {
        rows.iter().filter_map(Row::symbol).collect()
    }

    #[test]
    fn desc_cap_keeps_tied_rows_in_response_order() {
        let def = ScanDefinition { cap: 2, ..ScanDefinition::new("X", "q", SortPolicy::ScoreDesc) };
        // scores 5, 20, 20
        let out = score_rows(&def, vec![raw("A", 5.0, 1.0), raw("B", 2.0, 10.0), raw("C", 4.0, 5.0)]);

        assert_eq!(symbols(&out.rows), vec!["B", "C"]);
        assert!(out.rows.iter().all(|r| r.potential_score == 20.0));
        assert_eq!(out.dropped_rows, 0);
    }

    #[test]
    fn asc_policy_ranks_negative_movers_first() {
        let def = ScanDefinition::new("SELL", "q", SortPolicy::ScoreAsc);
        let out = score_rows(
            &def,
            vec![raw("A", -1.0, 100.0), raw("B", -3.0, 100.0), raw("C", 0.5, 100.0)],
        );
        assert_eq!(symbols(&out.rows), vec!["B", "A", "C"]);
        assert!(out.rows.windows(2).all(|w| w[0].potential_score <= w[1].potential_score));
    }

    #[test]
    fn truncates_to_cap() {
        let def = ScanDefinition { cap: 3, ..ScanDefinition::new("X", "q", SortPolicy::ScoreDesc) };
        let raw_rows = (0..25).map(|i| raw(&format!("S{i}"), i as f64, 10.0)).collect();
        let out = score_rows(&def, raw_rows);
        assert_eq!(out.rows.len(), 3);
        assert!(out.rows.windows(2).all(|w| w[0].potential_score >= w[1].potential_score));
        assert_eq!(out.rows[0].symbol(), Some("S24"));
    }

    #[test]
    fn malformed_rows_are_dropped_and_counted() {
        let def = ScanDefinition::new("X", "q", SortPolicy::ScoreDesc);
        let out = score_rows(
            &def,
            vec![
                raw("A", 1.0, 10.0),
                json!({ "nsecode": "B", "per_chg": "n/a", "close": 10 }),
                json!({ "nsecode": "C", "per_chg": 2 }),
                json!("not a row"),
            ],
        );
        assert_eq!(symbols(&out.rows), vec!["A"]);
        assert_eq!(out.dropped_rows, 3);
    }

    #[test]
    fn empty_response_is_ok_and_empty() {
        let def = ScanDefinition::new("X", "q", SortPolicy::ScoreDesc);
        let out = score_rows(&def, Vec::new());
        assert!(out.rows.is_empty());
        assert_eq!(out.dropped_rows, 0);
    }

    #[test]
    fn ranking_sorted_rows_again_is_stable() {
        let def = ScanDefinition::new("X", "q", SortPolicy::ScoreDesc);
        let out = score_rows(
            &def,
            vec![raw("A", 1.0, 10.0), raw("B", 1.0, 10.0), raw("C", 3.0, 10.0), raw("D", 1.0, 10.0)],
        );
        let mut again = out.rows.clone();
        rank(&mut again, def.sort_policy);
        assert_eq!(again, out.rows);
        assert_eq!(symbols(&again), vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn derived_fields_are_computed() {
        let def = ScanDefinition::new("X", "q", SortPolicy::ScoreDesc);
        let out = score_rows(&def, vec![json!({ "nsecode": "A", "per_chg": "2.5", "close": "40" })]);
        let row = &out.rows[0];
        assert_eq!(row.percent_change, 2.5);
        assert_eq!(row.potential_score, 100.0);
        assert_eq!(row.last_price(), Some(40.0));
    }
}
