use std::collections::HashSet;

use serde::Serialize;

use crate::scorer::compare_scores;
use crate::types::{ResultSnapshot, Row, Settings, SortPolicy};

/// A row lifted out of its scan for the buy/sell lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub scan: String,
    #[serde(flatten)]
    pub row: Row,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Suggestions {
    pub buy: Vec<Suggestion>,
    pub sell: Vec<Suggestion>,
}

/// Split the displayed rows of active scans into buy and sell candidates.
///
/// Rows priced above `price_ceiling` or without a symbol are skipped. Positive
/// movers are buys ranked by descending score, the rest are sells ranked
/// ascending. Each stock appears once per list at its best rank.
pub fn classify(
    snapshot: &ResultSnapshot,
    settings: &Settings,
    price_ceiling: f64,
    limit: usize,
) -> Suggestions {
    let mut buy = Vec::new();
    let mut sell = Vec::new();

    for (scan, entry) in &snapshot.scans {
        if !settings.is_active(scan) {
            continue;
        }
        for row in &entry.rows {
            if row.symbol().is_none() || row.last_price().map_or(true, |p| p > price_ceiling) {
                continue;
            }
            let suggestion = Suggestion { scan: scan.clone(), row: row.clone() };
            if row.percent_change > 0.0 {
                buy.push(suggestion);
            } else {
                sell.push(suggestion);
            }
        }
    }

    Suggestions {
        buy: finish(buy, SortPolicy::ScoreDesc, limit),
        sell: finish(sell, SortPolicy::ScoreAsc, limit),
    }
}

fn finish(mut list: Vec<Suggestion>, policy: SortPolicy, limit: usize) -> Vec<Suggestion> {
    list.sort_by(|a, b| compare_scores(a.row.potential_score, b.row.potential_score, policy));
    let mut seen = HashSet::new();
    list.retain(|s| s.row.symbol().is_some_and(|sym| seen.insert(sym.to_string())));
    list.truncate(limit);
    list
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::error::ScanError;
    use crate::types::ScanEntry;

    fn row(symbol: &str, per_chg: f64, close: f64) -> Row {
        let serde_json::Value::Object(fields) = json!({ "nsecode": symbol, "close": close }) else {
            unreachable!()
        };
        Row { fields, percent_change: per_chg, potential_score: per_chg * close }
    }

    fn settings(active: &[&str]) -> Settings {
        Settings { active_scans: active.iter().map(|s| s.to_string()).collect(), ..Settings::default() }
    }

    fn snapshot(scans: Vec<(&str, Vec<Row>, bool)>) -> ResultSnapshot {
        let scans: BTreeMap<String, ScanEntry> = scans
            .into_iter()
            .map(|(name, rows, failed)| {
                let error = failed.then(|| ScanError::transport("down"));
                (name.to_string(), ScanEntry { rows, rows_cycle: 1, error, ..Default::default() })
            })
            .collect();
        ResultSnapshot { cycle: 2, scans, ..Default::default() }
    }

    fn symbols(list: &[Suggestion]) -> Vec<&str> {
        list.iter().filter_map(|s| s.row.symbol()).collect()
    }

    #[test]
    fn partitions_by_direction_and_ranks() {
        let snap = snapshot(vec![(
            "A",
            vec![row("UP1", 1.0, 100.0), row("DN1", -2.0, 100.0), row("UP2", 3.0, 100.0), row("DN2", -1.0, 50.0)],
            false,
        )]);
        let out = classify(&snap, &settings(&["A"]), 2250.0, 20);
        assert_eq!(symbols(&out.buy), vec!["UP2", "UP1"]);
        assert_eq!(symbols(&out.sell), vec!["DN1", "DN2"]);
    }

    #[test]
    fn skips_expensive_stocks_and_inactive_scans() {
        let snap = snapshot(vec![
            ("A", vec![row("CHEAP", 1.0, 100.0), row("PRICEY", 1.0, 3000.0)], false),
            ("B", vec![row("HIDDEN", 5.0, 100.0)], false),
        ]);
        let out = classify(&snap, &settings(&["A"]), 2250.0, 20);
        assert_eq!(symbols(&out.buy), vec!["CHEAP"]);
    }

    #[test]
    fn dedupes_and_truncates() {
        let snap = snapshot(vec![
            ("A", vec![row("X", 1.0, 100.0), row("Y", 2.0, 100.0)], false),
            ("B", vec![row("X", 5.0, 100.0), row("Z", 0.5, 100.0)], true),
        ]);
        let out = classify(&snap, &settings(&["A", "B"]), 2250.0, 2);
        assert_eq!(symbols(&out.buy), vec!["X", "Y"]);
        assert_eq!(out.buy[0].scan, "B");
    }
}
