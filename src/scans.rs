//! Scan catalog: the fixed set of screener queries the scheduler can run.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use crate::error::{AppError, Result};
use crate::types::{ScanDefinition, SortPolicy};

const DEEPSEEK: &str = "( {57960} ( latest close > latest ema( latest close , 9 ) and latest close > latest ema( latest close , 21 ) and latest ema( latest close , 9 ) > latest ema( latest close , 21 ) and latest close > greatest( 1 day ago high, 5 ) and latest volume >= ( latest sma( latest volume , 20 ) * 1.5 ) and latest rsi( 14 ) < 70 and latest close >= 10 and latest close <= 2250 ) )";

const KHAIZER: &str = "( {57960} ( latest close > latest ema( latest close , 200 ) and latest close > latest ema( latest close , 44 ) and latest close >= latest ema( latest close , 20 ) and latest close >= latest tma( latest close , 20 ) and latest close >= latest wma( latest close , 20 ) and latest close >= latest vwap and latest close > latest open * 1.03 and latest close > latest supertrend( 10 , 1.5 ) and latest volume > 1 day ago volume * 1.5 and latest macd line( 26 , 12 , 9 ) > latest macd signal( 26 , 12 , 9 ) and latest close > 1 day ago high and latest close > latest sma( latest close , 20 ) and latest close > latest sma( latest close , 50 ) and latest close > latest sma( latest close , 200 ) and latest close >= 10 and latest close <= 2250 ) )";

const CROSSED: &str = "( {57960} ( latest open > latest ema( latest close , 21 ) and 1 day ago open <= 1 day ago ema( latest close , 21 ) and latest close > latest open * 1.025 and latest close >= 10 and latest close <= 2250 and latest close >= 1 day ago high ) )";

const BREAKOUT_15M: &str = "( {57960} ( [0] 15 minute close > [-1] 15 minute max( 20 , [0] 15 minute close ) and [0] 15 minute volume > [0] 15 minute sma( volume , 20 ) and latest close > 1 day ago high and latest close > latest ema( latest close , 21 ) and latest close > latest open * 1.025 and latest close > latest supertrend( 10 , 1.5 ) and latest close <= 2250 ) )";

const STRONG_POSITIVE: &str = "( {57960} ( latest close > 20 and latest close <= 2250 ) )";

const STRONG_NEGATIVE: &str = "( {57960} ( latest close > 20 and latest close <= 2250 and latest close < latest open and (latest open - latest close) / latest open * 100 > 1 ) )";

const HARSH_BUY: &str = "( {57960} ( [=1] 10 minute open < [=1] 10 minute close and ( {57960} ( [=1] 10 minute \"close - 1 candle ago close / 1 candle ago close * 100\" < 2 ) ) and latest close > 20 and latest close <= 2250 ) )";

const HARSH_SELL: &str = "( {57960} ( [=1] 10 minute open > [=1] 10 minute close and ( {57960} ( [=1] 10 minute \"close - 1 candle ago close / 1 candle ago close * 100\" < -2 ) ) and latest close > 20 and latest close <= 2250 ) )";

const VOLUME_SHOCKER: &str = "( {57960} ( latest volume > 1 day ago volume and 1 day ago volume > 2 days ago volume and latest close > 1 day ago close and 1 day ago close > 2 days ago close and latest volume > 1000000 and 1 day ago volume > 500000 and latest close > latest open * 1.03 and latest open > 1 day ago close ) )";

const RA_BUY: &str = "( {57960} ( [0]30 minute close * ([0]30 minute close - [-1] 30 minute close) / [-1] 30 minute close * 100 > 1500 and latest close > 20 and latest close <= 2250 ) )";

const RA_SELL: &str = "( {57960} ( [0]30 minute close * ([0]30 minute close - [-1] 30 minute close) / [-1] 30 minute close * 100 < -1500 and latest close > 20 and latest close <= 2250 ) )";

const DST_BUY: &str = "( [0]5 minute supertrend(10,1) > [0]5 minute supertrend(10,3) and [0]5 minute close > [0]5 minute supertrend(10,1) and [0]5 minute close > [0]5 minute supertrend(10,3) and latest close > 20 and latest close <= 2250 and [0]5 minute wma([0]5 minute close, 21) > [0]5 minute sma([0]5 minute close, 21) )";

const DST_SELL: &str = "( [0]5 minute supertrend(10,1) < [0]5 minute supertrend(10,3) and [0]5 minute close < [0]5 minute supertrend(10,1) and latest close > 20 and latest close <= 2250 and [0]5 minute close < [0]5 minute supertrend(10,3) and [0]5 minute wma([0]5 minute close, 21) < [0]5 minute sma([0]5 minute close, 21) )";

/// Built-in scans. Negative-movement scans rank ascending.
pub fn builtin_catalog() -> Vec<ScanDefinition> {
    use SortPolicy::{ScoreAsc, ScoreDesc};

    vec![
        ScanDefinition::new("DeepSeek", DEEPSEEK, ScoreDesc)
            .with_link("https://chartink.com/screener/deepseek"),
        ScanDefinition::new("KHAIZER", KHAIZER, ScoreDesc)
            .with_link("https://chartink.com/screener/copy-khizir"),
        ScanDefinition::new("CROSSED", CROSSED, ScoreDesc)
            .with_link("https://chartink.com/screener/crossed-92141"),
        ScanDefinition::new("15 MIN Breakout", BREAKOUT_15M, ScoreDesc)
            .with_link("https://chartink.com/screener/copy-15-minute-stock-breakouts-34515559"),
        ScanDefinition::new("STRONG STOCKS POSITIVE", STRONG_POSITIVE, ScoreDesc)
            .with_link("https://chartink.com/screener/copy-strong-stocks-22395"),
        ScanDefinition::new("STRONG STOCKS NEGATIVE", STRONG_NEGATIVE, ScoreAsc)
            .with_link("https://chartink.com/screener/strong-stocks"),
        ScanDefinition::new("HARSH BUY STOCKS", HARSH_BUY, ScoreDesc)
            .with_link("https://chartink.com/screener/harsh-645"),
        ScanDefinition::new("HARSH SELL STOCKS", HARSH_SELL, ScoreAsc)
            .with_link("https://chartink.com/screener/harsh-sell-8"),
        ScanDefinition::new("VOLUME SHOCKER", VOLUME_SHOCKER, ScoreDesc)
            .with_link("https://chartink.com/screener/p45789")
            .with_chart_link("https://chartink.com/stocks-new?symbol="),
        ScanDefinition::new("RA Inventor BUY", RA_BUY, ScoreDesc)
            .with_link("https://chartink.com/screener/ra-score"),
        ScanDefinition::new("RA Inventor SELL", RA_SELL, ScoreAsc)
            .with_link("https://chartink.com/screener/ra-score-sell"),
        ScanDefinition::new("DST BUY", DST_BUY, ScoreDesc)
            .with_link("https://chartink.com/screener/stst-81"),
        ScanDefinition::new("DST SELL", DST_SELL, ScoreAsc)
            .with_link("https://chartink.com/screener/dst-sell-4"),
    ]
}

/// Load the catalog from `path` when given, otherwise use the built-in one.
pub fn load_catalog(path: Option<&Path>) -> Result<Vec<ScanDefinition>> {
    let catalog = match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)?;
            let defs: Vec<ScanDefinition> = serde_json::from_str(&raw)?;
            info!("Loaded {} scan definitions from {}", defs.len(), p.display());
            defs
        }
        None => builtin_catalog(),
    };
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &[ScanDefinition]) -> Result<()> {
    if catalog.is_empty() {
        return Err(AppError::Catalog("scan catalog is empty".to_string()));
    }
    let mut seen = HashSet::new();
    for def in catalog {
        if def.name.trim().is_empty() {
            return Err(AppError::Catalog("scan name must not be empty".to_string()));
        }
        if def.cap == 0 {
            return Err(AppError::Catalog(format!("scan {:?} has a zero cap", def.name)));
        }
        if !seen.insert(def.name.as_str()) {
            return Err(AppError::Catalog(format!("duplicate scan name {:?}", def.name)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = builtin_catalog();
        assert!(validate_catalog(&catalog).is_ok());
        let harsh_sell = catalog.iter().find(|d| d.name == "HARSH SELL STOCKS").unwrap();
        assert_eq!(harsh_sell.sort_policy, SortPolicy::ScoreAsc);
    }

    #[test]
    fn duplicate_names_rejected() {
        let catalog = vec![
            ScanDefinition::new("A", "q1", SortPolicy::ScoreDesc),
            ScanDefinition::new("A", "q2", SortPolicy::ScoreAsc),
        ];
        assert!(matches!(validate_catalog(&catalog), Err(AppError::Catalog(_))));
    }

    #[test]
    fn catalog_file_overrides_builtin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "ONLY", "query": "( {{cash}} ( latest close > 20 ) )", "sort_policy": "score_asc", "cap": 3}}]"#
        )
        .unwrap();

        let catalog = load_catalog(Some(file.path())).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, "ONLY");
        assert_eq!(catalog[0].sort_policy, SortPolicy::ScoreAsc);
        assert_eq!(catalog[0].cap, 3);
    }
}
