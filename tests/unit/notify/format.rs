//! Batch notification formatting tests

use crate::mock_port::ts;
use pipsentry::models::{PatternType, TradeSignal};
use pipsentry::notify::format::{
    consolidated_message, signal_block, signal_subject, NearbyLevel, SymbolSummary,
};

fn signal(symbol: &str, pattern: PatternType) -> TradeSignal {
    TradeSignal {
        symbol: symbol.to_string(),
        pattern,
        bar_time: ts(12, 10, 0),
        detected_at: ts(12, 10, 0),
        touched_levels: vec![
            "prev_week_low".to_string(),
            "yesterday_high".to_string(),
        ],
        price: 1.1025,
        stop_loss: 1.0950,
        position_size: 1.0,
        risk_amount: 500.0,
        consumed: false,
    }
}

#[test]
fn subject_names_the_symbol_for_a_single_signal() {
    let subject = signal_subject(&[signal("EURUSD", PatternType::Bull)]);
    assert_eq!(subject, "EURUSD: bull pattern detected");

    let subject = signal_subject(&[
        signal("EURUSD", PatternType::Bull),
        signal("GBPUSD", PatternType::Bear),
    ]);
    assert_eq!(subject, "Trade signals: 2 new");
}

#[test]
fn message_carries_both_section_headers() {
    let signals = vec![
        signal("EURUSD", PatternType::Bull),
        signal("GBPUSD", PatternType::Bear),
    ];
    let summaries = vec![
        SymbolSummary {
            symbol: "EURUSD".to_string(),
            last_signal: Some(signals[0].clone()),
            nearby_levels: Vec::new(),
        },
        SymbolSummary {
            symbol: "GBPUSD".to_string(),
            last_signal: Some(signals[1].clone()),
            nearby_levels: Vec::new(),
        },
    ];

    let body = consolidated_message(&signals, &summaries);
    assert!(body.contains("=== NEW SIGNALS (2) ==="));
    assert!(body.contains("=== SUMMARY TABLE ==="));
    assert!(body.contains("EURUSD BUY @ 1.10250"));
    assert!(body.contains("GBPUSD SELL @ 1.10250"));
}

#[test]
fn signal_block_lists_weekly_levels_first() {
    let block = signal_block(&signal("EURUSD", PatternType::Bull));
    assert!(block.contains("levels: prev_week_low, yesterday_high"));
    assert!(block.contains("stop loss: 1.09500"));
    assert!(block.contains("size: 1.00 lots"));
    assert!(block.contains("risk: $500.00"));
}

#[test]
fn summary_rows_cover_quiet_symbols() {
    let summaries = vec![SymbolSummary {
        symbol: "USDCHF".to_string(),
        last_signal: None,
        nearby_levels: vec![NearbyLevel {
            name: "daily_pivot_S1".to_string(),
            value: 0.9012,
            distance_pct: 0.0008,
        }],
    }];
    let body = consolidated_message(&[signal("EURUSD", PatternType::Bull)], &summaries);
    assert!(body.contains("USDCHF | no signal | near: daily_pivot_S1 (0.90120, 0.08%)"));
}
