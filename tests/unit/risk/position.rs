//! Position sizing tests

use crate::mock_port::{eurusd_spec, MockMarketData};
use pipsentry::config::MonitorConfig;
use pipsentry::models::InstrumentSpec;
use pipsentry::risk::{clamp_lots, size_position, SizedPosition};

fn config() -> MonitorConfig {
    MonitorConfig::default()
}

#[tokio::test]
async fn direct_quote_pair_sizes_one_lot() {
    // $100k account, 0.5% risk, 50 point stop, $10/point/lot:
    // risk = $500, raw lots = 500 / (50 * 10) = 1.0
    let port = MockMarketData::new();
    let sized = size_position(
        &port,
        &config(),
        &eurusd_spec(),
        "EURUSD",
        0.0050,
        0.5,
        100_000.0,
    )
    .await;

    assert_eq!(sized.stop_points, 50);
    assert_eq!(sized.risk_amount, 500.0);
    assert_eq!(sized.lots, 1.0);
}

#[tokio::test]
async fn sizing_is_idempotent() {
    let port = MockMarketData::new();
    let first = size_position(
        &port,
        &config(),
        &eurusd_spec(),
        "EURUSD",
        0.0050,
        0.5,
        100_000.0,
    )
    .await;
    let second = size_position(
        &port,
        &config(),
        &eurusd_spec(),
        "EURUSD",
        0.0050,
        0.5,
        100_000.0,
    )
    .await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn zero_stop_distance_returns_zero_tuple() {
    let port = MockMarketData::new();
    let sized = size_position(
        &port,
        &config(),
        &eurusd_spec(),
        "EURUSD",
        0.0,
        0.5,
        100_000.0,
    )
    .await;
    assert_eq!(sized, SizedPosition::zero());

    let negative = size_position(
        &port,
        &config(),
        &eurusd_spec(),
        "EURUSD",
        -0.0010,
        0.5,
        100_000.0,
    )
    .await;
    assert_eq!(negative, SizedPosition::zero());
}

#[tokio::test]
async fn invalid_spec_returns_zero_tuple() {
    let port = MockMarketData::new();
    let mut spec = eurusd_spec();
    spec.point = 0.0;
    let sized = size_position(&port, &config(), &spec, "EURUSD", 0.0050, 0.5, 100_000.0).await;
    assert_eq!(sized, SizedPosition::zero());
}

#[tokio::test]
async fn lots_stay_inside_volume_bounds() {
    let port = MockMarketData::new();

    // Tiny risk floors below a step and clamps up to the minimum
    let tiny = size_position(
        &port,
        &config(),
        &eurusd_spec(),
        "EURUSD",
        0.0050,
        0.001,
        10_000.0,
    )
    .await;
    assert_eq!(tiny.lots, eurusd_spec().volume_min);

    // Outsized risk clamps down to the maximum
    let huge = size_position(
        &port,
        &config(),
        &eurusd_spec(),
        "EURUSD",
        0.0001,
        5.0,
        100_000_000.0,
    )
    .await;
    assert_eq!(huge.lots, eurusd_spec().volume_max);
}

#[tokio::test]
async fn indirect_quote_divides_by_the_pair_mid() {
    let port = MockMarketData::new();
    port.set_quote("USDCHF", 0.9000, 0.9000);

    let spec = InstrumentSpec {
        base_currency: "USD".to_string(),
        profit_currency: "CHF".to_string(),
        ..eurusd_spec()
    };
    let sized = size_position(&port, &config(), &spec, "USDCHF", 0.0050, 0.5, 100_000.0).await;

    // pip value = 100000 * 0.0001 / 0.9 = 11.111...
    let expected_raw: f64 = 500.0 / (50.0 * (10.0 / 0.9));
    let expected = (expected_raw / 0.01).floor() * 0.01;
    assert!((sized.lots - expected).abs() < 1e-9);
}

#[tokio::test]
async fn cross_pair_converts_through_auxiliary_instrument() {
    let port = MockMarketData::new();
    port.set_quote("GBPUSD", 1.2500, 1.2500);

    let spec = InstrumentSpec {
        base_currency: "EUR".to_string(),
        profit_currency: "GBP".to_string(),
        ..eurusd_spec()
    };
    let sized = size_position(&port, &config(), &spec, "EURGBP", 0.0050, 0.5, 100_000.0).await;

    // pip value = 10 * 1.25 = 12.5; raw = 500 / (50 * 12.5) = 0.8
    assert!((sized.lots - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn cross_pair_falls_back_to_unconverted_estimate() {
    // No conversion instrument exists: the unconverted pip value is used
    let port = MockMarketData::new();
    let spec = InstrumentSpec {
        base_currency: "EUR".to_string(),
        profit_currency: "GBP".to_string(),
        ..eurusd_spec()
    };
    let sized = size_position(&port, &config(), &spec, "EURGBP", 0.0050, 0.5, 100_000.0).await;
    assert_eq!(sized.lots, 1.0);
}

#[tokio::test]
async fn commodity_symbol_uses_fixed_override() {
    let port = MockMarketData::new();
    let spec = InstrumentSpec {
        point: 0.01,
        digits: 2,
        contract_size: 100.0,
        base_currency: "XAU".to_string(),
        profit_currency: "USD".to_string(),
        ..eurusd_spec()
    };
    // stop distance 5.00 -> 500 points; pip value = 100 * 0.01 = 1.0
    let sized = size_position(&port, &config(), &spec, "XAUUSD", 5.0, 0.5, 100_000.0).await;
    assert_eq!(sized.stop_points, 500);
    assert_eq!(sized.lots, 1.0);
}

#[test]
fn clamp_lots_rejects_non_positive_inputs() {
    let spec = eurusd_spec();
    assert_eq!(clamp_lots(&spec, 0.0, 50, 500.0), 0.0);
    assert_eq!(clamp_lots(&spec, 10.0, 0, 500.0), 0.0);
    assert_eq!(clamp_lots(&spec, 10.0, 50, 0.0), 0.0);
}
