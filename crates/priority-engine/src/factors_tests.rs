use chrono::{NaiveDate, Utc};
use screener_core::{Bar, IndicatorSnapshot, InstrumentData, ScoreBreakdown};

use crate::factors::*;
use crate::pipeline::*;
use crate::regime::Regime;

fn snapshot(close: f64, volume: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
        close,
        volume,
        ..Default::default()
    }
}

fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: Utc::now() - chrono::Duration::days((closes.len() - i) as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000_000.0,
        })
        .collect()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

// -- Momentum ----------------------------------------------------------------

#[test]
fn ma_alignment_counts_each_average_plus_stack_bonus() {
    let mut snap = snapshot(100.0, 1_000_000.0);
    snap.ma_20 = Some(98.0);
    snap.ma_50 = Some(95.0);
    snap.ma_200 = Some(90.0);

    // 3 alignment points + 1 stacking bonus, no MACD, neutral ADX
    let m = momentum_score(&snap, None);
    assert_close(m.value, 4.0);
}

#[test]
fn macd_golden_cross_needs_prior_histogram_flip() {
    let mut snap = snapshot(100.0, 1_000_000.0);
    snap.macd_hist = Some(0.4);

    let mut prev = snapshot(99.0, 1_000_000.0);
    prev.macd_hist = Some(-0.1);

    let m = momentum_score(&snap, Some(&prev));
    assert!(m.golden_cross);
    assert_close(m.macd_points, 2.5);

    // Without a previous snapshot the same histogram is just "positive".
    let m = momentum_score(&snap, None);
    assert!(!m.golden_cross);
    assert_close(m.macd_points, 1.5);
}

#[test]
fn macd_positive_and_accelerating_outranks_simple_positive() {
    let mut snap = snapshot(100.0, 1_000_000.0);
    snap.macd_hist = Some(0.6);

    let mut prev = snapshot(99.0, 1_000_000.0);
    prev.macd_hist = Some(0.4);
    assert_close(momentum_score(&snap, Some(&prev)).macd_points, 2.0);

    prev.macd_hist = Some(0.8);
    assert_close(momentum_score(&snap, Some(&prev)).macd_points, 1.5);

    snap.macd_hist = Some(-0.2);
    assert_close(momentum_score(&snap, Some(&prev)).macd_points, 0.0);
}

#[test]
fn adx_multiplier_scales_alignment_and_macd_only() {
    let mut snap = snapshot(100.0, 1_000_000.0);
    snap.ma_20 = Some(98.0);
    snap.macd_hist = Some(0.4);
    snap.rsi_14 = Some(58.0);

    let mut prev = snapshot(99.0, 1_000_000.0);
    prev.macd_hist = Some(-0.1);

    // (1 + 2.5) * mult + 1.5, with the RSI zone bonus never scaled.
    snap.adx_14 = Some(32.0);
    assert_close(momentum_score(&snap, Some(&prev)).value, 3.5 * 1.3 + 1.5);

    snap.adx_14 = Some(28.0);
    assert_close(momentum_score(&snap, Some(&prev)).value, 3.5 * 1.15 + 1.5);

    snap.adx_14 = Some(22.0);
    assert_close(momentum_score(&snap, Some(&prev)).value, 3.5 + 1.5);

    snap.adx_14 = Some(18.0);
    assert_close(momentum_score(&snap, Some(&prev)).value, 3.5 * 0.7 + 1.5);
}

#[test]
fn rsi_zone_bonus_is_inclusive_at_both_edges() {
    let mut snap = snapshot(100.0, 1_000_000.0);

    snap.rsi_14 = Some(50.0);
    assert_close(momentum_score(&snap, None).value, 1.5);

    snap.rsi_14 = Some(65.0);
    assert_close(momentum_score(&snap, None).value, 1.5);

    snap.rsi_14 = Some(49.9);
    assert_close(momentum_score(&snap, None).value, 0.0);

    snap.rsi_14 = Some(65.1);
    assert_close(momentum_score(&snap, None).value, 0.0);
}

#[test]
fn momentum_stays_within_theoretical_range() {
    // Best case: full alignment, golden cross, strongest ADX, zone bonus.
    let mut snap = snapshot(100.0, 1_000_000.0);
    snap.ma_20 = Some(98.0);
    snap.ma_50 = Some(95.0);
    snap.ma_200 = Some(90.0);
    snap.macd_hist = Some(0.4);
    snap.adx_14 = Some(35.0);
    snap.rsi_14 = Some(58.0);

    let mut prev = snapshot(99.0, 1_000_000.0);
    prev.macd_hist = Some(-0.1);

    let m = momentum_score(&snap, Some(&prev));
    assert_close(m.value, 6.5 * 1.3 + 1.5);
    assert!(m.value <= 10.6);
    assert!(momentum_score(&snapshot(100.0, 1.0), None).value >= 0.0);
}

// -- Reversion ---------------------------------------------------------------

#[test]
fn rsi_oversold_tiers() {
    let mut snap = snapshot(100.0, 1_000_000.0);
    for (rsi, expected) in [(24.0, 3.0), (29.0, 2.5), (34.0, 1.5), (39.0, 0.5), (45.0, 0.0)] {
        snap.rsi_14 = Some(rsi);
        assert_close(reversion_score(&snap, None), expected);
    }
}

#[test]
fn stoch_rsi_oversold_and_cross() {
    let mut snap = snapshot(100.0, 1_000_000.0);
    snap.stoch_rsi_k = Some(0.15);
    snap.stoch_rsi_d = Some(0.10);

    // In the zone but no previous snapshot: zone point only.
    assert_close(reversion_score(&snap, None), 1.0);

    // K crossing above D from below, still inside the zone.
    let mut prev = snapshot(99.0, 1_000_000.0);
    prev.stoch_rsi_k = Some(0.08);
    prev.stoch_rsi_d = Some(0.12);
    assert_close(reversion_score(&snap, Some(&prev)), 2.0);

    // Outside the zone nothing counts.
    snap.stoch_rsi_k = Some(0.25);
    assert_close(reversion_score(&snap, Some(&prev)), 0.0);
}

#[test]
fn bollinger_position_tiers() {
    let mut snap = snapshot(0.0, 1_000_000.0);
    snap.bb_upper = Some(110.0);
    snap.bb_lower = Some(90.0);

    for (close, expected) in [(91.0, 2.5), (93.0, 2.0), (95.0, 1.0), (101.0, 0.0)] {
        snap.close = close;
        assert_close(reversion_score(&snap, None), expected);
    }
}

#[test]
fn bollinger_squeeze_requires_prior_width() {
    let mut snap = snapshot(100.0, 1_000_000.0);
    snap.bb_upper = Some(101.5);
    snap.bb_middle = Some(100.0);
    snap.bb_lower = Some(98.5);
    // width = 3/100 = 0.03; position 50% contributes nothing.

    // No previous band data: no squeeze bonus at all.
    assert_close(reversion_score(&snap, None), 0.0);

    let mut prev = snapshot(100.0, 1_000_000.0);
    prev.bb_upper = Some(102.5);
    prev.bb_middle = Some(100.0);
    prev.bb_lower = Some(97.5);
    assert_close(reversion_score(&snap, Some(&prev)), 1.5);

    // Widening bands below 6% still earn the smaller bonus.
    prev.bb_upper = Some(101.0);
    prev.bb_lower = Some(99.0);
    assert_close(reversion_score(&snap, Some(&prev)), 0.5);
}

#[test]
fn reversion_maximum_is_nine() {
    let mut snap = snapshot(90.5, 1_000_000.0);
    snap.rsi_14 = Some(20.0);
    snap.stoch_rsi_k = Some(0.15);
    snap.stoch_rsi_d = Some(0.10);
    snap.bb_upper = Some(110.0);
    snap.bb_middle = Some(100.0);
    snap.bb_lower = Some(90.0);

    let mut prev = snapshot(91.0, 1_000_000.0);
    prev.stoch_rsi_k = Some(0.08);
    prev.stoch_rsi_d = Some(0.12);
    prev.bb_upper = Some(110.0);
    prev.bb_middle = Some(100.0);
    prev.bb_lower = Some(90.0);

    // 3.0 + 2.0 + 2.5 and no squeeze (width 0.2): 7.5
    assert_close(reversion_score(&snap, Some(&prev)), 7.5);

    // Tighten the bands around the close to stack the squeeze on top.
    snap.bb_upper = Some(100.0);
    snap.bb_middle = Some(98.5);
    snap.bb_lower = Some(97.0);
    snap.close = 97.1;
    prev.bb_upper = Some(104.0);
    prev.bb_middle = Some(98.5);
    prev.bb_lower = Some(93.0);
    let score = reversion_score(&snap, Some(&prev));
    assert_close(score, 3.0 + 2.0 + 2.5 + 1.5);
    assert!(score <= 9.0);
}

// -- Adjustments & penalties -------------------------------------------------

#[test]
fn volume_multiplier_tiers() {
    let mut snap = snapshot(100.0, 0.0);
    snap.volume_ma_20 = Some(1_000_000.0);

    for (volume, expected) in [
        (2_500_000.0, 1.4),
        (1_500_000.0, 1.2),
        (1_000_000.0, 1.0),
        (600_000.0, 0.8),
        (300_000.0, 0.6),
    ] {
        snap.volume = volume;
        assert_close(volume_multiplier(&snap), expected);
    }

    snap.volume_ma_20 = None;
    assert_close(volume_multiplier(&snap), 1.0);
}

#[test]
fn obv_bonus_divergence_cases() {
    let mut snap = snapshot(100.0, 1_000_000.0);
    let mut prev = snapshot(99.0, 1_000_000.0);
    let rising = bars_from_closes(&[97.0, 98.0, 99.0, 100.0]);
    let falling = bars_from_closes(&[103.0, 102.0, 101.0, 100.0]);

    // Bullish divergence: OBV up while price fell.
    snap.obv = Some(1_000.0);
    prev.obv = Some(900.0);
    assert_close(obv_bonus(&snap, Some(&prev), &falling), 1.5);

    // Confirming uptrend.
    assert_close(obv_bonus(&snap, Some(&prev), &rising), 0.5);

    // Bearish divergence: OBV down while price rose.
    snap.obv = Some(800.0);
    assert_close(obv_bonus(&snap, Some(&prev), &rising), -1.0);

    // Both falling: no adjustment.
    assert_close(obv_bonus(&snap, Some(&prev), &falling), 0.0);

    // Missing OBV on either side contributes nothing.
    snap.obv = None;
    assert_close(obv_bonus(&snap, Some(&prev), &rising), 0.0);
}

#[test]
fn falling_knife_tiers() {
    // Five bars, four consecutive down closes.
    assert_close(
        falling_knife_penalty(&bars_from_closes(&[104.0, 103.0, 102.0, 101.0, 100.0])),
        0.4,
    );
    // Exactly three consecutive down closes.
    assert_close(
        falling_knife_penalty(&bars_from_closes(&[100.0, 103.0, 102.0, 101.0, 100.5])),
        0.25,
    );
    // Two down days is not a knife.
    assert_close(
        falling_knife_penalty(&bars_from_closes(&[100.0, 101.0, 102.0, 101.0, 100.0])),
        0.0,
    );
    // A recovery day at the front breaks the streak.
    assert_close(
        falling_knife_penalty(&bars_from_closes(&[104.0, 103.0, 102.0, 101.0, 102.0])),
        0.0,
    );
    // Too little history to judge.
    assert_close(falling_knife_penalty(&bars_from_closes(&[102.0, 101.0, 100.0])), 0.0);
}

// -- Guard composition -------------------------------------------------------

#[test]
fn below_long_ma_halves_reversion_only() {
    let mut snap = snapshot(100.0, 1_000_000.0);
    snap.rsi_14 = Some(34.0);
    snap.ma_200 = Some(120.0);

    let data = InstrumentData {
        ticker: "TEST".to_string(),
        snapshot: snap,
        previous: None,
        recent_bars: bars_from_closes(&[99.0, 100.0]),
    };
    let breakdown = score_instrument(&data, Regime::Trending.weights());
    assert_close(breakdown.reversion, 0.75);
}

#[test]
fn overbought_guard_applies_last_to_both_sub_scores() {
    let mut snap = snapshot(100.0, 1_000_000.0);
    snap.ma_20 = Some(98.0);
    snap.ma_50 = Some(95.0);
    snap.ma_200 = Some(90.0);
    snap.rsi_14 = Some(80.0);
    snap.bb_upper = Some(120.0);
    snap.bb_lower = Some(99.0);
    // position (100-99)/21 ~= 4.8% -> reversion 2.5 before the guard

    let data = InstrumentData {
        ticker: "TEST".to_string(),
        snapshot: snap,
        previous: None,
        recent_bars: bars_from_closes(&[99.0, 100.0]),
    };
    let breakdown = score_instrument(&data, Regime::Trending.weights());
    assert_close(breakdown.momentum, 4.0 * 0.5);
    assert_close(breakdown.reversion, 2.5 * 0.2);
}

#[test]
fn bull_trap_guard_claws_back_macd_points() {
    let mut snap = snapshot(100.0, 500_000.0);
    snap.ma_20 = Some(105.0);
    snap.ma_50 = Some(110.0);
    snap.macd_hist = Some(0.2);
    snap.volume_ma_20 = Some(1_000_000.0);

    let mut prev = snapshot(99.0, 1_000_000.0);
    prev.macd_hist = Some(-0.1);

    let data = InstrumentData {
        ticker: "TEST".to_string(),
        snapshot: snap,
        previous: Some(prev),
        recent_bars: bars_from_closes(&[99.0, 100.0]),
    };
    // Golden cross on thin volume below both MAs: trap factor 0.2 + 0.3,
    // momentum 2.5 - 2.5 * 0.5 = 1.25. Volume ratio 0.5 gives x0.8.
    let breakdown = score_instrument(&data, Regime::Trending.weights());
    assert_close(breakdown.momentum, 1.25);
    assert_close(breakdown.volume_multiplier, 0.8);
}

#[test]
fn missing_indicators_contribute_zero_without_aborting() {
    let data = InstrumentData {
        ticker: "BARE".to_string(),
        snapshot: snapshot(100.0, 1_000_000.0),
        previous: None,
        recent_bars: bars_from_closes(&[99.0, 100.0]),
    };
    let breakdown = score_instrument(&data, Regime::Transitional.weights());
    assert_eq!(
        breakdown,
        ScoreBreakdown {
            momentum: 0.0,
            reversion: 0.0,
            volume_multiplier: 1.0,
            obv_bonus: 0.0,
            knife_penalty: 0.0,
            raw: 0.0,
            adjusted: 0.0,
            final_score: 0.0,
        }
    );
}

// -- Worked examples ---------------------------------------------------------

#[test]
fn aligned_golden_cross_candidate_scores_high() {
    let mut snap = snapshot(100.0, 1_500_000.0);
    snap.ma_20 = Some(98.0);
    snap.ma_50 = Some(95.0);
    snap.ma_200 = Some(90.0);
    snap.macd_hist = Some(0.4);
    snap.rsi_14 = Some(58.0);
    snap.adx_14 = Some(28.0);
    snap.volume_ma_20 = Some(1_000_000.0);
    snap.obv = Some(1_000.0);

    let mut prev = snapshot(99.0, 1_000_000.0);
    prev.macd_hist = Some(-0.1);
    prev.obv = Some(900.0);

    let data = InstrumentData {
        ticker: "X".to_string(),
        snapshot: snap,
        previous: Some(prev),
        recent_bars: bars_from_closes(&[97.0, 98.0, 99.0, 100.0]),
    };

    let breakdown = score_instrument(&data, Regime::Trending.weights());
    assert_close(breakdown.momentum, (4.0 + 2.5) * 1.15 + 1.5);
    assert_close(breakdown.reversion, 0.0);
    assert_close(breakdown.raw, 0.70 * 8.975);
    assert_close(breakdown.volume_multiplier, 1.2);
    assert_close(breakdown.obv_bonus, 0.5);
    assert_close(breakdown.adjusted, 0.70 * 8.975 * 1.2 + 0.5);
    assert_close(breakdown.knife_penalty, 0.0);
    assert_close(breakdown.final_score, 8.039);
    assert!(breakdown.final_score > 0.5);
}

#[test]
fn weak_trend_bearish_divergence_candidate_barely_survives() {
    let mut snap = snapshot(100.0, 600_000.0);
    snap.ma_20 = Some(98.0);
    snap.ma_50 = Some(102.0);
    snap.ma_200 = Some(95.0);
    snap.macd_hist = Some(0.3);
    snap.rsi_14 = Some(33.0);
    snap.adx_14 = Some(18.0);
    snap.volume_ma_20 = Some(1_000_000.0);
    snap.obv = Some(900.0);

    let mut prev = snapshot(99.0, 1_000_000.0);
    prev.macd_hist = Some(0.5);
    prev.obv = Some(1_000.0);

    let data = InstrumentData {
        ticker: "Y".to_string(),
        snapshot: snap,
        previous: Some(prev),
        recent_bars: bars_from_closes(&[97.0, 98.0, 99.0, 100.0]),
    };

    let breakdown = score_instrument(&data, Regime::Transitional.weights());
    assert_close(breakdown.momentum, (2.0 + 1.5) * 0.7);
    assert_close(breakdown.reversion, 1.5);
    assert_close(breakdown.raw, 0.45 * 2.45 + 0.55 * 1.5);
    assert_close(breakdown.volume_multiplier, 0.8);
    assert_close(breakdown.obv_bonus, -1.0);
    assert_close(breakdown.final_score, 1.9275 * 0.8 - 1.0);
    assert!(breakdown.final_score > 0.5);
}
