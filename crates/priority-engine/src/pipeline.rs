use screener_core::{Bar, IndicatorSnapshot, InstrumentData, ScoreBreakdown};

use crate::factors::{bull_trap_factor, momentum_score, reversion_score, MomentumScore};
use crate::regime::RegimeWeights;

/// Volume multiplier from the latest-volume / 20-day-average ratio.
pub fn volume_multiplier(snapshot: &IndicatorSnapshot) -> f64 {
    let Some(vma) = snapshot.volume_ma_20.filter(|v| *v > 0.0) else {
        return 1.0;
    };
    let ratio = snapshot.volume / vma;
    if ratio > 2.0 {
        1.4
    } else if ratio > 1.3 {
        1.2
    } else if ratio < 0.5 {
        0.6
    } else if ratio < 0.8 {
        0.8
    } else {
        1.0
    }
}

/// On-balance-volume bonus: bullish divergence, trend confirmation, or
/// bearish divergence against the latest price change.
pub fn obv_bonus(
    snapshot: &IndicatorSnapshot,
    previous: Option<&IndicatorSnapshot>,
    bars: &[Bar],
) -> f64 {
    let (Some(obv), Some(prev_obv)) = (snapshot.obv, previous.and_then(|p| p.obv)) else {
        return 0.0;
    };
    let obv_change = obv - prev_obv;
    let price_change = match bars {
        [.., prior, last] => last.close - prior.close,
        _ => 0.0,
    };

    if obv_change > 0.0 && price_change <= 0.0 {
        1.5
    } else if obv_change > 0.0 && price_change > 0.0 {
        0.5
    } else if obv_change < 0.0 && price_change > 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Falling-knife penalty from consecutive down closes.
///
/// Walks newest-to-oldest over `bars` (supplied oldest-first), counting at
/// most four steps and stopping at the first non-down day.
pub fn falling_knife_penalty(bars: &[Bar]) -> f64 {
    if bars.len() < 4 {
        return 0.0;
    }

    let mut down_days = 0;
    let steps = (bars.len() - 1).min(4);
    for i in 0..steps {
        let newer = &bars[bars.len() - 1 - i];
        let older = &bars[bars.len() - 2 - i];
        if newer.close < older.close {
            down_days += 1;
        } else {
            break;
        }
    }

    if down_days >= 4 {
        0.4
    } else if down_days >= 3 {
        0.25
    } else {
        0.0
    }
}

/// Full score composition for one instrument under the pass regime.
///
/// Step order is load-bearing and must not be rearranged: sub-scores, then
/// the below-MA200 / bull-trap / overbought guards, then the regime blend,
/// volume multiplier, OBV bonus and knife penalty.
pub fn score_instrument(data: &InstrumentData, weights: RegimeWeights) -> ScoreBreakdown {
    let snapshot = &data.snapshot;
    let previous = data.previous.as_ref();

    let MomentumScore {
        value: mut momentum,
        macd_points,
        golden_cross,
    } = momentum_score(snapshot, previous);
    let mut reversion = reversion_score(snapshot, previous);

    let volume_multiplier = volume_multiplier(snapshot);
    let obv_bonus = obv_bonus(snapshot, previous, &data.recent_bars);
    let knife_penalty = falling_knife_penalty(&data.recent_bars);

    // A close under the 200-day MA halves the rebound case.
    if snapshot.ma_200.is_some_and(|ma| snapshot.close < ma) {
        reversion *= 0.5;
    }

    // Golden cross without volume or price confirmation gives back part of
    // the MACD points.
    if golden_cross {
        let trap = bull_trap_factor(snapshot);
        if trap > 0.0 {
            momentum = (momentum - macd_points * trap.min(0.5)).max(0.0);
        }
    }

    // Overbought guard runs last, after every other sub-score adjustment.
    if snapshot.rsi_14.is_some_and(|rsi| rsi > 75.0) {
        momentum *= 0.5;
        reversion *= 0.2;
    }

    let raw = weights.momentum * momentum + weights.reversion * reversion;
    let adjusted = raw * volume_multiplier + obv_bonus;
    let final_score = (adjusted * (1.0 - knife_penalty)).max(0.0);

    ScoreBreakdown {
        momentum,
        reversion,
        volume_multiplier,
        obv_bonus,
        knife_penalty,
        raw,
        adjusted,
        final_score,
    }
}
