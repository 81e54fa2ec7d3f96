use screener_core::IndicatorSnapshot;

/// Momentum sub-score plus the pieces the bull-trap guard needs later.
#[derive(Debug, Clone, Copy)]
pub struct MomentumScore {
    pub value: f64,
    pub macd_points: f64,
    pub golden_cross: bool,
}

/// Momentum sub-score from MA alignment, MACD state, trend strength and the
/// RSI momentum zone.
///
/// The ADX multiplier scales only the MA-alignment and MACD points; the
/// RSI-zone bonus is added afterwards, unscaled.
pub fn momentum_score(
    snapshot: &IndicatorSnapshot,
    previous: Option<&IndicatorSnapshot>,
) -> MomentumScore {
    let close = snapshot.close;

    // MA alignment: one point per MA below price, plus one for a perfect
    // MA20 > MA50 > MA200 stack.
    let mut ma_points = 0.0;
    if snapshot.ma_20.is_some_and(|ma| close > ma) {
        ma_points += 1.0;
    }
    if snapshot.ma_50.is_some_and(|ma| close > ma) {
        ma_points += 1.0;
    }
    if snapshot.ma_200.is_some_and(|ma| close > ma) {
        ma_points += 1.0;
    }
    if let (Some(ma20), Some(ma50), Some(ma200)) =
        (snapshot.ma_20, snapshot.ma_50, snapshot.ma_200)
    {
        if ma20 > ma50 && ma50 > ma200 {
            ma_points += 1.0;
        }
    }

    // MACD: golden cross (histogram flipping positive) outranks a merely
    // positive or accelerating histogram.
    let mut golden_cross = false;
    let mut macd_points = 0.0;
    if let Some(hist) = snapshot.macd_hist {
        let prev_hist = previous.and_then(|p| p.macd_hist);
        if hist > 0.0 && prev_hist.is_some_and(|ph| ph <= 0.0) {
            golden_cross = true;
            macd_points = 2.5;
        } else if hist > 0.0 {
            macd_points = 1.5;
            if prev_hist.is_some_and(|ph| hist > ph) {
                macd_points = 2.0;
            }
        }
    }

    let adx_multiplier = match snapshot.adx_14 {
        Some(adx) if adx > 30.0 => 1.3,
        Some(adx) if adx > 25.0 => 1.15,
        Some(adx) if adx < 20.0 => 0.7,
        _ => 1.0,
    };

    let mut value = (ma_points + macd_points) * adx_multiplier;

    if snapshot.rsi_14.is_some_and(|rsi| (50.0..=65.0).contains(&rsi)) {
        value += 1.5;
    }

    MomentumScore {
        value,
        macd_points,
        golden_cross,
    }
}

/// Mean-reversion sub-score from RSI oversold depth, StochRSI oversold
/// cross, Bollinger position and Bollinger squeeze.
pub fn reversion_score(
    snapshot: &IndicatorSnapshot,
    previous: Option<&IndicatorSnapshot>,
) -> f64 {
    let mut score = 0.0;

    if let Some(rsi) = snapshot.rsi_14 {
        score += if rsi < 25.0 {
            3.0
        } else if rsi < 30.0 {
            2.5
        } else if rsi < 35.0 {
            1.5
        } else if rsi < 40.0 {
            0.5
        } else {
            0.0
        };
    }

    // StochRSI: both lines deep in the oversold zone, with an extra point
    // when %K crosses above %D while still down there.
    if let (Some(k), Some(d)) = (snapshot.stoch_rsi_k, snapshot.stoch_rsi_d) {
        if k < 0.20 && d < 0.20 {
            score += 1.0;
            let crossed = previous.is_some_and(|p| {
                matches!(
                    (p.stoch_rsi_k, p.stoch_rsi_d),
                    (Some(pk), Some(pd)) if pk <= pd && k > d
                )
            });
            if crossed {
                score += 1.0;
            }
        }
    }

    if let Some(pct) = bollinger_position(snapshot) {
        score += if pct < 10.0 {
            2.5
        } else if pct < 20.0 {
            2.0
        } else if pct < 30.0 {
            1.0
        } else {
            0.0
        };
    }

    // Squeeze: narrowing bands below 4% width, or any sub-6% width.
    if let (Some(width), Some(prev_width)) = (
        bollinger_width(snapshot),
        previous.and_then(bollinger_width),
    ) {
        if width < 0.04 && width < prev_width {
            score += 1.5;
        } else if width < 0.06 {
            score += 0.5;
        }
    }

    score
}

/// Discount factor for a golden cross fired without confirmation.
///
/// Accumulates 0.2 when the latest volume runs under 80% of its 20-day
/// average and 0.3 when price sits below both MA20 and MA50; the caller
/// caps the total at 0.5 and subtracts `macd_points * factor` from momentum.
pub fn bull_trap_factor(snapshot: &IndicatorSnapshot) -> f64 {
    let mut factor = 0.0;
    if snapshot
        .volume_ma_20
        .is_some_and(|vma| vma > 0.0 && snapshot.volume < vma * 0.8)
    {
        factor += 0.2;
    }
    if let (Some(ma20), Some(ma50)) = (snapshot.ma_20, snapshot.ma_50) {
        if snapshot.close < ma20 && snapshot.close < ma50 {
            factor += 0.3;
        }
    }
    factor
}

/// Close position inside the Bollinger channel, as a percentage.
pub fn bollinger_position(snapshot: &IndicatorSnapshot) -> Option<f64> {
    let (upper, lower) = (snapshot.bb_upper?, snapshot.bb_lower?);
    if upper - lower <= 0.0 {
        return None;
    }
    Some((snapshot.close - lower) / (upper - lower) * 100.0)
}

/// Band width relative to the middle band.
pub fn bollinger_width(snapshot: &IndicatorSnapshot) -> Option<f64> {
    let (upper, middle, lower) = (snapshot.bb_upper?, snapshot.bb_middle?, snapshot.bb_lower?);
    if middle <= 0.0 {
        return None;
    }
    Some((upper - lower) / middle)
}
