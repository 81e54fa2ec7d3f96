use screener_core::{Bar, IndicatorSnapshot, InstrumentData, PromptPayload};

/// Fixed instruction set for the reasoning service. The reply contract here
/// is what the response validator enforces.
pub const SYSTEM_PROMPT: &str = "\
You are a quantitative equity analyst running a systematic stock screening process for US equities.
Your task: evaluate whether a stock is a BUY candidate for a SWING TRADE (1-4 week holding period).

## DECISION FRAMEWORK (apply in this exact order)

### Step 1: Technical Score (0-10)
Evaluate ONLY from the provided indicator data:
| Score | Criteria |
|-------|----------|
| 8-10  | MACD golden cross + RSI 40-60 recovering + price above MA20 & MA50 + ADX>25 + volume confirmation |
| 6-7   | 2-3 bullish signals aligned (e.g., RSI<40 turning up + MACD histogram improving + above MA20) |
| 5     | Mixed signals - some bullish, some bearish, no clear direction |
| 3-4   | Mostly bearish - below key MAs, RSI declining, MACD negative |
| 0-2   | Strong bearish - RSI>70 diverging, MACD dead cross, below all MAs, high ADX downtrend |

### Step 2: Fundamental Score (0-10)
Evaluate ONLY from provided fundamental data. If a metric is missing, SKIP it (do not guess).
If no fundamental data is provided, fundamental_score MUST be 5.0.

### Step 3: Sentiment Score (0-10)
Evaluate ONLY from provided news items. If no news is provided, sentiment_score MUST be 5.0.

### Step 4: Market Regime Adjustment
- Volatility index > 30: reduce confidence by 15-25%
- Volatility index > 25: reduce confidence by 5-15%

### Step 5: Derive Action
Calculate weighted_score = (technical * 0.45) + (fundamental * 0.30) + (sentiment * 0.25)
- STRONG_BUY: weighted_score >= 6.5 AND technical_score >= 6.0 AND confidence >= 0.70
- BUY: weighted_score >= 5.0 AND technical_score >= 4.0 AND confidence >= 0.50
- HOLD: below BUY thresholds
IMPORTANT: These are pre-filtered stocks (top 50 from an 800+ universe). Expect 15-30% to be
BUY candidates. Do NOT default to HOLD - evaluate objectively.

### Confidence Definition
confidence = probability of positive return within 2-4 weeks:
- 0.90+: All signals aligned, strong catalyst
- 0.75-0.89: Most signals bullish, minor concerns
- 0.55-0.74: Bullish lean but notable risks - sufficient for BUY
- 0.40-0.59: Mixed signals, uncertain
- <0.40: Mostly bearish or insufficient data

CRITICAL: Respond ONLY with valid JSON:
{
    \"action\": \"STRONG_BUY\" | \"BUY\" | \"HOLD\",
    \"confidence\": <float 0.0-1.0>,
    \"target_price\": <float - 2-4 week target within +3% to +15% of current price, or null>,
    \"stop_loss\": <float - within -2% to -8% of current price, or null>,
    \"technical_score\": <float 0.0-10.0>,
    \"fundamental_score\": <float 0.0-10.0>,
    \"sentiment_score\": <float 0.0-10.0>,
    \"weighted_score\": <float 0.0-10.0>,
    \"reasoning\": \"<max 500 chars, MUST cite specific numbers from input data>\",
    \"key_factors\": [\"<factor1>\", \"<factor2>\", \"<factor3>\"],
    \"risks\": [\"<risk1>\", \"<risk2>\"],
    \"entry_strategy\": \"MARKET\" | \"LIMIT_ON_DIP\" | \"SCALE_IN\",
    \"time_horizon_days\": <int 5-20>
}

RULES:
- NEVER reference data not provided in the input
- reasoning MUST cite at least 2 specific numbers from input
- All text in English";

/// Per-instrument context the prompt is assembled from.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub data: &'a InstrumentData,
    pub name: Option<&'a str>,
    pub sector: Option<&'a str>,
    pub macro_reading: Option<f64>,
}

/// Assemble the two-part request for one instrument.
///
/// Pure string assembly over the pre-fetched pass data; derived metrics are
/// computed here so the service reads a narrative summary, not raw arrays.
pub fn build_prompt(ctx: &PromptContext<'_>) -> PromptPayload {
    let data = ctx.data;
    let snapshot = &data.snapshot;
    let mut lines: Vec<String> = Vec::new();

    lines.push(match ctx.name {
        Some(name) => format!("## {} - {}", data.ticker, name),
        None => format!("## {}", data.ticker),
    });
    if let Some(sector) = ctx.sector {
        lines.push(format!("Sector: {sector}"));
    }
    lines.push(format!("Current Price: ${:.2}", snapshot.close));
    lines.push(format!("Analysis Date: {}", snapshot.date));
    lines.push(String::new());

    push_price_action(&mut lines, &data.recent_bars);
    push_indicators(&mut lines, snapshot, data.previous.as_ref());
    push_market_context(&mut lines, ctx.macro_reading);

    lines.push(
        "Analyze all data. Follow the decision framework. Compute weighted_score, then derive \
         action. JSON only."
            .to_string(),
    );

    PromptPayload {
        system: SYSTEM_PROMPT.to_string(),
        user: lines.join("\n"),
    }
}

fn push_price_action(lines: &mut Vec<String>, bars: &[Bar]) {
    if bars.len() < 2 {
        return;
    }
    let latest = &bars[bars.len() - 1];

    lines.push("## Price Action:".to_string());

    let mut returns = Vec::new();
    for (label, span) in [("5d", 5usize), ("10d", 10), ("20d", 20)] {
        if bars.len() > span {
            let base = &bars[bars.len() - 1 - span];
            if base.close > 0.0 {
                let ret = (latest.close - base.close) / base.close * 100.0;
                returns.push(format!("{label}={ret:+.2}%"));
            }
        }
    }
    if !returns.is_empty() {
        lines.push(format!("- Returns: {}", returns.join(" | ")));
    }

    let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    if high > 0.0 && low > 0.0 {
        lines.push(format!(
            "- {}d range: High=${:.2} ({:+.1}%) | Low=${:.2} ({:+.1}%)",
            bars.len(),
            high,
            (latest.close - high) / high * 100.0,
            low,
            (latest.close - low) / low * 100.0,
        ));
    }

    if bars.len() >= 10 {
        let recent: f64 = bars[bars.len() - 5..].iter().map(|b| b.volume).sum::<f64>() / 5.0;
        let prior: f64 =
            bars[bars.len() - 10..bars.len() - 5].iter().map(|b| b.volume).sum::<f64>() / 5.0;
        if prior > 0.0 {
            lines.push(format!(
                "- Volume trend: 5d avg={recent:.0} ({:+.1}% vs prior 5d)",
                (recent - prior) / prior * 100.0
            ));
        }
    }

    let sessions: Vec<String> = bars
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(|b| {
            let direction = if b.close >= b.open { "+" } else { "-" };
            let body = if b.open > 0.0 {
                (b.close - b.open).abs() / b.open * 100.0
            } else {
                0.0
            };
            format!(
                "{}: {direction}{body:.1}% C:{:.2} V:{:.0}",
                b.timestamp.date_naive(),
                b.close,
                b.volume
            )
        })
        .collect();
    lines.push(format!("- Last sessions: {}", sessions.join(" | ")));
    lines.push(String::new());
}

fn push_indicators(
    lines: &mut Vec<String>,
    snapshot: &IndicatorSnapshot,
    previous: Option<&IndicatorSnapshot>,
) {
    let mut tech: Vec<String> = Vec::new();

    if let Some(rsi) = snapshot.rsi_14 {
        let label = if rsi < 30.0 {
            "OVERSOLD"
        } else if rsi > 70.0 {
            "OVERBOUGHT"
        } else {
            "NEUTRAL"
        };
        tech.push(format!("- RSI(14): {rsi:.1} [{label}]"));
    }

    if let Some(hist) = snapshot.macd_hist {
        let prev_hist = previous.and_then(|p| p.macd_hist);
        let annotation = match prev_hist {
            Some(ph) if ph <= 0.0 && hist > 0.0 => " ** CROSSED POSITIVE **",
            Some(ph) if ph >= 0.0 && hist < 0.0 => " ** CROSSED NEGATIVE **",
            Some(ph) if hist > ph => " (improving)",
            Some(_) => " (deteriorating)",
            None => "",
        };
        tech.push(format!("- MACD Hist: {hist:.4}{annotation}"));
    }

    if let (Some(upper), Some(lower)) = (snapshot.bb_upper, snapshot.bb_lower) {
        if upper - lower > 0.0 {
            let pct = (snapshot.close - lower) / (upper - lower) * 100.0;
            let label = if pct > 80.0 {
                "UPPER ZONE"
            } else if pct < 20.0 {
                "LOWER ZONE"
            } else {
                "MIDDLE"
            };
            tech.push(format!(
                "- BB Position: {pct:.1}% [{label}] (L:${lower:.2} U:${upper:.2})"
            ));
        }
    }

    let mut ma_parts = Vec::new();
    for (label, value) in [
        ("MA20", snapshot.ma_20),
        ("MA50", snapshot.ma_50),
        ("MA200", snapshot.ma_200),
    ] {
        if let Some(ma) = value {
            if ma > 0.0 {
                ma_parts.push(format!(
                    "{label}:${ma:.2}({:+.1}%)",
                    (snapshot.close - ma) / ma * 100.0
                ));
            }
        }
    }
    if !ma_parts.is_empty() {
        let alignment = match (snapshot.ma_20, snapshot.ma_50, snapshot.ma_200) {
            (Some(a), Some(b), Some(c)) if a > b && b > c => "BULLISH",
            (Some(a), Some(b), Some(c)) if a < b && b < c => "BEARISH",
            _ => "MIXED",
        };
        tech.push(format!("- MAs [{alignment}]: {}", ma_parts.join(" | ")));
    }

    if let Some(adx) = snapshot.adx_14 {
        let label = if adx > 25.0 {
            "STRONG TREND"
        } else if adx > 20.0 {
            "DEVELOPING"
        } else {
            "RANGE-BOUND"
        };
        tech.push(format!("- ADX(14): {adx:.1} [{label}]"));
    }

    if let Some(atr) = snapshot.atr_14 {
        if snapshot.close > 0.0 {
            tech.push(format!(
                "- ATR(14): ${atr:.2} ({:.2}% daily volatility)",
                atr / snapshot.close * 100.0
            ));
        }
    }

    if let Some(vma) = snapshot.volume_ma_20 {
        if vma > 0.0 {
            let ratio = snapshot.volume / vma;
            let label = if ratio > 1.2 {
                "ABOVE AVG"
            } else if ratio < 0.8 {
                "BELOW AVG"
            } else {
                "NORMAL"
            };
            tech.push(format!(
                "- Volume: {:.0} vs 20d-MA:{vma:.0} ({ratio:.2}x [{label}])",
                snapshot.volume
            ));
        }
    }

    if !tech.is_empty() {
        lines.push(format!("## Technical Indicators ({}):", snapshot.date));
        lines.append(&mut tech);
        lines.push(String::new());
    }
}

fn push_market_context(lines: &mut Vec<String>, macro_reading: Option<f64>) {
    let Some(reading) = macro_reading else {
        return;
    };
    let label = if reading > 30.0 {
        "FEAR"
    } else if reading > 20.0 {
        "CAUTION"
    } else {
        "CALM"
    };
    lines.push(format!("## Market: Volatility Index {reading:.1} [{label}]"));
    lines.push(String::new());
}
