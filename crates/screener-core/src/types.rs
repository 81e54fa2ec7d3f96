use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Latest technical indicator set for one instrument on one trading day.
///
/// Every indicator field is optional: a missing value contributes zero to
/// whatever scoring term reads it, it never aborts the instrument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub ma_20: Option<f64>,
    pub ma_50: Option<f64>,
    pub ma_200: Option<f64>,
    pub volume_ma_20: Option<f64>,
    pub adx_14: Option<f64>,
    pub atr_14: Option<f64>,
    pub obv: Option<f64>,
    pub stoch_rsi_k: Option<f64>,
    pub stoch_rsi_d: Option<f64>,
}

/// Immutable per-pass scoring input for one instrument.
///
/// Assembled once before a pass; nothing mutates it afterwards, so scoring
/// stays a pure function of this record plus the regime.
#[derive(Debug, Clone)]
pub struct InstrumentData {
    pub ticker: String,
    pub snapshot: IndicatorSnapshot,
    /// Prior trading day's snapshot, used for cross/acceleration detection.
    pub previous: Option<IndicatorSnapshot>,
    /// Short trailing window of daily bars, oldest-first.
    pub recent_bars: Vec<Bar>,
}

/// Per-instrument decomposition of the final priority score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub momentum: f64,
    pub reversion: f64,
    pub volume_multiplier: f64,
    pub obv_bonus: f64,
    pub knife_penalty: f64,
    pub raw: f64,
    pub adjusted: f64,
    pub final_score: f64,
}

/// One ranked entry in the output of a scoring pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredInstrument {
    pub ticker: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Recommended action from the reasoning service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    StrongBuy,
    Buy,
    Hold,
}

impl TradeAction {
    pub fn is_buy(&self) -> bool {
        matches!(self, TradeAction::StrongBuy | TradeAction::Buy)
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            TradeAction::StrongBuy => "Strong Buy",
            TradeAction::Buy => "Buy",
            TradeAction::Hold => "Hold",
        }
    }
}

/// How a recommended position should be entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStrategy {
    Market,
    LimitOnDip,
    ScaleIn,
}

/// Validated reply from the reasoning service for one instrument.
///
/// All numeric fields have already been clamped into their contractual
/// ranges by the response validator; downstream consumers can rely on
/// `confidence` in [0, 1] and the component scores in [0, 10].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub ticker: String,
    pub action: TradeAction,
    pub confidence: f64,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub technical_score: Option<f64>,
    pub fundamental_score: Option<f64>,
    pub sentiment_score: Option<f64>,
    pub weighted_score: Option<f64>,
    pub reasoning: String,
    pub key_factors: Vec<String>,
    pub risks: Vec<String>,
    pub entry_strategy: EntryStrategy,
    pub time_horizon_days: i64,
    pub price_at_analysis: f64,
}

/// Terminal, non-retryable outcome for one instrument's analysis task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FailureReason {
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("retries exhausted: {0}")]
    RetriesExhausted(String),
    #[error("cancelled before completion")]
    Cancelled,
}

/// Exactly one of these is recorded per instrument per analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnalysisOutcome {
    Completed(AnalysisResult),
    Failed(FailureReason),
}

impl AnalysisOutcome {
    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            AnalysisOutcome::Completed(r) => Some(r),
            AnalysisOutcome::Failed(_) => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed(_))
    }
}

/// Two-part textual request sent to the reasoning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPayload {
    pub system: String,
    pub user: String,
}

/// Category tag marking index funds and other non-single-issuer instruments.
pub const ETF_TAG: &str = "ETF";

/// Fallback category for instruments with no non-ETF tag.
pub const OTHER_CATEGORY: &str = "OTHER";

/// Static instrument -> category-tag mapping (index membership).
///
/// Loaded once per process lifetime; read-only during a scoring pass.
#[derive(Debug, Clone, Default)]
pub struct CategoryBook {
    tags: HashMap<String, Vec<String>>,
}

impl CategoryBook {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<String>)>,
        S: Into<String>,
    {
        Self {
            tags: pairs.into_iter().map(|(t, c)| (t.into(), c)).collect(),
        }
    }

    pub fn categories(&self, ticker: &str) -> &[String] {
        self.tags.get(ticker).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_etf(&self, ticker: &str) -> bool {
        self.categories(ticker).iter().any(|c| c == ETF_TAG)
    }

    /// First non-ETF tag, or `OTHER` when the instrument carries none.
    pub fn primary_category(&self, ticker: &str) -> &str {
        self.categories(ticker)
            .iter()
            .find(|c| *c != ETF_TAG)
            .map(String::as_str)
            .unwrap_or(OTHER_CATEGORY)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
