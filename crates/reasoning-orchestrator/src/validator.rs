use serde::Deserialize;
use screener_core::{
    AnalysisResult, EntryStrategy, FailureReason, ScreenerError, ScreenerResult, TradeAction,
};

/// Weights the reasoning service is instructed to blend its component
/// scores with; used to cross-check its reported composite.
const WEIGHT_TECHNICAL: f64 = 0.45;
const WEIGHT_FUNDAMENTAL: f64 = 0.30;
const WEIGHT_SENTIMENT: f64 = 0.25;

/// Reported composites further than this from the recomputed blend are
/// overridden.
const COMPOSITE_TOLERANCE: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Buy recommendations below this confidence downgrade to HOLD.
    pub min_confidence: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.65,
        }
    }
}

impl ValidatorConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            min_confidence: std::env::var("BUY_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_confidence),
        }
    }

    pub fn validate(&self) -> ScreenerResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ScreenerError::ConfigurationError(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

/// Raw reply shape as the service emits it. `action`, `confidence` and
/// `reasoning` are required; everything else defaults.
#[derive(Debug, Deserialize)]
struct RawReply {
    action: String,
    confidence: f64,
    reasoning: String,
    #[serde(default)]
    target_price: Option<f64>,
    #[serde(default)]
    stop_loss: Option<f64>,
    #[serde(default)]
    technical_score: Option<f64>,
    #[serde(default)]
    fundamental_score: Option<f64>,
    #[serde(default)]
    sentiment_score: Option<f64>,
    #[serde(default)]
    weighted_score: Option<f64>,
    #[serde(default)]
    key_factors: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    entry_strategy: Option<String>,
    #[serde(default)]
    time_horizon_days: Option<i64>,
}

/// Parses, validates and clamps raw reasoning-service replies.
#[derive(Debug, Clone, Default)]
pub struct ResponseValidator {
    config: ValidatorConfig,
}

impl ResponseValidator {
    pub fn new(config: ValidatorConfig) -> ScreenerResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Validate one raw reply against the contract.
    ///
    /// Returns a fully clamped `AnalysisResult`, or the permanent failure
    /// reason when the reply cannot be repaired into shape.
    pub fn validate(
        &self,
        ticker: &str,
        raw: &str,
        current_price: f64,
    ) -> Result<AnalysisResult, FailureReason> {
        let reply = parse_reply(raw)?;

        let mut action = match reply.action.as_str() {
            "STRONG_BUY" => TradeAction::StrongBuy,
            "BUY" => TradeAction::Buy,
            "HOLD" => TradeAction::Hold,
            other => {
                return Err(FailureReason::MalformedResponse(format!(
                    "unrecognized action {other:?}"
                )))
            }
        };

        let confidence = reply.confidence.clamp(0.0, 1.0);

        // Cross-check the reported composite before clamping components.
        let weighted_score = match (
            reply.weighted_score,
            reply.technical_score,
            reply.fundamental_score,
            reply.sentiment_score,
        ) {
            (Some(reported), Some(ts), Some(fs), Some(ss)) => {
                let expected =
                    ts * WEIGHT_TECHNICAL + fs * WEIGHT_FUNDAMENTAL + ss * WEIGHT_SENTIMENT;
                if (reported - expected).abs() > COMPOSITE_TOLERANCE {
                    tracing::warn!(
                        "[{ticker}] weighted_score {reported:.2} inconsistent with components \
                         (expected {expected:.2}), overriding"
                    );
                    Some(expected)
                } else {
                    Some(reported)
                }
            }
            (reported, _, _, _) => reported,
        };

        let technical_score = reply.technical_score.map(|v| v.clamp(0.0, 10.0));
        let fundamental_score = reply.fundamental_score.map(|v| v.clamp(0.0, 10.0));
        let sentiment_score = reply.sentiment_score.map(|v| v.clamp(0.0, 10.0));

        let (target_price, stop_loss) = if current_price > 0.0 {
            (
                reply
                    .target_price
                    .map(|v| v.clamp(current_price * 1.01, current_price * 1.25)),
                reply
                    .stop_loss
                    .map(|v| v.clamp(current_price * 0.88, current_price * 0.99)),
            )
        } else {
            (reply.target_price, reply.stop_loss)
        };

        if action.is_buy() && confidence < self.config.min_confidence {
            tracing::info!(
                "[{ticker}] confidence {confidence:.2} under threshold {:.2}, downgrading {} to HOLD",
                self.config.min_confidence,
                reply.action
            );
            action = TradeAction::Hold;
        }

        let entry_strategy = match reply.entry_strategy.as_deref() {
            Some("LIMIT_ON_DIP") => EntryStrategy::LimitOnDip,
            Some("SCALE_IN") => EntryStrategy::ScaleIn,
            _ => EntryStrategy::Market,
        };

        Ok(AnalysisResult {
            ticker: ticker.to_string(),
            action,
            confidence,
            target_price,
            stop_loss,
            technical_score,
            fundamental_score,
            sentiment_score,
            weighted_score,
            reasoning: reply.reasoning,
            key_factors: reply.key_factors,
            risks: reply.risks,
            entry_strategy,
            time_horizon_days: reply.time_horizon_days.unwrap_or(14),
            price_at_analysis: current_price,
        })
    }
}

/// Two-stage parse: direct, then the outermost `{...}` span for replies
/// wrapped in markdown fences or prose.
fn parse_reply(raw: &str) -> Result<RawReply, FailureReason> {
    match serde_json::from_str(raw) {
        Ok(reply) => Ok(reply),
        Err(direct_err) => {
            if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
                if end > start {
                    if let Ok(reply) = serde_json::from_str(&raw[start..=end]) {
                        return Ok(reply);
                    }
                }
            }
            Err(FailureReason::MalformedResponse(format!(
                "unparseable reply: {direct_err}"
            )))
        }
    }
}
