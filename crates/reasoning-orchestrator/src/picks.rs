use screener_core::{AnalysisResult, TradeAction};
use serde::{Deserialize, Serialize};

/// One ranked buy recommendation from a completed pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopPick {
    pub rank: usize,
    pub ticker: String,
    pub action: TradeAction,
    pub composite_score: f64,
    pub confidence: f64,
    pub weighted_score: f64,
    pub risk_reward_ratio: f64,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub reasoning: String,
}

/// Rank a pass's BUY/STRONG_BUY results by composite quality.
///
/// composite = weighted*0.40 + confidence*10*0.25 + risk_reward*0.20
///           + sentiment*0.15, with +0.5 for STRONG_BUY.
pub fn top_picks<'a, I>(results: I, top_n: usize) -> Vec<TopPick>
where
    I: IntoIterator<Item = &'a AnalysisResult>,
{
    let mut scored: Vec<TopPick> = results
        .into_iter()
        .filter(|r| r.action.is_buy())
        .map(|r| {
            let technical = r.technical_score.unwrap_or(0.0);
            let fundamental = r.fundamental_score.unwrap_or(0.0);
            let sentiment = r.sentiment_score.unwrap_or(0.0);
            let weighted = technical * 0.45 + fundamental * 0.30 + sentiment * 0.25;

            let risk_reward = match (r.target_price, r.stop_loss) {
                (Some(target), Some(stop)) if r.price_at_analysis > 0.0 => {
                    let upside = target - r.price_at_analysis;
                    let downside = r.price_at_analysis - stop;
                    if downside > 0.0 {
                        (upside / downside).min(5.0)
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            };

            let mut composite = weighted * 0.40
                + r.confidence * 10.0 * 0.25
                + risk_reward * 0.20
                + sentiment * 0.15;
            if r.action == TradeAction::StrongBuy {
                composite += 0.5;
            }

            TopPick {
                rank: 0,
                ticker: r.ticker.clone(),
                action: r.action,
                composite_score: composite,
                confidence: r.confidence,
                weighted_score: weighted,
                risk_reward_ratio: risk_reward,
                target_price: r.target_price,
                stop_loss: r.stop_loss,
                reasoning: r.reasoning.clone(),
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_n);
    for (i, pick) in scored.iter_mut().enumerate() {
        pick.rank = i + 1;
    }

    if !scored.is_empty() {
        tracing::info!(
            "top picks: {}",
            scored
                .iter()
                .map(|p| format!("{}({:.2})", p.ticker, p.composite_score))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    scored
}
