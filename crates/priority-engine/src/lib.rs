use std::sync::Arc;

use chrono::NaiveDate;
use screener_core::{
    CategoryBook, InstrumentData, MacroReadingProvider, ScoredInstrument, ScreenerError,
    ScreenerResult, SnapshotProvider,
};

pub mod factors;
pub mod pipeline;
pub mod regime;
pub mod select;

#[cfg(test)]
mod factors_tests;

pub use factors::{momentum_score, reversion_score, MomentumScore};
pub use pipeline::{falling_knife_penalty, obv_bonus, score_instrument, volume_multiplier};
pub use regime::{Regime, RegimeWeights};
pub use select::{category_cap, diversify, rank_descending};

/// Immutable settings for one scoring pass.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// How many instruments to hand to the analysis stage.
    pub selection_target: usize,
    /// Minimum final score an instrument must clear to stay a candidate.
    pub score_floor: f64,
    /// Symbol the macro reading provider is queried with.
    pub macro_symbol: String,
    /// Trailing daily bars fetched per instrument.
    pub recent_bar_window: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            selection_target: 50,
            score_floor: 0.5,
            macro_symbol: "^VIX".to_string(),
            recent_bar_window: 6,
        }
    }
}

impl ScoringConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            selection_target: env_parse("SELECTION_TARGET", defaults.selection_target),
            score_floor: env_parse("SCORE_FLOOR", defaults.score_floor),
            macro_symbol: std::env::var("MACRO_SYMBOL").unwrap_or(defaults.macro_symbol),
            recent_bar_window: env_parse("RECENT_BAR_WINDOW", defaults.recent_bar_window),
        }
    }

    pub fn validate(&self) -> ScreenerResult<()> {
        if self.selection_target == 0 {
            return Err(ScreenerError::ConfigurationError(
                "selection_target must be at least 1".to_string(),
            ));
        }
        if !self.score_floor.is_finite() || self.score_floor < 0.0 {
            return Err(ScreenerError::ConfigurationError(format!(
                "score_floor must be finite and non-negative, got {}",
                self.score_floor
            )));
        }
        if self.recent_bar_window < 2 {
            return Err(ScreenerError::ConfigurationError(
                "recent_bar_window must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Deterministic multi-factor ranking over a universe of instruments.
pub struct PriorityEngine {
    snapshots: Arc<dyn SnapshotProvider>,
    macro_readings: Arc<dyn MacroReadingProvider>,
    categories: Arc<CategoryBook>,
    config: ScoringConfig,
}

impl PriorityEngine {
    pub fn new(
        snapshots: Arc<dyn SnapshotProvider>,
        macro_readings: Arc<dyn MacroReadingProvider>,
        categories: Arc<CategoryBook>,
        config: ScoringConfig,
    ) -> ScreenerResult<Self> {
        config.validate()?;
        Ok(Self {
            snapshots,
            macro_readings,
            categories,
            config,
        })
    }

    /// Score the universe using the latest macro reading from the provider.
    pub async fn score_universe_latest(
        &self,
        instruments: &[String],
        as_of: NaiveDate,
    ) -> ScreenerResult<Vec<ScoredInstrument>> {
        let reading = match self.macro_readings.latest(&self.config.macro_symbol).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("macro reading unavailable, using default regime: {e}");
                None
            }
        };
        self.score_universe(instruments, reading, as_of).await
    }

    /// Rank `instruments` by final priority score for `as_of`, descending,
    /// diversification-filtered, floor-filtered.
    ///
    /// ETFs are excluded before scoring. Instruments with no usable snapshot
    /// are skipped; the pass only fails outright when the snapshot provider
    /// errors on every single fetch.
    pub async fn score_universe(
        &self,
        instruments: &[String],
        macro_reading: Option<f64>,
        as_of: NaiveDate,
    ) -> ScreenerResult<Vec<ScoredInstrument>> {
        let universe: Vec<&str> = instruments
            .iter()
            .map(String::as_str)
            .filter(|t| !self.categories.is_etf(t))
            .collect();
        tracing::info!(
            "scoring pass: {} instruments after ETF exclusion ({} total)",
            universe.len(),
            instruments.len()
        );

        let regime = regime::Regime::classify(macro_reading);
        let weights = regime.weights();
        tracing::debug!(
            "regime={} reading={:?} weights=({:.2}, {:.2})",
            regime.name(),
            macro_reading,
            weights.momentum,
            weights.reversion
        );

        let mut candidates = Vec::new();
        let mut skipped = 0usize;
        let mut provider_errors = 0usize;

        for (i, ticker) in universe.iter().enumerate() {
            match self.fetch_instrument(ticker, as_of).await {
                Ok(Some(data)) => {
                    let breakdown = pipeline::score_instrument(&data, weights);
                    if breakdown.final_score > self.config.score_floor {
                        candidates.push(ScoredInstrument {
                            ticker: data.ticker,
                            score: breakdown.final_score,
                            breakdown,
                        });
                    } else {
                        tracing::debug!(
                            "[{ticker}] below score floor ({:.3}), dropped",
                            breakdown.final_score
                        );
                    }
                }
                Ok(None) => skipped += 1,
                Err(e) => {
                    provider_errors += 1;
                    tracing::warn!("[{ticker}] snapshot fetch failed, skipped: {e}");
                }
            }

            if (i + 1) % 50 == 0 || i + 1 == universe.len() {
                tracing::info!(
                    "scoring progress: {}/{} ({} skipped, {} errors)",
                    i + 1,
                    universe.len(),
                    skipped,
                    provider_errors
                );
            }
        }

        if !universe.is_empty() && provider_errors == universe.len() {
            return Err(ScreenerError::DataUnavailable(
                "indicator snapshot provider unreachable for the entire universe".to_string(),
            ));
        }

        let ranked = select::rank_descending(candidates);
        let selected = select::diversify(ranked, &self.categories, self.config.selection_target);

        tracing::info!(
            "scoring pass complete: regime={} selected {}/{} candidates",
            regime.name(),
            selected.len(),
            universe.len()
        );
        for item in selected.iter().take(5) {
            tracing::debug!(
                "  [{}] score={:.3} M={:.2} R={:.2} vol=x{:.1} obv={:+.1} knife={:.2}",
                item.ticker,
                item.score,
                item.breakdown.momentum,
                item.breakdown.reversion,
                item.breakdown.volume_multiplier,
                item.breakdown.obv_bonus,
                item.breakdown.knife_penalty
            );
        }

        Ok(selected)
    }

    /// Assemble the immutable per-pass record for one instrument.
    async fn fetch_instrument(
        &self,
        ticker: &str,
        as_of: NaiveDate,
    ) -> ScreenerResult<Option<InstrumentData>> {
        let Some(snapshot) = self.snapshots.snapshot(ticker, as_of).await? else {
            return Ok(None);
        };
        if snapshot.close <= 0.0 {
            return Ok(None);
        }

        let previous = self.snapshots.previous_snapshot(ticker, snapshot.date).await?;
        let recent_bars = self
            .snapshots
            .recent_bars(ticker, self.config.recent_bar_window)
            .await?;
        if recent_bars.is_empty() {
            return Ok(None);
        }

        Ok(Some(InstrumentData {
            ticker: ticker.to_string(),
            snapshot,
            previous,
            recent_bars,
        }))
    }
}
