use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{Bar, IndicatorSnapshot, PromptPayload, ScreenerResult, ServiceFailure};

/// Source of per-instrument indicator snapshots and trailing bars.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Most recent snapshot at or before `as_of`, if one exists.
    async fn snapshot(
        &self,
        ticker: &str,
        as_of: NaiveDate,
    ) -> ScreenerResult<Option<IndicatorSnapshot>>;

    /// Snapshot for the trading day immediately before `date`.
    async fn previous_snapshot(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> ScreenerResult<Option<IndicatorSnapshot>>;

    /// Up to `n` most recent daily bars, oldest-first.
    async fn recent_bars(&self, ticker: &str, n: usize) -> ScreenerResult<Vec<Bar>>;
}

/// Source of the macro volatility reading that drives regime selection.
#[async_trait]
pub trait MacroReadingProvider: Send + Sync {
    async fn latest(&self, symbol: &str) -> ScreenerResult<Option<f64>>;
}

/// External reasoning service that renders a buy/sell judgment.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Submit one analysis request and return the raw textual reply.
    async fn submit(&self, prompt: &PromptPayload) -> Result<String, ServiceFailure>;
}
