use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use screener_core::{
    AnalysisOutcome, FailureReason, PromptPayload, ReasoningService, ScreenerError,
    ScreenerResult, ServiceFailure,
};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::task::{backoff_delay, parse_retry_hint, stagger_delay, AnalysisTask, TaskState};
use crate::validator::ResponseValidator;

/// Immutable settings for the concurrent analysis pass.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum simultaneous in-flight reasoning-service calls.
    pub concurrency: usize,
    /// Total attempts per instrument, including the first.
    pub max_attempts: u32,
    /// Gap between staggered first attempts within one concurrency window.
    pub stagger_interval: Duration,
    /// Per-attempt ceiling on one service call.
    pub request_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_factor: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            stagger_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(90),
            backoff_base: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            concurrency: env_parse("REASONING_CONCURRENCY", defaults.concurrency),
            max_attempts: env_parse("REASONING_MAX_ATTEMPTS", defaults.max_attempts),
            stagger_interval: Duration::from_millis(env_parse(
                "REASONING_STAGGER_MS",
                defaults.stagger_interval.as_millis() as u64,
            )),
            request_timeout: Duration::from_secs(env_parse(
                "REASONING_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            backoff_base: Duration::from_secs(env_parse(
                "REASONING_BACKOFF_BASE_SECS",
                defaults.backoff_base.as_secs(),
            )),
            backoff_factor: defaults.backoff_factor,
        }
    }

    pub fn validate(&self) -> ScreenerResult<()> {
        if self.concurrency == 0 {
            return Err(ScreenerError::ConfigurationError(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ScreenerError::ConfigurationError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.backoff_factor < 1.0 {
            return Err(ScreenerError::ConfigurationError(format!(
                "backoff_factor must be at least 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ScreenerError::ConfigurationError(
                "request_timeout must be positive".to_string(),
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

/// One instrument's analysis request: the assembled prompt plus the price
/// the validator clamps against.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub ticker: String,
    pub prompt: PromptPayload,
    pub current_price: f64,
}

/// Aggregate of one analysis pass.
#[derive(Debug)]
pub struct PassReport {
    pub outcomes: HashMap<String, AnalysisOutcome>,
    pub requested: usize,
}

impl PassReport {
    pub fn completed(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, AnalysisOutcome::Failed(r) if *r != FailureReason::Cancelled))
            .count()
    }

    pub fn cancelled(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, AnalysisOutcome::Failed(FailureReason::Cancelled)))
            .count()
    }

    pub fn results(&self) -> impl Iterator<Item = &screener_core::AnalysisResult> {
        self.outcomes.values().filter_map(|o| o.result())
    }
}

/// Drives bounded-parallel, retrying, backoff-governed calls against the
/// external reasoning service for a selected instrument set.
pub struct AnalysisOrchestrator {
    service: Arc<dyn ReasoningService>,
    validator: ResponseValidator,
    config: OrchestratorConfig,
}

impl AnalysisOrchestrator {
    pub fn new(
        service: Arc<dyn ReasoningService>,
        validator: ResponseValidator,
        config: OrchestratorConfig,
    ) -> ScreenerResult<Self> {
        config.validate()?;
        Ok(Self {
            service,
            validator,
            config,
        })
    }

    /// Run a full pass with no external shutdown signal.
    pub async fn run_to_completion(&self, requests: Vec<AnalysisRequest>) -> PassReport {
        let (_tx, rx) = watch::channel(false);
        self.run_analysis_pass(requests, rx).await
    }

    /// Run a pass under a wall-clock deadline. Work still outstanding when
    /// the deadline passes is cancelled and the partial pass is reported.
    pub async fn run_with_deadline(
        &self,
        requests: Vec<AnalysisRequest>,
        deadline: Duration,
    ) -> PassReport {
        let (tx, rx) = watch::channel(false);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = tx.send(true);
        });
        let report = self.run_analysis_pass(requests, rx).await;
        timer.abort();
        report
    }

    /// Run one analysis pass over `requests`.
    ///
    /// Every distinct instrument receives exactly one terminal outcome.
    /// Flipping `shutdown` to `true` abandons in-flight calls and marks
    /// queued tasks `Cancelled`; results already collected are retained.
    pub async fn run_analysis_pass(
        &self,
        requests: Vec<AnalysisRequest>,
        shutdown: watch::Receiver<bool>,
    ) -> PassReport {
        // One task per instrument, first occurrence wins.
        let mut seen = HashSet::new();
        let requests: Vec<AnalysisRequest> = requests
            .into_iter()
            .filter(|r| seen.insert(r.ticker.clone()))
            .collect();
        let requested = requests.len();

        tracing::info!(
            "analysis pass: {requested} instruments, concurrency {}, {} attempts max",
            self.config.concurrency,
            self.config.max_attempts
        );

        let outcomes: Arc<DashMap<String, AnalysisOutcome>> = Arc::new(DashMap::new());
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut join_set = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let task = AnalysisTask::new(index, request.ticker, request.prompt, request.current_price);
            let service = Arc::clone(&self.service);
            let validator = self.validator.clone();
            let config = self.config.clone();
            let outcomes = Arc::clone(&outcomes);
            let semaphore = Arc::clone(&semaphore);
            let shutdown = shutdown.clone();

            join_set.spawn(async move {
                run_task(service, validator, config, outcomes, semaphore, shutdown, task).await;
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                tracing::error!("analysis task panicked: {e}");
            }
        }

        let outcomes: HashMap<String, AnalysisOutcome> = match Arc::try_unwrap(outcomes) {
            Ok(map) => map.into_iter().collect(),
            Err(shared) => shared
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        };

        let report = PassReport {
            outcomes,
            requested,
        };
        let buys = report
            .results()
            .filter(|r| r.action.is_buy())
            .count();
        tracing::info!(
            "analysis pass done: {}/{} completed ({} buy candidates, {} failed, {} cancelled)",
            report.completed(),
            report.requested,
            buys,
            report.failed(),
            report.cancelled()
        );
        report
    }
}

/// Resolves once the shutdown flag flips to true; pends forever otherwise.
async fn shutdown_signalled(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender dropped without signalling: no shutdown will come.
            std::future::pending::<()>().await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_task(
    service: Arc<dyn ReasoningService>,
    validator: ResponseValidator,
    config: OrchestratorConfig,
    outcomes: Arc<DashMap<String, AnalysisOutcome>>,
    semaphore: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
    mut task: AnalysisTask,
) {
    let record_cancelled = |task: &mut AnalysisTask| {
        task.state = TaskState::PermanentlyFailed;
        outcomes.insert(
            task.ticker.clone(),
            AnalysisOutcome::Failed(FailureReason::Cancelled),
        );
        tracing::debug!("[{}] cancelled", task.ticker);
    };

    let stagger = stagger_delay(task.index, config.concurrency, config.stagger_interval);
    if !stagger.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(stagger) => {}
            _ = shutdown_signalled(shutdown.clone()) => {
                record_cancelled(&mut task);
                return;
            }
        }
    }

    let _permit = tokio::select! {
        permit = semaphore.acquire_owned() => permit.expect("semaphore never closed"),
        _ = shutdown_signalled(shutdown.clone()) => {
            record_cancelled(&mut task);
            return;
        }
    };

    for attempt in 0..config.max_attempts {
        task.state = TaskState::InFlight { attempt };
        tracing::debug!("[{}] attempt {}/{}", task.ticker, attempt + 1, config.max_attempts);

        let attempt_result = tokio::select! {
            r = tokio::time::timeout(config.request_timeout, service.submit(&task.prompt)) => r,
            _ = shutdown_signalled(shutdown.clone()) => {
                record_cancelled(&mut task);
                return;
            }
        };

        let failure = match attempt_result {
            Ok(Ok(raw)) => {
                match validator.validate(&task.ticker, &raw, task.current_price) {
                    Ok(result) => {
                        task.state = TaskState::Succeeded;
                        tracing::info!(
                            "[{}] {} (confidence {:.0}%)",
                            task.ticker,
                            result.action.to_label(),
                            result.confidence * 100.0
                        );
                        outcomes.insert(task.ticker.clone(), AnalysisOutcome::Completed(result));
                    }
                    Err(reason) => {
                        // Schema violations do not improve with retries.
                        task.state = TaskState::PermanentlyFailed;
                        tracing::warn!("[{}] rejected reply: {reason}", task.ticker);
                        outcomes.insert(task.ticker.clone(), AnalysisOutcome::Failed(reason));
                    }
                }
                return;
            }
            Ok(Err(failure)) => failure,
            Err(_) => ServiceFailure::Timeout,
        };

        if attempt + 1 < config.max_attempts {
            let hint = match &failure {
                ServiceFailure::RateLimited(message) => parse_retry_hint(message),
                _ => None,
            };
            let delay = backoff_delay(config.backoff_base, config.backoff_factor, attempt, hint);
            task.state = TaskState::RetryScheduled { attempt, delay };
            tracing::warn!(
                "[{}] attempt {}/{} failed ({failure}), retrying in {delay:?}",
                task.ticker,
                attempt + 1,
                config.max_attempts
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_signalled(shutdown.clone()) => {
                    record_cancelled(&mut task);
                    return;
                }
            }
        } else {
            task.state = TaskState::PermanentlyFailed;
            tracing::error!(
                "[{}] giving up after {} attempts: {failure}",
                task.ticker,
                config.max_attempts
            );
            outcomes.insert(
                task.ticker.clone(),
                AnalysisOutcome::Failed(FailureReason::RetriesExhausted(failure.to_string())),
            );
            return;
        }
    }
}
