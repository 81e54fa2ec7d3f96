use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use screener_core::PromptPayload;

/// Lifecycle of one instrument's analysis task.
///
/// Pending -> InFlight -> Succeeded
///                     -> RetryScheduled -> InFlight -> ...
///                     -> PermanentlyFailed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InFlight { attempt: u32 },
    RetryScheduled { attempt: u32, delay: Duration },
    Succeeded,
    PermanentlyFailed,
}

/// One unit of work: a single instrument's pending call to the reasoning
/// service. Owned exclusively by its worker until a terminal state.
#[derive(Debug)]
pub struct AnalysisTask {
    pub ticker: String,
    pub prompt: PromptPayload,
    pub current_price: f64,
    pub index: usize,
    pub state: TaskState,
}

impl AnalysisTask {
    pub fn new(index: usize, ticker: String, prompt: PromptPayload, current_price: f64) -> Self {
        Self {
            ticker,
            prompt,
            current_price,
            index,
            state: TaskState::Pending,
        }
    }
}

/// Delay before a task's first attempt, spreading load evenly across the
/// concurrency window instead of bursting.
pub fn stagger_delay(index: usize, concurrency: usize, interval: Duration) -> Duration {
    interval * (index % concurrency.max(1)) as u32
}

/// Exponential backoff delay for the given zero-based attempt, raised to a
/// provider-supplied retry-after hint when one is larger.
pub fn backoff_delay(
    base: Duration,
    factor: f64,
    attempt: u32,
    hint: Option<Duration>,
) -> Duration {
    let scaled = base.mul_f64(factor.powi(attempt as i32));
    match hint {
        Some(h) if h > scaled => h,
        _ => scaled,
    }
}

/// Pull a "retry in Ns" style hint out of rate-limit error text.
pub fn parse_retry_hint(message: &str) -> Option<Duration> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN
        .get_or_init(|| Regex::new(r"(?i)retry.*?(\d+)(?:\.\d+)?s").expect("valid retry pattern"));
    let captures = re.captures(message)?;
    let seconds: u64 = captures.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_secs(seconds + 1))
}
