pub mod picks;
pub mod prompt;
pub mod runner;
pub mod service;
pub mod task;
pub mod validator;


pub use picks::{top_picks, TopPick};
pub use prompt::{build_prompt, PromptContext, SYSTEM_PROMPT};
pub use runner::{AnalysisOrchestrator, AnalysisRequest, OrchestratorConfig, PassReport};
pub use service::HttpReasoningService;
pub use task::{AnalysisTask, TaskState};
pub use validator::{ResponseValidator, ValidatorConfig};
