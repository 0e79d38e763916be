pub mod client_id;
pub mod clock;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod generation;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod orchestrator;
pub mod prompt;
pub mod request;
pub mod response;
pub mod server;
pub mod usage_record;
pub mod usage_tracker;

pub use config::Config;
pub use error::{Error, FailureKind, Result};
pub use generation::{GeminiClient, GenerationError, GenerationResult, ReplyGenerator};
pub use orchestrator::{GeneratedReply, ReplyService};
pub use request::GenerationRequest;
pub use server::{create_app, AppState, Server};
pub use usage_tracker::{QuotaPolicy, UsageSnapshot, UsageTracker};
