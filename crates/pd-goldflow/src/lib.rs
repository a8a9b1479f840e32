//! Goldflow — the staged review-and-delivery pipeline executor.

pub mod delivery;
pub mod error;
pub mod executor;
pub mod types;

pub use delivery::{delivery_pipeline, RETURN_TO_MINER};
pub use error::GoldflowError;
pub use executor::{resolve_input, Advance, PipelineExecutor, StageRunner, StageStatus};
pub use types::{Pipeline, Stage, StageRunnerRef, Trigger};
