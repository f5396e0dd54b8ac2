pub mod collectors;
pub mod generator;
pub mod interactions;
pub mod retrieval;
pub mod scoring;

pub use generator::{EngineConfig, RecommendationEngine, RefreshSummary};
