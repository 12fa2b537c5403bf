//! Card recommendation: retrieval over the semantic index, ownership
//! filtering, category inference, grounded prompting and failure
//! classification.

pub mod category;
pub mod failure;
pub mod generation;
pub mod orchestrator;
pub mod prompt;
pub mod store;

pub use category::{Category, CategoryTable};
pub use failure::FailureKind;
pub use generation::{GeminiBackend, GenerationBackend, GenerationRequest};
pub use orchestrator::{Orchestrator, OrchestratorState, Recommendation, RecommendationKind};
pub use store::MemoryCardStore;
