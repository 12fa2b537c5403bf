//! Shared domain types, traits, errors and configuration for the card
//! recommendation workspace.

pub mod config;
pub mod data_processor;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, GenerationError, IndexError, Result};
pub use traits::{Embedder, OwnedCardStore};
pub use types::{CardDocument, CardMetadata, OwnedCardSet, ScoredMatch, LONG_TERM};
