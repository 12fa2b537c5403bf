//! Domain types shared by the index and the recommendation engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Marker used for reward periods without a fixed start or end date.
pub const LONG_TERM: &str = "long-term";

/// The set of card names one caller owns.
///
/// Ordered so that prompts and digests render the same way every time.
pub type OwnedCardSet = BTreeSet<String>;

/// Structured attributes of one card.
///
/// `card_name` is unique across a corpus and is the key used to join
/// index entries, owned-card sets and catalog lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMetadata {
    pub card_name: String,
    pub bank: String,
    pub annual_fee: u32,
    pub requires_app_switch: bool,
    pub app_switch_info: String,
    pub start_date: String,
    pub end_date: String,
    pub notes: String,
}

/// One card's reward-program description plus its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDocument {
    pub content: String,
    pub metadata: CardMetadata,
}

impl CardDocument {
    pub fn card_name(&self) -> &str {
        &self.metadata.card_name
    }

    /// True when the reward program has no fixed end date.
    pub fn is_long_term(&self) -> bool {
        self.metadata.end_date == LONG_TERM
    }
}

/// A document returned by a similarity search.
///
/// `score` is higher-is-better; `ordinal` is the document's position in the
/// corpus the index was built from and breaks ties between equal scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub document: CardDocument,
    pub score: f32,
    pub ordinal: usize,
}

impl ScoredMatch {
    pub fn card_name(&self) -> &str {
        self.document.card_name()
    }
}
