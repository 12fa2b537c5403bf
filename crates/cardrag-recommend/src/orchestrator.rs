use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use cardrag_core::config::{AppConfig, FailureKeywords, Messages, RecommendConfig};
use cardrag_core::{CardDocument, GenerationError, IndexError, OwnedCardSet, ScoredMatch, LONG_TERM};
use cardrag_index::{IndexHandle, IndexStatus, SemanticIndex};

use crate::category::{Category, CategoryTable};
use crate::failure::{self, FailureKind};
use crate::generation::{GenerationBackend, GenerationRequest};
use crate::prompt;

const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Uninitialized,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Generated,
    NoCards,
    NoMatch,
    Failed(FailureKind),
}

/// The answer to a recommendation request. `text` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub text: String,
}

/// Ties the semantic index to a generation backend.
///
/// Built once and shared behind an `Arc`; every call is independent.
pub struct Orchestrator {
    index: Arc<SemanticIndex>,
    backend: Arc<dyn GenerationBackend>,
    categories: CategoryTable,
    settings: RecommendConfig,
    failure_keywords: FailureKeywords,
    messages: Messages,
}

impl Orchestrator {
    pub fn new(index: Arc<SemanticIndex>, backend: Arc<dyn GenerationBackend>, config: &AppConfig) -> Self {
        Self {
            index,
            backend,
            categories: CategoryTable::new(config.categories.clone()),
            settings: config.recommend.clone(),
            failure_keywords: config.failure_keywords.clone(),
            messages: config.messages.clone(),
        }
    }

    pub fn index(&self) -> &Arc<SemanticIndex> {
        &self.index
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    pub fn state(&self) -> OrchestratorState {
        if self.index.is_ready() { OrchestratorState::Ready } else { OrchestratorState::Uninitialized }
    }

    /// Load the persisted index, or build it from `corpus` when there is none.
    ///
    /// Without a corpus a missing index leaves the orchestrator uninitialized.
    pub async fn initialize(&self, corpus: Option<Vec<CardDocument>>) -> Result<OrchestratorState, IndexError> {
        match self.index.load().await {
            Ok(handle) => info!(documents = handle.len(), "orchestrator ready (loaded index)"),
            Err(IndexError::NotFound(dir)) => match corpus {
                Some(corpus) => {
                    info!(dir = %dir.display(), "no persisted index; building from corpus");
                    let handle = self.index.build(corpus).await?;
                    info!(documents = handle.len(), "orchestrator ready (built index)");
                }
                None => warn!(dir = %dir.display(), "no persisted index and no corpus supplied"),
            },
            Err(e) => return Err(e),
        }
        Ok(self.state())
    }

    pub async fn rebuild(&self, corpus: Vec<CardDocument>) -> Result<Arc<IndexHandle>, IndexError> {
        self.index.rebuild(corpus).await
    }

    pub fn status(&self) -> IndexStatus {
        self.index.status()
    }

    /// Recommend with the configured `top_k`.
    pub async fn recommend(&self, query: &str, owned: &OwnedCardSet) -> Result<Recommendation, IndexError> {
        self.recommend_top(query, owned, self.settings.top_k).await
    }

    pub async fn recommend_top(&self, query: &str, owned: &OwnedCardSet, top_k: usize) -> Result<Recommendation, IndexError> {
        if owned.is_empty() {
            return Ok(Recommendation { kind: RecommendationKind::NoCards, text: self.messages.no_cards.clone() });
        }

        let hits = self.index.search(query, self.settings.retrieval_k).await?;
        let mut matches: Vec<ScoredMatch> = hits.into_iter().filter(|m| owned.contains(m.card_name())).collect();
        if matches.is_empty() {
            info!(query, owned = owned.len(), "no owned card among retrieved matches");
            return Ok(Recommendation { kind: RecommendationKind::NoMatch, text: self.messages.no_match.replace("{query}", query) });
        }
        matches.truncate(top_k.max(1).saturating_mul(2));

        let category = self.categories.infer(query);
        let request = GenerationRequest {
            system_instruction: self.messages.system_instruction.clone(),
            user_prompt: prompt::build_user_prompt(query, owned, &category, &matches),
        };
        info!(query, category = category.id, context = matches.len(), "requesting generation");
        Ok(self.generate(&request, &category).await)
    }

    async fn generate(&self, request: &GenerationRequest, category: &Category<'_>) -> Recommendation {
        let secs = self.settings.generation_timeout_secs;
        let outcome = match tokio::time::timeout(Duration::from_secs(secs), self.backend.generate(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GenerationError::timeout(format!("generation timed out after {}s", secs))),
        };
        let err = match outcome {
            Ok(text) if !text.trim().is_empty() => {
                return Recommendation { kind: RecommendationKind::Generated, text };
            }
            Ok(_) => GenerationError::new("generation returned empty text"),
            Err(e) => e,
        };
        let kind = failure::classify(&err, &self.failure_keywords);
        warn!(kind = ?kind, status = ?err.status, category = category.id, error = %err, "generation failed");
        Recommendation {
            kind: RecommendationKind::Failed(kind),
            text: failure::render(kind, &err, &self.messages, self.settings.error_excerpt_chars),
        }
    }

    /// The top match for `card_name`, if it is that card.
    async fn lookup(&self, card_name: &str) -> Result<Option<ScoredMatch>, IndexError> {
        let mut hits = self.index.search(card_name, 1).await?;
        Ok(hits.pop().filter(|m| m.card_name() == card_name))
    }

    /// Full document content of `card_name`, or `None` when it is not in the index.
    pub async fn describe(&self, card_name: &str) -> Result<Option<String>, IndexError> {
        Ok(self.lookup(card_name).await?.map(|m| m.document.content))
    }

    /// Short per-card overview of `owned`; unknown cards are skipped.
    pub async fn summarize(&self, owned: &OwnedCardSet) -> Result<String, IndexError> {
        if owned.is_empty() {
            return Ok(self.messages.summary_empty.clone());
        }
        let mut parts = vec![format!("📊 您的信用卡分析 (共 {} 張)", owned.len())];
        for name in owned {
            let Some(hit) = self.lookup(name).await? else { continue };
            let m = &hit.document.metadata;
            let end = if m.end_date == LONG_TERM { "長期" } else { m.end_date.as_str() };
            parts.push(format!(
                "💳 {}\n   銀行: {}\n   年費: {}元\n   APP切換: {}\n   到期日: {}",
                name,
                m.bank,
                m.annual_fee,
                if m.requires_app_switch { "需要" } else { "不需要" },
                end,
            ));
        }
        Ok(parts.join("\n\n"))
    }

    /// Every card name in the served index, in corpus order.
    pub fn card_names(&self) -> Result<Vec<String>, IndexError> {
        Ok(self.index.handle().ok_or(IndexError::NotInitialized)?.card_names())
    }

    /// Up to five catalog names that contain `fragment` or are contained in it.
    pub fn suggest(&self, fragment: &str) -> Result<Vec<String>, IndexError> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .card_names()?
            .into_iter()
            .filter(|name| name.contains(fragment) || fragment.contains(name.as_str()))
            .take(MAX_SUGGESTIONS)
            .collect())
    }
}
