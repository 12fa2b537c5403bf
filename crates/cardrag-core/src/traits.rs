use crate::types::OwnedCardSet;

/// Maps text to fixed-length vectors.
///
/// Implementations must be deterministic: the same text always yields the
/// same vector, and `id` changes whenever the mapping would.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model/mapping (e.g. `hashing:d384`).
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Per-user storage of owned card names.
pub trait OwnedCardStore: Send + Sync {
    /// Returns false when the card was already registered.
    fn add(&self, user: &str, card: &str) -> anyhow::Result<bool>;
    /// Returns false when the card was not registered.
    fn remove(&self, user: &str, card: &str) -> anyhow::Result<bool>;
    fn list(&self, user: &str) -> anyhow::Result<OwnedCardSet>;
    /// Returns the number of cards removed.
    fn clear(&self, user: &str) -> anyhow::Result<usize>;
    fn count(&self, user: &str) -> anyhow::Result<usize>;
}
