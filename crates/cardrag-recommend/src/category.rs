//! Spending-category inference from the query text.

use cardrag_core::config::CategoryRule;

pub const FALLBACK_ID: &str = "spending";
pub const FALLBACK_LABEL: &str = "消費";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category<'a> {
    pub id: &'a str,
    pub label: &'a str,
}

/// Ordered keyword table; the first rule with a keyword contained in the
/// query wins. Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    rules: Vec<CategoryRule>,
}

impl CategoryTable {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| CategoryRule { keywords: r.keywords.iter().map(|k| k.to_lowercase()).collect(), ..r })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn infer(&self, query: &str) -> Category<'_> {
        let query = query.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.keywords.iter().any(|k| !k.is_empty() && query.contains(k.as_str())))
            .map(|r| Category { id: &r.id, label: &r.label })
            .unwrap_or(Category { id: FALLBACK_ID, label: FALLBACK_LABEL })
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::new(cardrag_core::config::default_categories())
    }
}
