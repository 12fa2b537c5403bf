//! User-turn prompt assembly.

use cardrag_core::{OwnedCardSet, ScoredMatch};

use crate::category::Category;

/// Numbered grounding context, one block per match in ranked order.
pub fn render_context(matches: &[ScoredMatch]) -> String {
    matches
        .iter()
        .enumerate()
        .map(|(i, m)| format!("【卡片 {}】\n{}", i + 1, m.document.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_owned(owned: &OwnedCardSet) -> String {
    owned.iter().map(|c| format!("- {}", c)).collect::<Vec<_>>().join("\n")
}

pub fn build_user_prompt(query: &str, owned: &OwnedCardSet, category: &Category<'_>, matches: &[ScoredMatch]) -> String {
    format!(
        "使用者問題: {query}\n\n\
使用者持有的信用卡:\n{owned}\n\n\
消費類別: {category}\n\n\
相關卡片資料:\n{context}\n\n\
請根據以上資料,從使用者持有的信用卡中推薦最適合「{category}」消費的卡片,並說明理由。",
        query = query,
        owned = render_owned(owned),
        category = category.label,
        context = render_context(matches),
    )
}
