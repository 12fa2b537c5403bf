//! Turns catalog rows into the documents the index is built from.
//!
//! Rows are read from a JSON array; field names accept both the English keys
//! and the column headers of the reward spreadsheet export.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::types::{CardDocument, CardMetadata, LONG_TERM};

const NO_SWITCH_NEEDED: &str = "無需切換";
const LONG_TERM_LABEL: &str = "長期";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// One raw catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    #[serde(alias = "信用卡名稱")]
    pub name: String,
    #[serde(alias = "銀行")]
    pub bank: String,
    #[serde(alias = "回饋方案")]
    pub reward_plan: String,
    #[serde(alias = "APP切換方案", default)]
    pub app_switch_plan: String,
    #[serde(alias = "回饋開始日", default)]
    pub start_date: String,
    #[serde(alias = "回饋到期日", default)]
    pub end_date: String,
    #[serde(alias = "年費", default)]
    pub annual_fee: Option<u32>,
    #[serde(alias = "備註", default)]
    pub notes: String,
}

impl CardRecord {
    pub fn requires_app_switch(&self) -> bool {
        let plan = self.app_switch_plan.trim();
        !plan.is_empty() && plan != NO_SWITCH_NEEDED
    }

    pub fn to_document(&self) -> CardDocument {
        let fee = self.annual_fee.unwrap_or(0);
        let content = format!(
            "信用卡名稱: {name}\n發卡銀行: {bank}\n\n回饋方案:\n{reward}\n\nAPP切換說明:\n{switch}\n\n年費: {fee}元\n\n備註: {notes}\n\n回饋期間: {start} 至 {end}",
            name = self.name.trim(),
            bank = self.bank.trim(),
            reward = self.reward_plan.trim(),
            switch = self.app_switch_plan.trim(),
            fee = fee,
            notes = self.notes.trim(),
            start = display_date(&self.start_date),
            end = display_date(&self.end_date),
        );
        CardDocument {
            content,
            metadata: CardMetadata {
                card_name: self.name.trim().to_string(),
                bank: self.bank.trim().to_string(),
                annual_fee: fee,
                requires_app_switch: self.requires_app_switch(),
                app_switch_info: self.app_switch_plan.trim().to_string(),
                start_date: normalize_date(&self.start_date),
                end_date: normalize_date(&self.end_date),
                notes: self.notes.trim().to_string(),
            },
        }
    }
}

fn is_long_term(raw: &str) -> bool {
    let s = raw.trim();
    s.is_empty() || s == LONG_TERM_LABEL || s == LONG_TERM || s.eq_ignore_ascii_case("nan")
}

fn normalize_date(raw: &str) -> String {
    if is_long_term(raw) { LONG_TERM.to_string() } else { raw.trim().to_string() }
}

fn display_date(raw: &str) -> String {
    if is_long_term(raw) { LONG_TERM_LABEL.to_string() } else { raw.trim().to_string() }
}

#[derive(Debug, Default)]
pub struct DataProcessor {
    records: Vec<CardRecord>,
}

impl DataProcessor {
    pub fn new(records: Vec<CardRecord>) -> Self {
        Self { records }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading corpus {}", path.display()))?;
        let records: Vec<CardRecord> =
            serde_json::from_str(&raw).with_context(|| format!("parsing corpus {}", path.display()))?;
        info!(count = records.len(), path = %path.display(), "loaded card records");
        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[CardRecord] {
        &self.records
    }

    /// Rejects blank and duplicate card names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (i, r) in self.records.iter().enumerate() {
            let name = r.name.trim();
            if name.is_empty() {
                return Err(anyhow!("record {} has an empty card name", i));
            }
            if !seen.insert(name) {
                return Err(anyhow!("duplicate card name '{}'", name));
            }
        }
        Ok(())
    }

    /// Documents in catalog order.
    pub fn prepare_documents(&self) -> Result<Vec<CardDocument>> {
        self.validate()?;
        let documents: Vec<CardDocument> = self.records.iter().map(CardRecord::to_document).collect();
        info!(count = documents.len(), "prepared card documents");
        Ok(documents)
    }

    /// Names of cards whose reward period ended before `today`.
    pub fn expired_cards(&self, today: NaiveDate) -> Vec<String> {
        let mut expired = Vec::new();
        for r in &self.records {
            if is_long_term(&r.end_date) {
                continue;
            }
            match NaiveDate::parse_from_str(r.end_date.trim(), DATE_FORMAT) {
                Ok(end) if end < today => expired.push(r.name.trim().to_string()),
                Ok(_) => {}
                Err(_) => warn!(card = %r.name, end_date = %r.end_date, "unparsable reward end date"),
            }
        }
        if !expired.is_empty() {
            warn!(count = expired.len(), cards = ?expired, "expired reward programs in corpus");
        }
        expired
    }

    pub fn card_names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.trim().to_string()).collect()
    }

    pub fn card_by_name(&self, name: &str) -> Option<CardDocument> {
        self.records.iter().find(|r| r.name.trim() == name).map(CardRecord::to_document)
    }
}
