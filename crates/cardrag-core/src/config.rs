//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_INDEX__DIR`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load `config.toml` and the `RUST_ENV` overlay from `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir: dir.to_path_buf() };
        config.app()?.validate()?;
        Ok(config)
    }

    /// Wrap an already-assembled figment (tests, embedding hosts).
    pub fn from_figment(figment: Figment, base_dir: &Path) -> Self {
        Self { figment, base_dir: base_dir.to_path_buf() }
    }

    /// The fully typed settings, validated.
    pub fn app(&self) -> anyhow::Result<AppConfig> {
        let app: AppConfig = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract configuration: {}", e))?;
        app.validate()?;
        Ok(app)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a configured path against the directory the config came from.
    pub fn resolve(&self, p: &str) -> PathBuf {
        resolve_with_base(&self.base_dir, p)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub recommend: RecommendConfig,
    pub categories: Vec<CategoryRule>,
    pub failure_keywords: FailureKeywords,
    pub messages: Messages,
    pub generation: GenerationConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.recommend.retrieval_k == 0 {
            return Err(Error::InvalidConfig("recommend.retrieval_k must be positive".into()));
        }
        if self.recommend.top_k == 0 {
            return Err(Error::InvalidConfig("recommend.top_k must be positive".into()));
        }
        if self.recommend.generation_timeout_secs == 0 {
            return Err(Error::InvalidConfig("recommend.generation_timeout_secs must be positive".into()));
        }
        if self.categories.is_empty() {
            return Err(Error::InvalidConfig("categories table is empty".into()));
        }
        if let Some(rule) = self.categories.iter().find(|r| r.keywords.is_empty()) {
            return Err(Error::InvalidConfig(format!("category '{}' has no keywords", rule.id)));
        }
        if self.index.table.trim().is_empty() {
            return Err(Error::InvalidConfig("index.table must not be empty".into()));
        }
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub dir: String,
    pub table: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { dir: "data/index".to_string(), table: "cards".to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Deterministic character n-gram hashing; no model files needed.
    Hashing,
    /// Local BGE-M3 (XLM-RoBERTa) model run with candle.
    BgeM3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model_dir: Option<String>,
    /// Vector width of the hashing embedder. The model backend reports its own.
    pub dim: usize,
    pub max_len: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { backend: EmbeddingBackend::Hashing, model_dir: None, dim: 384, max_len: 256 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// How many neighbours to retrieve before the ownership filter.
    pub retrieval_k: usize,
    pub top_k: usize,
    pub generation_timeout_secs: u64,
    /// Longest prefix of a raw backend error shown to the user.
    pub error_excerpt_chars: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self { retrieval_k: 10, top_k: 3, generation_timeout_secs: 30, error_excerpt_chars: 100 }
    }
}

/// One row of the category table: `id` is the stable name, `label` is what
/// the prompt shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: String,
    pub label: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(id: &str, label: &str, keywords: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// The ordered category table. Earlier rows win.
pub fn default_categories() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new("fuel", "加油", &["加油", "油錢", "中油", "台塑"]),
        CategoryRule::new("online-shopping", "網購", &["網購", "網路購物", "線上購物", "momo", "蝦皮", "pchome"]),
        CategoryRule::new("dining", "餐廳", &["餐廳", "吃飯", "用餐", "美食", "餐飲"]),
        // plain substring match: "ok" also fires inside Latin words such as "booking"
        CategoryRule::new("convenience-store", "超商", &["超商", "便利商店", "7-11", "全家", "ok", "萊爾富"]),
        CategoryRule::new("travel", "旅遊", &["旅遊", "旅行", "出國", "機票", "飯店"]),
        CategoryRule::new("streaming", "影音", &["影音", "netflix", "disney", "串流", "訂閱"]),
        CategoryRule::new("transit", "交通", &["交通", "高鐵", "台鐵", "uber", "計程車", "捷運"]),
    ]
}

/// Substring fallbacks for classifying generation failures, checked in field order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureKeywords {
    pub quota: Vec<String>,
    pub network: Vec<String>,
    pub auth: Vec<String>,
}

impl Default for FailureKeywords {
    fn default() -> Self {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        Self {
            quota: owned(&["quota", "429", "rate limit", "rate_limit", "resource_exhausted", "too many requests"]),
            network: owned(&["connection", "timeout", "timed out", "dns", "unreachable", "network"]),
            auth: owned(&["api key", "api_key", "credential", "unauthorized", "permission denied", "401", "403"]),
        }
    }
}

/// User-facing text. `{query}` and `{detail}` are substituted where noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub system_instruction: String,
    pub no_cards: String,
    /// Supports `{query}`.
    pub no_match: String,
    pub summary_empty: String,
    /// The four failure templates support `{detail}`.
    pub quota_exceeded: String,
    pub network_failure: String,
    pub auth_failure: String,
    pub unknown_failure: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            system_instruction: "你是一位專業的信用卡回饋顧問。只能根據提供的卡片資料回答,\
不得編造資料中沒有的回饋內容。請從使用者持有的信用卡中推薦最適合該消費情境的卡片,\
說明回饋比例、是否需要切換 APP、回饋期間與注意事項,並以繁體中文精簡回答。"
                .to_string(),
            no_cards: "📋 您還沒有新增任何信用卡。\n\n請先新增您持有的信用卡,我才能為您推薦最適合的卡片!".to_string(),
            no_match: "😅 您持有的信用卡中,沒有找到適合「{query}」的回饋方案。\n\n💡 建議您查看其他消費類型的回饋!".to_string(),
            summary_empty: "您還沒有新增任何信用卡。".to_string(),
            quota_exceeded: "⏳ 目前查詢次數已達上限,請稍候一分鐘後再試。\n(錯誤摘要:{detail})".to_string(),
            network_failure: "🌐 無法連線到推薦服務,請檢查網路連線後再試。\n(錯誤摘要:{detail})".to_string(),
            auth_failure: "🔑 推薦服務驗證失敗,請檢查 API 金鑰設定。\n(錯誤摘要:{detail})".to_string(),
            unknown_failure: "⚠️ 推薦服務暫時發生問題,請稍後再試。\n(錯誤摘要:{detail})".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: "data/owned_cards.json".to_string() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            recommend: RecommendConfig::default(),
            categories: default_categories(),
            failure_keywords: FailureKeywords::default(),
            messages: Messages::default(),
            generation: GenerationConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
