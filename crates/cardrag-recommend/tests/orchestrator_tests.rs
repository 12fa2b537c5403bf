use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cardrag_core::config::AppConfig;
use cardrag_core::data_processor::CardRecord;
use cardrag_core::{CardDocument, GenerationError, IndexError, OwnedCardSet};
use cardrag_embed::HashingEmbedder;
use cardrag_index::SemanticIndex;
use cardrag_recommend::{
    FailureKind, GenerationBackend, GenerationRequest, Orchestrator, OrchestratorState, RecommendationKind,
};
use tempfile::TempDir;

enum Script {
    Reply(String),
    Fail(GenerationError),
    Hang,
}

/// Stands in for the network: answers every request from a fixed script.
struct ScriptedBackend {
    script: Script,
    calls: AtomicUsize,
    last: Mutex<Option<GenerationRequest>>,
}

impl ScriptedBackend {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self { script, calls: AtomicUsize::new(0), last: Mutex::new(None) })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> String {
        self.last.lock().unwrap().as_ref().map(|r| r.user_prompt.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request.clone());
        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Fail(err) => Err(err.clone()),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("too late".to_string())
            }
        }
    }
}

fn card(name: &str, bank: &str, plan: &str, switch: &str, end: &str, fee: u32) -> CardDocument {
    CardRecord {
        name: name.to_string(),
        bank: bank.to_string(),
        reward_plan: plan.to_string(),
        app_switch_plan: switch.to_string(),
        start_date: "2025-01-01".to_string(),
        end_date: end.to_string(),
        annual_fee: Some(fee),
        notes: String::new(),
    }
    .to_document()
}

fn corpus() -> Vec<CardDocument> {
    vec![
        card("中國信託中油聯名卡", "中國信託", "中油加油 每公升折 1.2 元 加油回饋", "無需切換", "長期", 1200),
        card("台新Richart卡", "台新銀行", "網購 蝦皮 momo 3.3% 回饋", "需於Richart APP切換「Pay著刷」", "2026-06-30", 0),
        card("滙豐匯鑽卡", "滙豐銀行", "餐廳 美食 外送 6% 回饋", "無需切換", "長期", 0),
        card("國泰CUBE卡", "國泰世華", "Netflix 影音 串流 訂閱 3% 回饋", "需於CUBE App切換權益", "長期", 1800),
    ]
}

fn owned(names: &[&str]) -> OwnedCardSet {
    names.iter().map(|n| n.to_string()).collect()
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.recommend.generation_timeout_secs = 1;
    config
}

fn orchestrator(tmp: &TempDir, backend: Arc<ScriptedBackend>, config: &AppConfig) -> Orchestrator {
    let index = Arc::new(SemanticIndex::new(tmp.path().join("index"), "cards", Arc::new(HashingEmbedder::new(1024, 256))));
    Orchestrator::new(index, backend, config)
}

async fn ready(tmp: &TempDir, backend: Arc<ScriptedBackend>, config: &AppConfig) -> Orchestrator {
    let orch = orchestrator(tmp, backend, config);
    assert_eq!(orch.initialize(Some(corpus())).await.expect("initialize"), OrchestratorState::Ready);
    orch
}

#[tokio::test]
async fn empty_ownership_short_circuits_even_before_initialize() {
    let tmp = TempDir::new().unwrap();
    let backend = ScriptedBackend::new(Script::Reply("unused".to_string()));
    let orch = orchestrator(&tmp, backend.clone(), &config());
    assert_eq!(orch.state(), OrchestratorState::Uninitialized);

    let rec = orch.recommend("我要去加油", &OwnedCardSet::new()).await.expect("recommend");
    assert_eq!(rec.kind, RecommendationKind::NoCards);
    assert_eq!(rec.text, AppConfig::default().messages.no_cards);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn recommend_before_initialize_is_not_initialized() {
    let tmp = TempDir::new().unwrap();
    let orch = orchestrator(&tmp, ScriptedBackend::new(Script::Reply("x".to_string())), &config());
    let err = orch.recommend("加油", &owned(&["國泰CUBE卡"])).await.unwrap_err();
    assert!(matches!(err, IndexError::NotInitialized));
}

#[tokio::test]
async fn initialize_without_index_or_corpus_stays_uninitialized() {
    let tmp = TempDir::new().unwrap();
    let orch = orchestrator(&tmp, ScriptedBackend::new(Script::Reply("x".to_string())), &config());
    assert_eq!(orch.initialize(None).await.expect("initialize"), OrchestratorState::Uninitialized);
}

#[tokio::test]
async fn initialize_loads_an_existing_index() {
    let tmp = TempDir::new().unwrap();
    ready(&tmp, ScriptedBackend::new(Script::Reply("x".to_string())), &config()).await;
    let again = orchestrator(&tmp, ScriptedBackend::new(Script::Reply("x".to_string())), &config());
    assert_eq!(again.initialize(None).await.expect("initialize"), OrchestratorState::Ready);
    assert_eq!(again.card_names().expect("names").len(), 4);
}

#[tokio::test]
async fn generated_answer_uses_owned_cards_only() {
    let tmp = TempDir::new().unwrap();
    let backend = ScriptedBackend::new(Script::Reply("推薦使用中國信託中油聯名卡".to_string()));
    let orch = ready(&tmp, backend.clone(), &config()).await;

    let mine = owned(&["中國信託中油聯名卡", "台新Richart卡", "國泰CUBE卡"]);
    let rec = orch.recommend_top("我要去加油", &mine, 1).await.expect("recommend");
    assert_eq!(rec.kind, RecommendationKind::Generated);
    assert_eq!(rec.text, "推薦使用中國信託中油聯名卡");
    assert_eq!(backend.calls(), 1);

    let prompt = backend.last_prompt();
    assert!(prompt.contains("使用者問題: 我要去加油"));
    assert!(prompt.contains("消費類別: 加油"));
    assert!(prompt.contains("- 中國信託中油聯名卡\n- 台新Richart卡\n- 國泰CUBE卡"));
    assert!(prompt.contains("【卡片 1】\n信用卡名稱: 中國信託中油聯名卡"));
    assert!(prompt.contains("【卡片 2】"));
    assert!(!prompt.contains("【卡片 3】"));
    assert!(!prompt.contains("滙豐匯鑽卡"));
}

#[tokio::test]
async fn owned_cards_outside_retrieval_depth_give_no_match() {
    let tmp = TempDir::new().unwrap();
    let mut config = config();
    config.recommend.retrieval_k = 1;
    let backend = ScriptedBackend::new(Script::Reply("unused".to_string()));
    let orch = ready(&tmp, backend.clone(), &config).await;

    let rec = orch.recommend("我要去加油", &owned(&["台新Richart卡"])).await.expect("recommend");
    assert_eq!(rec.kind, RecommendationKind::NoMatch);
    assert!(rec.text.contains("我要去加油"));
    assert_eq!(backend.calls(), 0);

    let rec = orch.recommend("網購", &owned(&["不存在的卡"])).await.expect("recommend");
    assert_eq!(rec.kind, RecommendationKind::NoMatch);
    assert!(rec.text.contains("「網購」"));
}

#[tokio::test]
async fn quota_failure_is_classified_and_bounded() {
    let tmp = TempDir::new().unwrap();
    let raw = format!("429 RESOURCE_EXHAUSTED {}", "x".repeat(500));
    let backend = ScriptedBackend::new(Script::Fail(GenerationError::new(raw)));
    let orch = ready(&tmp, backend, &config()).await;

    let rec = orch.recommend("網購要用哪張卡", &owned(&["台新Richart卡"])).await.expect("recommend");
    assert_eq!(rec.kind, RecommendationKind::Failed(FailureKind::QuotaExceeded));
    assert!(rec.text.contains("429 RESOURCE_EXHAUSTED"));
    assert!(rec.text.contains(&"x".repeat(50)));
    assert!(!rec.text.contains(&"x".repeat(100)));
}

#[tokio::test]
async fn auth_and_unknown_failures_use_their_templates() {
    let tmp = TempDir::new().unwrap();
    let messages = AppConfig::default().messages;

    let orch = ready(&tmp, ScriptedBackend::new(Script::Fail(GenerationError::with_status(403, "denied"))), &config()).await;
    let rec = orch.recommend("餐廳", &owned(&["滙豐匯鑽卡"])).await.expect("recommend");
    assert_eq!(rec.kind, RecommendationKind::Failed(FailureKind::AuthFailure));
    assert_eq!(rec.text, messages.auth_failure.replace("{detail}", "denied"));

    let tmp = TempDir::new().unwrap();
    let orch = ready(&tmp, ScriptedBackend::new(Script::Reply("   ".to_string())), &config()).await;
    let rec = orch.recommend("餐廳", &owned(&["滙豐匯鑽卡"])).await.expect("recommend");
    assert_eq!(rec.kind, RecommendationKind::Failed(FailureKind::Unknown));
    assert!(!rec.text.trim().is_empty());
}

#[tokio::test]
async fn generation_timeout_is_network_failure() {
    let tmp = TempDir::new().unwrap();
    let orch = ready(&tmp, ScriptedBackend::new(Script::Hang), &config()).await;
    let rec = orch.recommend("看 Netflix", &owned(&["國泰CUBE卡"])).await.expect("recommend");
    assert_eq!(rec.kind, RecommendationKind::Failed(FailureKind::NetworkFailure));
    assert_eq!(orch.state(), OrchestratorState::Ready);
}

#[tokio::test]
async fn abandoned_recommendation_leaves_orchestrator_ready() {
    let tmp = TempDir::new().unwrap();
    let backend = ScriptedBackend::new(Script::Hang);
    let orch = ready(&tmp, backend.clone(), &config()).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        orch.recommend("看 Netflix", &owned(&["國泰CUBE卡"])),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(backend.calls(), 1);

    assert_eq!(orch.state(), OrchestratorState::Ready);
    let status = orch.status();
    assert!(status.ready);
    assert!(!status.rebuilding);
    assert_eq!(status.document_count, 4);
    assert!(orch.describe("國泰CUBE卡").await.expect("describe").is_some());
    let rec = orch.recommend("網購", &OwnedCardSet::new()).await.expect("recommend");
    assert_eq!(rec.kind, RecommendationKind::NoCards);
}

#[tokio::test]
async fn describe_requires_exact_name() {
    let tmp = TempDir::new().unwrap();
    let orch = ready(&tmp, ScriptedBackend::new(Script::Reply("x".to_string())), &config()).await;

    let content = orch.describe("中國信託中油聯名卡").await.expect("describe").expect("found");
    assert!(content.contains("中國信託中油聯名卡"));
    assert!(orch.describe("不存在的卡").await.expect("describe").is_none());
}

#[tokio::test]
async fn summary_skips_unknown_cards() {
    let tmp = TempDir::new().unwrap();
    let orch = ready(&tmp, ScriptedBackend::new(Script::Reply("x".to_string())), &config()).await;

    let summary = orch.summarize(&owned(&["國泰CUBE卡", "不存在的卡"])).await.expect("summary");
    assert!(summary.starts_with("📊 您的信用卡分析 (共 2 張)"));
    assert!(summary.contains("💳 國泰CUBE卡\n   銀行: 國泰世華\n   年費: 1800元\n   APP切換: 需要\n   到期日: 長期"));
    assert!(!summary.contains("不存在的卡"));

    assert_eq!(orch.summarize(&OwnedCardSet::new()).await.expect("summary"), "您還沒有新增任何信用卡。");
}

#[tokio::test]
async fn suggestions_match_either_direction() {
    let tmp = TempDir::new().unwrap();
    let orch = ready(&tmp, ScriptedBackend::new(Script::Reply("x".to_string())), &config()).await;

    assert_eq!(orch.suggest("Richart").expect("suggest"), vec!["台新Richart卡".to_string()]);
    assert_eq!(orch.suggest("我有國泰CUBE卡喔").expect("suggest"), vec!["國泰CUBE卡".to_string()]);
    assert!(orch.suggest("  ").expect("suggest").is_empty());
}

#[tokio::test]
async fn rebuild_and_status_hooks() {
    let tmp = TempDir::new().unwrap();
    let orch = ready(&tmp, ScriptedBackend::new(Script::Reply("x".to_string())), &config()).await;
    assert_eq!(orch.status().document_count, 4);

    orch.rebuild(corpus()[..3].to_vec()).await.expect("rebuild");
    let status = orch.status();
    assert!(status.ready);
    assert_eq!(status.document_count, 3);
    assert!(status.last_rebuild.is_some());
    assert!(orch.describe("國泰CUBE卡").await.expect("describe").is_none());
}
