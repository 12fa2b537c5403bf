use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cardrag_core::config::{AppConfig, Config};
use cardrag_core::data_processor::DataProcessor;
use cardrag_core::OwnedCardStore;
use cardrag_embed::get_default_embedder;
use cardrag_index::SemanticIndex;
use cardrag_recommend::{GeminiBackend, MemoryCardStore, Orchestrator, OrchestratorState};

#[derive(Debug, Parser)]
#[command(name = "cardrag", version, about = "Recommend which of your credit cards to use")]
struct Cli {
    /// Directory holding config.toml (paths in it are resolved from here).
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build or replace the index from a JSON card catalog.
    Ingest { corpus: PathBuf },
    /// Print index status as JSON.
    Status,
    /// Ask which owned card fits a spending scenario.
    Ask {
        #[arg(long)]
        user: String,
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Show the full reward description of one card.
    Describe { name: String },
    /// Summarize a user's cards.
    Summary {
        #[arg(long)]
        user: String,
    },
    /// Manage a user's owned cards.
    #[command(subcommand)]
    Cards(CardsCommand),
    /// Delete the persisted index.
    Drop,
}

#[derive(Debug, Subcommand)]
enum CardsCommand {
    Add(CardArgs),
    Remove(CardArgs),
    List(UserArgs),
    Clear(UserArgs),
}

#[derive(Debug, Args)]
struct UserArgs {
    #[arg(long)]
    user: String,
}

#[derive(Debug, Args)]
struct CardArgs {
    #[arg(long)]
    user: String,
    name: String,
}

struct App {
    config: AppConfig,
    orchestrator: Orchestrator,
    store: MemoryCardStore,
}

impl App {
    fn open(config_dir: &std::path::Path) -> Result<Self> {
        let config = Config::load_from(config_dir)?;
        let mut app = config.app()?;
        if app.generation.api_key.is_empty() {
            if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
                app.generation.api_key = key;
            }
        }
        let embedder = get_default_embedder(&app.embedding, config.base_dir())?;
        let index = Arc::new(SemanticIndex::new(config.resolve(&app.index.dir), &app.index.table, embedder));
        let timeout = Duration::from_secs(app.recommend.generation_timeout_secs);
        let backend = Arc::new(GeminiBackend::new(app.generation.clone(), timeout)?);
        let store = MemoryCardStore::open(&config.resolve(&app.store.path))?;
        let orchestrator = Orchestrator::new(index, backend, &app);
        Ok(Self { config: app, orchestrator, store })
    }

    async fn ready(&self) -> Result<()> {
        if self.orchestrator.initialize(None).await? == OrchestratorState::Uninitialized {
            bail!("no index at {}; run `cardrag ingest <corpus.json>` first", self.config.index.dir);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let app = App::open(&cli.config_dir)?;

    match cli.command {
        Commands::Ingest { corpus } => {
            let processor = DataProcessor::from_json_file(&corpus)?;
            let expired = processor.expired_cards(chrono::Local::now().date_naive());
            if !expired.is_empty() {
                println!("⚠️  回饋已到期: {}", expired.join(", "));
            }
            let documents = processor.prepare_documents()?;
            let handle = app.orchestrator.rebuild(documents).await?;
            info!(documents = handle.len(), "ingest complete");
            println!("✅ Indexed {} cards", handle.len());
        }
        Commands::Status => {
            if let Err(e) = app.orchestrator.initialize(None).await {
                warn!(error = %e, "index could not be loaded");
            }
            println!("{}", serde_json::to_string_pretty(&app.orchestrator.status())?);
        }
        Commands::Ask { user, query } => {
            app.ready().await?;
            let query = query.join(" ");
            let owned = app.store.list(&user)?;
            let rec = app.orchestrator.recommend(&query, &owned).await?;
            println!("{}", rec.text);
        }
        Commands::Describe { name } => {
            app.ready().await?;
            match app.orchestrator.describe(&name).await? {
                Some(content) => println!("{}", content),
                None => println!("❌ 找不到「{}」的資料", name),
            }
        }
        Commands::Summary { user } => {
            app.ready().await?;
            let owned = app.store.list(&user)?;
            println!("{}", app.orchestrator.summarize(&owned).await?);
        }
        Commands::Cards(cmd) => cards(&app, cmd).await?,
        Commands::Drop => {
            app.orchestrator.index().drop_index().await?;
            println!("🗑️  Index dropped");
        }
    }
    Ok(())
}

async fn cards(app: &App, cmd: CardsCommand) -> Result<()> {
    match cmd {
        CardsCommand::Add(CardArgs { user, name }) => {
            app.ready().await?;
            let names = app.orchestrator.card_names()?;
            if !names.contains(&name) {
                let suggestions = app.orchestrator.suggest(&name)?;
                if suggestions.is_empty() {
                    bail!("「{}」不在信用卡資料中", name);
                }
                println!("❓ 找不到「{}」,您是指:", name);
                for s in suggestions {
                    println!("  - {}", s);
                }
                return Ok(());
            }
            if app.store.add(&user, &name)? {
                println!("✅ 已新增 {}", name);
            } else {
                println!("ℹ️  {} 已經在您的卡片清單中", name);
            }
        }
        CardsCommand::Remove(CardArgs { user, name }) => {
            if app.store.remove(&user, &name)? {
                println!("✅ 已移除 {}", name);
            } else {
                println!("ℹ️  您沒有 {}", name);
            }
        }
        CardsCommand::List(UserArgs { user }) => {
            let owned = app.store.list(&user)?;
            if owned.is_empty() {
                println!("{}", app.config.messages.summary_empty);
            }
            for (i, name) in owned.iter().enumerate() {
                println!("{}. {}", i + 1, name);
            }
        }
        CardsCommand::Clear(UserArgs { user }) => {
            let n = app.store.clear(&user)?;
            println!("🗑️  已清除 {} 張卡片", n);
        }
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
