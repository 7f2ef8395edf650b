use std::path::PathBuf;
use unikb::cli::{Cli, Commands, ConfigAction};
use unikb::config::{Config, ConfigValidator};
use unikb::embedding::build_provider;
use unikb::error::{KbError, Result};
use unikb::storage::expand_path;
use unikb::{IngestOutcome, KbState, KnowledgeBase};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Ingest { dir } => {
            cmd_ingest(cli.config, cli.profile, dir)?;
        }
        Commands::Search {
            query,
            top_k,
            json,
        } => {
            cmd_search(cli.config, cli.profile, &query, top_k, json)?;
        }
        Commands::Status => {
            cmd_status(cli.config, cli.profile)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "unikb=debug" } else { "unikb=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn open_knowledge_base(config: Config) -> Result<KnowledgeBase> {
    let provider = build_provider(&config.embedding)?;
    KnowledgeBase::open(config, provider)
}

fn cmd_ingest(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    dir: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let corpus_dir = expand_path(dir.as_deref().unwrap_or(config.storage.corpus_dir.as_path()))?;

    if !corpus_dir.exists() {
        std::fs::create_dir_all(&corpus_dir).map_err(|e| KbError::Io {
            source: e,
            context: format!("Failed to create corpus directory: {:?}", corpus_dir),
        })?;
        println!("Created corpus directory: {}", corpus_dir.display());
        println!("  Put your .txt documents there and run 'unikb ingest' again.");
        return Ok(());
    }

    println!("Ingesting documents from {}...", corpus_dir.display());
    let kb = open_knowledge_base(config)?;

    match kb.ingest(&corpus_dir)? {
        IngestOutcome::EmptyCorpus => {
            println!("Nothing to ingest: no .txt documents with content found");
        }
        IngestOutcome::Ingested(stats) => {
            println!("✓ Knowledge base rebuilt");
            println!("  Documents: {}", stats.documents);
            println!("  Chunks: {}", stats.chunks);
            println!("  Dimension: {}", stats.dimension);
            println!("  Time: {:.2}s", stats.duration_ms as f64 / 1000.0);
        }
    }

    Ok(())
}

fn cmd_search(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    query: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let kb = open_knowledge_base(config)?;

    if kb.state() == KbState::Uninitialized {
        tracing::warn!("Knowledge base is empty. Run 'unikb ingest' first.");
    }

    if json {
        let chunks = kb.retrieve(query, top_k)?;
        let output = serde_json::to_string_pretty(&chunks).map_err(|e| KbError::Json {
            source: e,
            context: "Failed to serialize search results".to_string(),
        })?;
        println!("{}", output);
    } else {
        println!("{}", kb.search(query, top_k));
    }

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let kb = open_knowledge_base(config)?;

    println!("unikb Status");
    println!("============");

    match kb.state() {
        KbState::Uninitialized => println!("\nState: Uninitialized"),
        KbState::Ready { chunks } => {
            println!("\nState: Ready");
            println!("Chunks: {}", chunks);
        }
    }

    println!("Embedding model: {}", kb.embedding_model());
    println!("Index kind: {}", kb.config().index.kind);
    println!("Index file: {}", kb.paths().index.display());
    println!("Metadata file: {}", kb.paths().metadata.display());

    if let Some(manifest) = kb.manifest() {
        println!("Generation: {}", manifest.generation);
        println!(
            "Built: {}",
            manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = toml::Value::try_from(&config)?;

            let shown = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    KbError::Config(format!("Unknown configuration section '{}'", section))
                })?,
                None => value,
            };

            println!("{}", toml::to_string_pretty(&shown)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| KbError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let mut config = Config::default();
            config.storage.data_dir = Config::default_data_dir()?;
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'unikb config init' to create one."
        );
        let mut config = Config::default();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
