//! Main module for the Olympiq CLI application.
//!
//! Loads the Winter Olympics article sections into memory, then answers
//! questions about them with retrieval-augmented chat completion.
//!
//! # Examples
//!
//! ```sh
//! olympiq init
//! OPENAI_API_KEY=sk-... olympiq
//! olympiq ask "Which athletes won the gold medal in curling?" --limit 3
//! olympiq load
//! ```

use clap::Parser;
use once_cell::sync::OnceCell;
use std::{
    error::Error,
    fs,
    io::{stdin, stdout},
    path::Path,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use olympiq::{
    api::OpenAiProvider,
    commands::{Cli, Commands, SearchArgs},
    config::{API_KEY_ENV, OlympiqConfig, load_config},
    config_dir,
    error::ConfigError,
    ingest::{CsvLoader, IngestReport},
    pretty,
    qa::{self, QuerySettings},
    retriever::SemanticMemory,
    template::{self, PromptTemplate},
    vector_store::MemoryStore,
};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Parse the command line, load configuration and dispatch.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config_dir()?.join("config.yaml"),
    };
    let command = cli.command.unwrap_or_default();

    if command == Commands::Init {
        debug!("Initializing configuration");
        return init(&config_path);
    }

    let config = if config_path.exists() {
        load_config(&config_path.to_string_lossy())?
    } else {
        info!("No config at {}, using defaults", config_path.display());
        OlympiqConfig::default().with_api_key_fallback(std::env::var(API_KEY_ENV).ok())
    };
    config.validate()?;
    debug!(model = %config.model, embedding_model = %config.embedding_model, "config loaded");

    let store = MemoryStore::new();
    let report = load_articles(&config, &store).await?;
    print_report(&report);
    if report.cancelled || command == Commands::Load {
        return Ok(());
    }

    let provider = OpenAiProvider::from_config(&config);
    let memory = SemanticMemory::new(&store, &provider);

    match command {
        Commands::Ask { question, search } => {
            let template = prompt_template(&config, &search).await?;
            let settings = settings(&config, &search)?;
            let answer = qa::answer_question(&memory, &provider, &template, &settings, &question).await?;
            let mut out = stdout();
            for (rank, hit) in answer.matches.iter().enumerate() {
                pretty::print_match(&mut out, rank, hit)?;
            }
            pretty::print_answer(&mut out, &answer.question, &answer.response)?;
        }
        Commands::Interactive { search } => {
            let template = prompt_template(&config, &search).await?;
            let settings = settings(&config, &search)?;
            let answered = qa::run_interactive(
                &memory,
                &provider,
                &template,
                &settings,
                stdin().lock(),
                &mut stdout(),
            )
            .await?;
            info!(answered, "interactive session finished");
        }
        Commands::Load | Commands::Init => {}
    }

    Ok(())
}

/// Ingest the configured CSV, downloading it first when missing.
///
/// Ctrl-C stops the load between rows; whatever was loaded stays in `store`.
async fn load_articles(config: &OlympiqConfig, store: &MemoryStore) -> Result<IngestReport, Box<dyn Error>> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let spinner = pretty::loading_spinner();
    let loader = CsvLoader::from_config(config);
    let result = loader
        .initialize(store, &config.collection_name, &cancel, |progress| {
            spinner.set_message(pretty::loading_message(progress))
        })
        .await;
    watcher.abort();
    spinner.finish_and_clear();

    Ok(result?)
}

fn print_report(report: &IngestReport) {
    for skipped in &report.skipped {
        warn!(row = skipped.row, "{}", skipped.reason);
    }
    if report.cancelled {
        println!(
            "Loading cancelled after {} memory records.",
            report.ingested
        );
    } else if report.skipped.is_empty() {
        println!("Loaded {} memory records.", report.ingested);
    } else {
        println!(
            "Loaded {} memory records, skipped {} malformed rows.",
            report.ingested,
            report.skipped.len()
        );
    }
}

fn settings(config: &OlympiqConfig, search: &SearchArgs) -> Result<QuerySettings, ConfigError> {
    QuerySettings::from_config(config).with_overrides(search.limit, search.min_relevance)
}

async fn prompt_template(config: &OlympiqConfig, search: &SearchArgs) -> Result<PromptTemplate, Box<dyn Error>> {
    match search.template.as_ref().or(config.template.as_ref()) {
        Some(name) => template::load_template(name).await,
        None => Ok(PromptTemplate::default()),
    }
}

/// Write a default configuration and prompt template.
///
/// An existing config file is left alone; the API key is left blank so
/// `OPENAI_API_KEY` is used until one is filled in.
fn init(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let templates = config_dir()?.join("templates");
    info!("Creating template config directory: {}", templates.display());
    fs::create_dir_all(&templates)?;

    let template_path = templates.join("default.yaml");
    info!("Creating template file: {}", template_path.display());
    fs::write(&template_path, serde_yaml::to_string(&PromptTemplate::default())?)?;

    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }
    if let Some(dir) = config_path.parent() {
        fs::create_dir_all(dir)?;
    }
    info!("Creating config file: {}", config_path.display());
    fs::write(config_path, serde_yaml::to_string(&OlympiqConfig::default())?)?;
    println!("Wrote {}", config_path.display());

    Ok(())
}
