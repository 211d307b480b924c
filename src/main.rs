//! Main module for the Eque coaching CLI.
//!
//! Parses the command line, loads configuration, builds the methodology index once and
//! hands a session to the requested surface.
//!
//! # Examples
//!
//! ```sh
//! eque init
//! eque ask "How do I handle conflict?" --skill conflict-resolution --level intermediate
//! eque interactive --goal "Give clearer feedback"
//! eque retrieve "persuading my manager" -k 4
//! ```

use clap::Parser;
use once_cell::sync::OnceCell;
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use eque::{
    api::OpenAiCompletionClient,
    commands::{Cli, Commands},
    config::{self, CoachConfig, PLACEHOLDER_API_KEY},
    corpus, embeddings, interactive,
    prompt::PromptComposer,
    retriever::Retriever,
    session::SessionLoop,
    template::{self, CoachTemplate},
    vector_store::EmbeddingIndex,
};

static TRACING: OnceCell<()> = OnceCell::new();

const DEFAULT_TEMPLATE_NAME: &str = "coach";

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();
    });
    dotenvy::dotenv().ok();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Main asynchronous function of the Eque CLI.
///
/// # Errors
///
/// Returns an error if configuration or the index cannot be set up, or when a one-shot
/// `ask` fails. Interactive turn failures are reported without ending the session.
async fn run() -> Result<(), Box<dyn Error>> {
    let Cli {
        config,
        template,
        no_stream,
        command,
    } = Cli::parse();

    match command {
        Commands::Init => {
            debug!("Initializing configuration");
            init()?;
        }
        Commands::Ask {
            question,
            parameters,
        } => {
            let coach_config = load_coach_config(config, no_stream)?;
            let retriever = build_retriever(&coach_config).await?;
            let mut session = build_session(&coach_config, retriever, template)?
                .with_parameters(parameters.into_parameters())?;
            interactive::ask(&mut session, &question).await?;
        }
        Commands::Interactive { parameters } => {
            let coach_config = load_coach_config(config, no_stream)?;
            let retriever = build_retriever(&coach_config).await?;
            let mut session = build_session(&coach_config, retriever, template)?
                .with_parameters(parameters.into_parameters())?;
            interactive::interactive_mode(&mut session).await?;
        }
        Commands::Retrieve { query, k } => {
            let coach_config = load_coach_config(config, no_stream)?;
            let hits = build_retriever(&coach_config)
                .await?
                .with_top_k(k)
                .retrieve_scored(&query)
                .await?;
            for (rank, hit) in hits.iter().enumerate() {
                println!("{}. {} ({:.3})", rank + 1, hit.entry.title, hit.score);
            }
        }
    }

    Ok(())
}

/// Load, complete and validate the configuration before anything talks to the network.
fn load_coach_config(path: Option<PathBuf>, no_stream: bool) -> Result<CoachConfig, Box<dyn Error>> {
    let path = match path {
        Some(path) => path,
        None => eque::config_dir()?.join("config.yaml"),
    };
    let mut coach_config = config::load_config(&path)?;
    coach_config.resolve_credentials();
    if no_stream {
        coach_config.should_stream = false;
    }
    coach_config.validate()?;
    debug!(model = %coach_config.model, backend = ?coach_config.embedding_backend, "Config loaded");
    Ok(coach_config)
}

/// Embed the methodology corpus once; any failure aborts startup.
async fn build_retriever(coach_config: &CoachConfig) -> Result<Retriever, Box<dyn Error>> {
    let embedder = embeddings::embedder_from_config(coach_config)?;
    let index = EmbeddingIndex::build(corpus::methodologies(), embedder).await?;
    Ok(Retriever::new(Arc::new(index)))
}

fn build_session(
    coach_config: &CoachConfig,
    retriever: Retriever,
    template_name: Option<String>,
) -> Result<SessionLoop, Box<dyn Error>> {
    let template = match template_name {
        Some(name) => template::load_template(&name)?,
        None => CoachTemplate::default(),
    };
    let composer =
        PromptComposer::new(template).with_token_budget(coach_config.prompt_token_budget())?;
    let completion = Arc::new(OpenAiCompletionClient::new(coach_config));

    Ok(SessionLoop::new(retriever, composer, completion)
        .with_completion_timeout(coach_config.request_timeout()))
}

/// Writes a default `config.yaml` and `templates/coach.yaml` under the config directory.
///
/// Existing files are left untouched.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = eque::config_dir()?;
    let templates_dir = config_dir.join("templates");
    info!("Creating template config directory: {}", templates_dir.display());
    fs::create_dir_all(&templates_dir)?;

    let template_path = templates_dir.join(format!("{DEFAULT_TEMPLATE_NAME}.yaml"));
    write_if_missing(&template_path, &serde_yaml::to_string(&CoachTemplate::default())?)?;

    let config = CoachConfig {
        api_key: PLACEHOLDER_API_KEY.to_string(),
        ..CoachConfig::default()
    };
    let config_path = config_dir.join("config.yaml");
    write_if_missing(&config_path, &serde_yaml::to_string(&config)?)?;

    println!("Configuration written to {}", config_dir.display());
    Ok(())
}

fn write_if_missing(path: &Path, contents: &str) -> Result<(), Box<dyn Error>> {
    if path.exists() {
        info!("Keeping existing file: {}", path.display());
        return Ok(());
    }
    info!("Creating file: {}", path.display());
    fs::write(path, contents)?;
    Ok(())
}
