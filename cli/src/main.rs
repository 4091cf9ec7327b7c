use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use strata_core::{
    Config, Error, LocalProvider, McpClient, Orchestrator, Retriever, VectorStore, config, mcp,
    providers,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod knowledge;
mod repl;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "strata - retrieval-augmented chat with pluggable tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question or start an interactive session
    Chat {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Write the default configuration file
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Embed documents and report how many were accepted
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Chat { message: None });

    if let Commands::Init { force } = command {
        return run_init(force);
    }

    let config = Config::load_or_init()?;
    config.validate()?;
    init_tracing(&config.log_level);

    match command {
        Commands::Chat { message } => {
            let mut orchestrator = build_orchestrator(&config).await?;
            load_knowledge(&orchestrator, &config.knowledge_path()).await;

            let outcome = match message {
                Some(msg) => repl::ask_once(&mut orchestrator, &msg).await,
                None => repl::run(&mut orchestrator).await,
            };
            if let Err(e) = orchestrator.close().await {
                warn!(error = %e, "Some capability providers did not close cleanly");
            }
            outcome?;
        }
        Commands::Ingest { paths } => run_ingest(&config, &paths).await?,
        Commands::Init { .. } => {}
    }

    Ok(())
}

fn run_init(force: bool) -> Result<()> {
    let path = config::get_config_path();
    if config::config_exists() && !force {
        println!(
            "{} Config already exists at {} (use --force to overwrite)",
            style("!").yellow(),
            style(path.display()).cyan()
        );
        return Ok(());
    }

    let defaults = Config::default();
    config::save_config(&defaults)?;
    std::fs::create_dir_all(defaults.knowledge_path())?;

    println!("{} Configuration written", style("✓").green().bold());
    println!("  {} {}", style("→").green(), style(path.display()).cyan());
    println!(
        "  {} Put .md or .txt files in {}",
        style("→").green(),
        style(defaults.knowledge_path().display()).cyan()
    );
    println!(
        "  {} List tool servers in {}",
        style("→").green(),
        style(defaults.mcp_servers_path().display()).cyan()
    );
    Ok(())
}

fn build_retriever(config: &Config) -> Result<Arc<Retriever>> {
    let embedder = providers::create_embedder(config)?;
    let retriever = Retriever::new(embedder, Arc::new(VectorStore::new()))
        .with_concurrency(config.agent.ingest_concurrency);
    Ok(Arc::new(retriever))
}

async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let chat = providers::create_chat_provider(config)?;
    let retriever = build_retriever(config)?;
    let orchestrator = Orchestrator::new(chat, retriever, config.agent.orchestrator_config());

    orchestrator
        .add_provider("local", Arc::new(LocalProvider::builtin()))
        .await?;

    for server in mcp::load_server_configs(&config.mcp_servers_path())? {
        let name = server.name.clone();
        if let Err(e) = orchestrator
            .add_provider(&name, Arc::new(McpClient::new(server)))
            .await
        {
            warn!(server = %name, error = %e, "Skipping MCP server");
            eprintln!("{} {}", style("!").yellow(), e);
        }
    }

    info!(providers = ?orchestrator.provider_names(), "Orchestrator ready");
    Ok(orchestrator)
}

async fn load_knowledge(orchestrator: &Orchestrator, dir: &std::path::Path) {
    let documents = match knowledge::load_documents(dir) {
        Ok(documents) if documents.is_empty() => return,
        Ok(documents) => documents,
        Err(e) => {
            warn!(error = %e, "Could not read knowledge directory");
            return;
        }
    };

    match orchestrator.add_knowledge(&documents).await {
        Ok(stored) => info!(stored, "Knowledge loaded"),
        Err(e) => warn!(error = %e, "Knowledge partially loaded"),
    }
}

async fn run_ingest(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let mut documents = vec![];
    for path in paths {
        documents.extend(knowledge::load_documents(path)?);
    }
    if documents.is_empty() {
        println!("{} No .md or .txt documents found", style("!").yellow());
        return Ok(());
    }

    let retriever = build_retriever(config)?;
    match retriever.add_documents(&documents).await {
        Ok(stored) => {
            println!(
                "{} Embedded {} document(s)",
                style("✓").green().bold(),
                stored
            );
            Ok(())
        }
        Err(Error::Aggregate(failures)) => {
            println!(
                "{} Embedded {} of {} document(s)",
                style("!").yellow(),
                retriever.store().len(),
                documents.len()
            );
            for (index, error) in failures.failures() {
                println!("  {} #{}: {}", style("✗").red(), index, error);
            }
            anyhow::bail!("{} document(s) failed", failures.len())
        }
        Err(e) => Err(e.into()),
    }
}
