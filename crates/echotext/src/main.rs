use echotext_common::{logger, AppConfig};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "echotext")]
#[command(about = "EchoText - audio transcription service with searchable history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (default: SERVER_HOST, then 127.0.0.1)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (default: SERVER_PORT, then 8000)
        #[arg(long)]
        port: Option<u16>,

        /// SQLite database file
        #[arg(long)]
        db_path: Option<String>,
    },
}

/// Load config, install logging, then serve until shutdown
async fn serve() -> Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;

    logger::setup_logging(&config.log_dir, &config.log_level)?;

    tracing::info!("EchoText starting...");
    tracing::info!("  Bind: {}", config.server_bind_address());
    tracing::info!("  Database: {}", config.db_path.display());
    tracing::info!("  Uploads: {}", config.upload_dir.display());
    tracing::info!("  Models: {} (fallback {})", config.whisper_model, config.fallback_model);

    println!("Server listening on http://{}", config.server_bind_address());

    echotext_server::start_server(config).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load early so CLI overrides below win over .env values
    load_dotenv_from_project_root();

    if let Some(command) = &cli.command {
        apply_overrides(command);
    }

    serve().await
}

/// Export the flags that were actually given, leaving the environment otherwise untouched
fn apply_overrides(command: &Commands) {
    let Commands::Serve { host, port, db_path } = command;

    if let Some(host) = host {
        std::env::set_var("SERVER_HOST", host);
    }
    if let Some(port) = port {
        std::env::set_var("SERVER_PORT", port.to_string());
    }
    if let Some(db) = db_path {
        std::env::set_var("DB_PATH", db);
    }
}
