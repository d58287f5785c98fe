use anyhow::Result;
use chipi_config::{AppConfig, ConfigLoader};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chipi", version, about = "Chipi IA - asistente personal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web app
    Start {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Query a running instance
    Status,

    /// Check that the model API key is accepted
    CheckApi,

    /// Create the config and data directories and the database
    Init,
}

fn init_tracing(cli_level: Option<&str>, config: &AppConfig) {
    let level = cli_level
        .or(config.log_level.as_deref())
        .unwrap_or("info");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::new()?;
    let env_file = loader.load_env_file();
    let config = loader.load()?;
    init_tracing(cli.log_level.as_deref(), &config);

    if let Some(path) = &env_file {
        info!("environment loaded from {}", path.display());
    }

    match cli.command {
        Commands::Start { host, port } => {
            loader.ensure_dirs()?;
            let mut config = config;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }

            let db_path = loader.resolve_database_path(&config);
            info!("database at {}", db_path.display());
            chipi_gateway::GatewayServer::new(config, db_path)
                .run()
                .await?;
        }
        Commands::Status => {
            let url = format!(
                "http://{}:{}/api/status",
                config.gateway.host, config.gateway.port
            );
            let resp = reqwest::Client::new().get(&url).send().await.map_err(|_| {
                anyhow::anyhow!(
                    "Chipi is not running at {}:{}",
                    config.gateway.host,
                    config.gateway.port
                )
            })?;

            let body = resp.json::<serde_json::Value>().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::CheckApi => {
            let assistant = chipi_agents::Assistant::from_config(&config.llm)?;
            let Some(provider) = assistant.provider() else {
                anyhow::bail!(
                    "API key missing or invalid. Set OPENROUTER_API_KEY to a key starting with {}",
                    chipi_config::model::API_KEY_PREFIX
                );
            };

            println!("Checking {} ({})...", config.llm.base_url, config.llm.model);
            match provider.health_check().await {
                Ok(true) => println!("API key accepted."),
                Ok(false) => anyhow::bail!("API key rejected by {}", provider.provider_id()),
                Err(e) => anyhow::bail!("API unreachable: {e}"),
            }
        }
        Commands::Init => {
            loader.ensure_dirs()?;
            let db_path = loader.resolve_database_path(&config);
            chipi_db::Database::open(&db_path)?;

            println!("{} {}", config.app.name, config.app.version);
            println!("Config directory: {}", loader.config_dir().display());
            println!("Database: {}", db_path.display());
            match env_file {
                Some(path) => println!("Environment file: {}", path.display()),
                None => println!("Environment file: (none, create .env with OPENROUTER_API_KEY)"),
            }
            println!(
                "Model API: {}",
                if config.is_api_configured() {
                    "configured"
                } else {
                    "not configured, replies will use the offline table"
                }
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_flags_are_optional() {
        let cli = Cli::try_parse_from(["chipi", "start"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Start {
                host: None,
                port: None
            }
        ));
    }

    #[test]
    fn start_overrides_and_global_log_level() {
        let cli =
            Cli::try_parse_from(["chipi", "start", "--port", "8080", "--log-level", "debug"])
                .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Start { host, port } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(8080));
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn check_api_uses_kebab_case() {
        let cli = Cli::try_parse_from(["chipi", "check-api"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckApi));
        assert!(Cli::try_parse_from(["chipi", "bogus"]).is_err());
    }
}
