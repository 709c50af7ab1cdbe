use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

mod config;
mod daemon;
mod telemetry;

use config::DaemonConfig;
use daemon::MonitorDaemon;

const DEFAULT_CONFIG_FILE: &str = "io-monitor.toml";

#[derive(Parser)]
#[command(name = "io-monitor-daemon")]
#[command(about = "Polling filesystem monitor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overrides the configured one
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured watchers in the foreground until Ctrl+C
    Run,
    /// Inspect or create configuration files
    Config {
        #[command(subcommand)]
        action: ConfigActions,
    },
}

#[derive(Subcommand)]
enum ConfigActions {
    /// Validate configuration file
    Validate,
    /// Show current configuration
    Show,
    /// Generate default configuration
    Generate {
        /// Output path for configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = load_config(cli.config.as_deref()).await?;
            let _guard = telemetry::init_logging(&config.telemetry, cli.log_level.as_deref())?;
            run_daemon(config).await
        }
        Commands::Config { action } => match action {
            ConfigActions::Validate => validate_config(cli.config.as_deref()).await,
            ConfigActions::Show => show_config(cli.config.as_deref()).await,
            ConfigActions::Generate { output } => generate_config(output.as_deref()).await,
        },
    }
}

fn config_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

async fn load_config(config_path: Option<&Path>) -> Result<DaemonConfig> {
    match config_path {
        Some(path) => DaemonConfig::load(path).await,
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                DaemonConfig::load(&path).await
            } else {
                Ok(DaemonConfig::default())
            }
        }
    }
}

async fn run_daemon(config: DaemonConfig) -> Result<()> {
    info!("Starting monitor daemon in foreground mode");
    let daemon = MonitorDaemon::new(config)?;
    daemon.run().await
}

async fn validate_config(config_path: Option<&Path>) -> Result<()> {
    let path = self::config_path(config_path);

    let result = match DaemonConfig::load(&path).await {
        Ok(config) => config.validate().map(|()| config),
        Err(e) => Err(e),
    };

    match result {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("{}", daemon::describe(&config));
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

async fn show_config(config_path: Option<&Path>) -> Result<()> {
    let path = self::config_path(config_path);

    match DaemonConfig::load(&path).await {
        Ok(config) => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Err(e) => {
            println!("Failed to load configuration: {:#}", e);
            Err(e)
        }
    }
}

async fn generate_config(output_path: Option<&Path>) -> Result<()> {
    let config = DaemonConfig::default();

    if let Some(path) = output_path {
        config.save(path).await?;
        println!("Configuration generated at {}", path.display());
    } else {
        println!("{}", toml::to_string_pretty(&config)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "io-monitor-daemon",
            "config",
            "validate",
            "--config",
            "custom.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigActions::Validate
            }
        ));
    }

    #[tokio::test]
    async fn test_generate_then_validate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("generated.toml");

        generate_config(Some(path.as_path())).await.unwrap();
        validate_config(Some(path.as_path())).await.unwrap();
        show_config(Some(path.as_path())).await.unwrap();

        let loaded = load_config(Some(path.as_path())).await.unwrap();
        assert_eq!(loaded.watchers.len(), 1);
    }

    #[tokio::test]
    async fn test_validate_reports_bad_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        tokio::fs::write(&path, "[daemon]\npoll_interval = \"0s\"\n")
            .await
            .unwrap();

        assert!(validate_config(Some(path.as_path())).await.is_err());
    }
}
