use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use canvax_core::config::{Config, LoggingConfig, ServerConfig};
use canvax_gateway::GatewayState;

#[derive(Parser)]
#[command(
    name = "canvax",
    about = "Collaborative canvas server: shared drawing sessions over WebSocket and TCP",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the canvas server
    Serve {
        /// HTTP/WebSocket port (default: 8080)
        #[arg(long)]
        port: Option<u16>,

        /// Line-delimited TCP stream port (default: 8081)
        #[arg(long)]
        stream_port: Option<u16>,

        /// Bind address (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Check the configuration for errors
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;

    init_logging(config.logging.as_ref(), cli.verbose);

    match cli.command {
        Commands::Serve {
            port,
            stream_port,
            bind,
        } => {
            let server = config.server.get_or_insert_with(ServerConfig::default);
            if let Some(port) = port {
                server.port = port;
            }
            if let Some(stream_port) = stream_port {
                server.stream_port = stream_port;
            }
            if bind.is_some() {
                server.bind = bind;
            }

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("Config: {warning}");
            }
            if !errors.is_empty() {
                for error in &errors {
                    tracing::error!("Config: {error}");
                }
                anyhow::bail!("invalid configuration in {}", config_path.display());
            }

            tracing::info!(
                config = %config_path.display(),
                port = config.port(),
                stream_port = config.stream_port(),
                "Starting Canvax server"
            );

            let state = GatewayState::new(Arc::new(config));
            #[cfg(feature = "metrics")]
            let state = state.with_metrics(canvax_gateway::metrics::install_prometheus_recorder()?);

            canvax_gateway::start_gateway(Arc::new(state)).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("{} is valid", config_path.display());
            }
        },
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the config file;
/// `--verbose` forces debug.
fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        logging
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };

    let mut directives = vec![level];
    if let Some(logging) = logging {
        directives.extend(logging.filters.iter().cloned());
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives.join(",")));

    let writer = match logging.map(|l| l.output.as_str()) {
        Some("stdout") => BoxMakeWriter::new(std::io::stdout),
        _ => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    if logging.is_some_and(|l| l.format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
