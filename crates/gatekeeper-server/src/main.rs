//! Gatekeeper - Entry point
//!
//! Loads configuration, installs logging, compiles the policy bundle and
//! serves decisions until SIGTERM or SIGINT.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use gatekeeper_config::{ConfigLoader, GatekeeperConfig, LogFormat, LoggingConfig};
use gatekeeper_server::{DecisionService, GatekeeperServer, HttpSettings, ShutdownSignal};
use gatekeeper_telemetry::{init_logging, LogConfig};
use tracing::info;

/// Configuration file used when `--config` is not given, if present.
const DEFAULT_CONFIG_FILE: &str = "gatekeeper.toml";

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
    /// Start from the development preset.
    development: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut development = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--dev" => development = true,
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("gatekeeper {}", gatekeeper_server::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self {
            config,
            development,
        }
    }
}

fn print_help() {
    println!(
        r"Gatekeeper - authorization decision service

USAGE:
    gatekeeper [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
        --dev              Start from the development preset
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    GATEKEEPER__SECTION__KEY   Override any configuration key
                               (e.g. GATEKEEPER__DIRECTORY__URL)
    SHORELINE_SECRET           Session token signing secret
    SERVER_SECRET              Service account secret for server login
    SHORELINE_HOST             Session service base URL
    PORTAL_API_HOST            Directory service base URL
    PORT                       Listen port
    RUST_LOG                   Log filter, overrides logging.level

EXAMPLES:
    gatekeeper --config /etc/gatekeeper/gatekeeper.toml
    SHORELINE_SECRET=... SERVER_SECRET=... gatekeeper
"
    );
}

fn load_config(args: &Args) -> anyhow::Result<GatekeeperConfig> {
    let loader = ConfigLoader::new().with_dotenv()?;
    let loader = if args.development {
        loader.with_development()
    } else {
        loader.with_defaults()
    };
    let loader = match &args.config {
        Some(path) => loader
            .with_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE)?,
    };

    loader
        .with_legacy_env()
        .with_env_prefix("GATEKEEPER")
        .load()
        .context("invalid configuration")
}

fn log_config(logging: &LoggingConfig) -> LogConfig {
    LogConfig {
        enabled: logging.enabled,
        level: logging.level.clone(),
        json_format: logging.format == LogFormat::Json,
        ansi: logging.ansi_enabled,
        span_events: false,
        file_line_info: logging.include_location,
        include_target: true,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging(&log_config(&config.logging)).context("initializing logging")?;

    info!(version = gatekeeper_server::VERSION, "starting gatekeeper");
    info!(
        addr = %config.server.http_addr,
        directory = %config.directory.url,
        session = %config.directory.session_url,
        bundle = config.policy.bundle_path.as_deref().unwrap_or("builtin"),
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::with_os_signals();
    let service = Arc::new(
        DecisionService::from_config(&config, shutdown)
            .await
            .context("building decision service")?,
    );

    // Served from the empty snapshot until the first refresh lands.
    let _initial_refresh = service.start();

    GatekeeperServer::new(Arc::clone(&service), HttpSettings::from_config(&config))
        .run()
        .await
        .context("server error")?;

    service.shutdown();
    info!("gatekeeper stopped");
    Ok(())
}
