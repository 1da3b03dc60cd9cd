//! linesift Server Binary
//!
//! This is the main entry point for the linesift server. It resolves the
//! layered configuration (defaults, optional TOML file, CLI and
//! environment overrides), initializes logging, and runs the server until
//! a shutdown signal arrives.
//!
//! ## Exit Codes
//!
//! - `0`: clean shutdown
//! - `1`: fatal startup error (bad config, missing data file, TLS material,
//!   bind failure)
//! - `2`: runtime fatal error

use anyhow::Context;
use clap::Parser;
use linesift::config::{PartialSettings, Settings};
use linesift::server::Server;
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exact full-line membership server.
///
/// Every option can also come from a `LINESIFT_*` environment variable or
/// from the TOML file named by `--config`; command line beats environment
/// beats file beats defaults.
#[derive(Parser, Debug)]
#[command(name = "linesift", version, about)]
struct Cli {
    /// Load settings from a TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// File whose lines form the membership set
    #[arg(long, env = "LINESIFT_DATA_PATH", value_name = "PATH")]
    data_path: Option<PathBuf>,

    /// Re-scan the data file on every query instead of indexing it once
    #[arg(long, env = "LINESIFT_REREAD_ON_QUERY", value_name = "BOOL")]
    reread_on_query: Option<bool>,

    /// Host to bind to
    #[arg(long, env = "LINESIFT_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "LINESIFT_PORT")]
    port: Option<u16>,

    /// Listen backlog
    #[arg(long, env = "LINESIFT_BACKLOG")]
    backlog: Option<u32>,

    /// Maximum concurrently served connections
    #[arg(long, env = "LINESIFT_MAX_WORKERS")]
    max_workers: Option<usize>,

    /// Lookup cache entries; 0 disables the cache
    #[arg(long, env = "LINESIFT_CACHE_CAPACITY")]
    cache_capacity: Option<usize>,

    /// Read buffer size in bytes, for sockets and file scans
    #[arg(long, env = "LINESIFT_BUFFER_SIZE")]
    buffer_size: Option<usize>,

    /// Hard upper bound on one request, in bytes
    #[arg(long, env = "LINESIFT_MAX_QUERY_BYTES")]
    max_query_bytes: Option<usize>,

    /// Wrap accepted connections in TLS
    #[arg(long, env = "LINESIFT_TLS_ENABLED", value_name = "BOOL")]
    tls_enabled: Option<bool>,

    /// PEM certificate chain
    #[arg(long, env = "LINESIFT_TLS_CERT", value_name = "PATH")]
    tls_cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, env = "LINESIFT_TLS_KEY", value_name = "PATH")]
    tls_key: Option<PathBuf>,

    /// Require client certificates signed by this CA bundle
    #[arg(long, env = "LINESIFT_TLS_CLIENT_CA", value_name = "PATH")]
    tls_client_ca: Option<PathBuf>,

    /// Apply the per-IP sliding-window rate limit
    #[arg(long, env = "LINESIFT_RATE_LIMIT_ENABLED", value_name = "BOOL")]
    rate_limit_enabled: Option<bool>,

    /// Requests allowed per client IP per minute
    #[arg(long, env = "LINESIFT_REQUESTS_PER_MINUTE")]
    requests_per_minute: Option<usize>,

    /// Read deadline in seconds
    #[arg(long, env = "LINESIFT_READ_TIMEOUT", value_name = "SECS")]
    read_timeout: Option<u64>,

    /// Write deadline in seconds
    #[arg(long, env = "LINESIFT_WRITE_TIMEOUT", value_name = "SECS")]
    write_timeout: Option<u64>,

    /// Shutdown grace period in seconds
    #[arg(long, env = "LINESIFT_SHUTDOWN_GRACE", value_name = "SECS")]
    shutdown_grace: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LINESIFT_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Collapses the parsed flags into one override layer.
    fn overrides(self) -> PartialSettings {
        PartialSettings {
            data_path: self.data_path,
            reread_on_query: self.reread_on_query,
            host: self.host,
            port: self.port,
            backlog: self.backlog,
            max_workers: self.max_workers,
            cache_capacity: self.cache_capacity,
            buffer_size: self.buffer_size,
            max_query_bytes: self.max_query_bytes,
            tls_enabled: self.tls_enabled,
            tls_cert: self.tls_cert,
            tls_key: self.tls_key,
            tls_client_ca: self.tls_client_ca,
            rate_limit_enabled: self.rate_limit_enabled,
            requests_per_minute: self.requests_per_minute,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            shutdown_grace: self.shutdown_grace,
            log_level: self.log_level,
        }
    }
}

fn print_banner(settings: &Settings) {
    println!(
        r#"
    ██╗     ██╗███╗   ██╗███████╗███████╗██╗███████╗████████╗
    ██║     ██║████╗  ██║██╔════╝██╔════╝██║██╔════╝╚══██╔══╝
    ██║     ██║██╔██╗ ██║█████╗  ███████╗██║█████╗     ██║
    ██║     ██║██║╚██╗██║██╔══╝  ╚════██║██║██╔══╝     ██║
    ███████╗██║██║ ╚████║███████╗███████║██║██║        ██║
    ╚══════╝╚═╝╚═╝  ╚═══╝╚══════╝╚══════╝╚═╝╚═╝        ╚═╝

linesift v{} - exact full-line membership server
──────────────────────────────────────────────────────────────
  data file   {}
  mode        {}
  listening   {}
  tls         {}
  rate limit  {}

Use Ctrl+C to shut down gracefully.
"#,
        linesift::VERSION,
        settings.data_path.display(),
        if settings.reread_on_query {
            "reread (scan per query)"
        } else {
            "fast (indexed)"
        },
        settings.bind_address(),
        if settings.tls_enabled { "on" } else { "off" },
        if settings.rate_limit_enabled {
            format!("{}/min per IP", settings.requests_per_minute)
        } else {
            "off".to_string()
        },
    );
}

/// Installs the tracing subscriber. `RUST_LOG` wins over the configured
/// log level so operators can raise verbosity without touching config.
fn setup_logging(settings: &Settings) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.log_level)
            .with_context(|| format!("invalid log_level {:?}", settings.log_level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_file = cli.config.clone();

    let settings = match Settings::load(config_file.as_deref(), cli.overrides()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = setup_logging(&settings) {
        eprintln!("failed to initialize logging: {e:#}");
        process::exit(1);
    }

    print_banner(&settings);
    info!("starting linesift v{}", linesift::VERSION);

    let server = match Server::bind(settings).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "startup failed");
            process::exit(1);
        }
    };

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("shutdown signal received, stopping server...");
    };

    match server.run(shutdown).await {
        Ok(()) => {
            info!("server shut down cleanly");
            process::exit(0);
        }
        Err(e) => {
            error!(error = %e, "runtime failure");
            process::exit(2);
        }
    }
}
