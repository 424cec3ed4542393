//! CLI entry point for the HTTP facade.
//!
//! Sends one request through [`HttpFacade`] and prints the response payload
//! as JSON on stdout. Configuration comes from the environment (and `.env`),
//! with command-line flags taking precedence.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use http_facade::config::load_headers;
use http_facade::{CallOptions, FacadeConfig, HttpFacade, Method};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "http_facade")]
#[command(about = "Send JSON requests through a configured HTTP facade", long_about = None)]
struct Cli {
    /// Base URL (overrides HTTP_FACADE_API)
    #[arg(long, global = true)]
    api: Option<String>,

    /// JSON file with default headers, replacing the built-in Accept header
    #[arg(long, global = true)]
    headers_file: Option<String>,

    /// Client timeout in milliseconds (overrides HTTP_FACADE_TIMEOUT_MS)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Resolve non-200 2xx responses instead of waiting on them
    #[arg(long, global = true, default_value_t = false)]
    settle_non_ok: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a GET request; --data becomes query parameters
    Get(RequestArgs),
    /// Send a POST request with a JSON body
    Post(RequestArgs),
    /// Send a PUT request with a JSON body
    Put(RequestArgs),
    /// Send a DELETE request with a JSON body
    Delete(RequestArgs),
}

#[derive(Args)]
struct RequestArgs {
    /// Path relative to the base URL, or an absolute URL
    #[arg(value_name = "URL")]
    url: String,

    /// JSON payload
    #[arg(short, long)]
    data: Option<String>,

    /// Do not attach the token header
    #[arg(long, default_value_t = false)]
    no_auth: bool,

    /// Extra header as NAME:VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/http_facade.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("http_facade.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let facade = build_facade(&cli)?;

    let (method, args) = match cli.command {
        Commands::Get(args) => (Method::Get, args),
        Commands::Post(args) => (Method::Post, args),
        Commands::Put(args) => (Method::Put, args),
        Commands::Delete(args) => (Method::Delete, args),
    };

    let value = send(&facade, method, args).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);

    Ok(())
}

/// Merges the environment with command-line overrides and wires logging
/// into every facade callback. A missing base URL surfaces here as a
/// configuration error.
fn build_facade(cli: &Cli) -> Result<HttpFacade> {
    let mut config = match &cli.api {
        Some(api) => FacadeConfig {
            api: Some(api.clone()),
            ..FacadeConfig::default().apply_env()?
        },
        None => FacadeConfig::from_env()?,
    };

    if let Some(path) = &cli.headers_file {
        config = config.with_headers(load_headers(path)?);
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }

    let config = config
        .settle_non_ok(cli.settle_non_ok)
        .on_show_loading(|| debug!("Waiting for response"))
        .on_hide_loading(|| debug!("All responses received"))
        .on_reject(|e| error!(error = %e, status = ?e.status(), "Request failed"))
        .on_success(|r| warn!(status = %r.status(), url = %r.url(), "Non-200 success response"));

    Ok(HttpFacade::new(config)?)
}

#[tracing::instrument(skip(facade, args), fields(url = %args.url))]
async fn send(facade: &HttpFacade, method: Method, args: RequestArgs) -> Result<Value> {
    let data = args
        .data
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--data is not valid JSON")?;

    let mut options = CallOptions::new().auth_api(!args.no_auth);
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("header '{header}' is not NAME:VALUE"))?;
        options = options.header(name.trim(), value.trim());
    }
    if let Some(ms) = args.request_timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }

    // Ctrl+C cancels the in-flight request rather than killing the process.
    let cancel = CancellationToken::new();
    options = options.cancel_token(cancel.clone());
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Cancelling request");
            cancel.cancel();
        }
    });

    let response = match method {
        Method::Get => facade.get(&args.url, data, options),
        Method::Post => facade.post(&args.url, data, options),
        Method::Put => facade.put(&args.url, data, options),
        Method::Delete => facade.delete(&args.url, data, options),
    };
    let result = response.await;
    ctrl_c.abort();

    let value = result?;
    info!(base_url = facade.get_base_url(), "Request completed");
    Ok(value)
}
