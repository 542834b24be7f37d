//! # dataplane-http CLI
//!
//! Command-line interface for the dataplane-http library.
//! Streams one HTTP endpoint into another, with retries and Ctrl-C cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dataplane_http::address::{METHOD, NON_CHUNKED_TRANSFER};
use dataplane_http::config::{
    SETTING_BACKOFF_BASE_MS, SETTING_BACKOFF_CAP_MS, SETTING_CHUNK_SIZE,
    SETTING_CONNECT_TIMEOUT_MS, SETTING_MAX_ATTEMPTS, SETTING_REQUEST_TIMEOUT_MS,
    SETTING_SINK_QUEUE_CHUNKS,
};
use dataplane_http::{
    BearerToken, CredentialProvider, DataAddress, NoCredentials, TransferConfig, TransferOutcome,
    TransferRequest, TransferService,
};
use log::{debug, info};

mod cli;

/// Exit status for a cancelled transfer (128 + SIGINT)
const EXIT_CANCELLED: i32 = 130;

/// Command-line interface for dataplane-http
#[derive(Parser, Debug)]
#[command(name = "dataplane-http")]
#[command(version, about = "Stream an HTTP source into an HTTP destination")]
#[command(long_about = "Streams the body of SOURCE_URL into DESTINATION_URL:
  dataplane-http https://provider/assets/42 https://consumer/inbox
  dataplane-http -X PUT -H 'X-Api-Key: secret' https://provider/a https://consumer/b

Exit codes:
  0    transfer succeeded
  1    transfer failed
  130  transfer cancelled (Ctrl-C)")]
struct Cli {
    /// URL to read from (GET)
    source: String,

    /// URL to write to
    destination: String,

    /// Destination method: POST, PUT or PATCH
    #[arg(short = 'X', long, default_value = "POST")]
    method: String,

    /// Destination header "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Source header "Name: value" (repeatable)
    #[arg(long = "source-header", value_name = "HEADER")]
    source_headers: Vec<String>,

    /// Bearer token sent to both endpoints
    #[arg(long)]
    token: Option<String>,

    /// Buffer the payload and send it with a Content-Length
    #[arg(long)]
    non_chunked: bool,

    /// Transfer id used in logs (default: random UUID)
    #[arg(long)]
    id: Option<String>,

    /// Deadline for response headers, in milliseconds
    #[arg(long, value_name = "MS")]
    request_timeout_ms: Option<u64>,

    /// Deadline for establishing connections, in milliseconds
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Total attempts including the first
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Backoff before the first retry, in milliseconds
    #[arg(long, value_name = "MS")]
    backoff_base_ms: Option<u64>,

    /// Upper bound for a single backoff, in milliseconds
    #[arg(long, value_name = "MS")]
    backoff_cap_ms: Option<u64>,

    /// Bytes per copy step
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<usize>,

    /// Chunks queued towards the destination before the copy waits
    #[arg(long, value_name = "CHUNKS")]
    sink_queue_chunks: Option<usize>,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> HashMap<String, String> {
        let mut settings = HashMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                settings.insert(key.to_string(), value);
            }
        };
        put(SETTING_REQUEST_TIMEOUT_MS, self.request_timeout_ms.map(|v| v.to_string()));
        put(SETTING_CONNECT_TIMEOUT_MS, self.connect_timeout_ms.map(|v| v.to_string()));
        put(SETTING_MAX_ATTEMPTS, self.max_attempts.map(|v| v.to_string()));
        put(SETTING_BACKOFF_BASE_MS, self.backoff_base_ms.map(|v| v.to_string()));
        put(SETTING_BACKOFF_CAP_MS, self.backoff_cap_ms.map(|v| v.to_string()));
        put(SETTING_CHUNK_SIZE, self.chunk_size.map(|v| v.to_string()));
        put(SETTING_SINK_QUEUE_CHUNKS, self.sink_queue_chunks.map(|v| v.to_string()));
        settings
    }

    fn request(&self, id: String) -> Result<TransferRequest> {
        let mut source = DataAddress::http(&self.source);
        for raw in &self.source_headers {
            let (name, value) = parse_header(raw)?;
            source = source.with_header(name, value);
        }

        let mut destination = DataAddress::http(&self.destination).with(METHOD, &self.method);
        for raw in &self.headers {
            let (name, value) = parse_header(raw)?;
            destination = destination.with_header(name, value);
        }
        if self.non_chunked {
            destination = destination.with(NON_CHUNKED_TRANSFER, "true");
        }

        Ok(TransferRequest::new(id, source, destination))
    }
}

/// Split `Name: value`
fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("Invalid header {raw:?}: expected \"Name: value\"");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid header {raw:?}: empty name");
    }
    Ok((name, value.trim()))
}

fn exit_code(outcome: &TransferOutcome) -> i32 {
    match outcome {
        TransferOutcome::Succeeded { .. } => 0,
        TransferOutcome::Failed { .. } => 1,
        TransferOutcome::Cancelled { .. } => EXIT_CANCELLED,
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    let config = TransferConfig::from_settings(&cli.settings())?;
    debug!("Using {config:?}");

    let credentials: Arc<dyn CredentialProvider> = match cli.token {
        Some(ref token) => Arc::new(BearerToken::new(token.clone())),
        None => Arc::new(NoCredentials),
    };

    let id = cli
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = cli.request(id.clone())?;

    let mut service = TransferService::new(config, credentials)
        .context("Failed to initialise the transfer service")?;
    service
        .validate_request(&request)
        .with_context(|| format!("Invalid transfer {id}"))?;

    let progress = (!cli.quiet).then(|| {
        cli::ProgressManager::new(&format!("🌐 {} -> {}", cli.source, cli.destination))
    });
    if let Some(ref progress) = progress {
        service = service.with_progress(progress.callback());
    }

    let handle = service.submit(request);

    let ctrl_c = {
        let service = service.clone();
        let id = id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling transfer {id}");
                service.cancel(&id);
            }
        })
    };

    let outcome = handle.outcome().await;
    ctrl_c.abort();

    if let Some(ref progress) = progress {
        progress.finish(&outcome);
    }
    match outcome {
        TransferOutcome::Succeeded { .. } => eprintln!("✅ Transfer {id} {outcome}"),
        _ => eprintln!("❌ Transfer {id} {outcome}"),
    }

    Ok(exit_code(&outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("X-Api-Key: secret").unwrap(), ("X-Api-Key", "secret"));
        assert_eq!(parse_header("Accept:*/*").unwrap(), ("Accept", "*/*"));
        assert_eq!(
            parse_header("Authorization: Bearer a:b").unwrap(),
            ("Authorization", "Bearer a:b")
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_cli_builds_request() {
        let cli = Cli::parse_from([
            "dataplane-http",
            "http://provider/a",
            "http://consumer/b",
            "-X",
            "PUT",
            "-H",
            "X-Trace: 1",
            "--source-header",
            "Accept: text/csv",
            "--non-chunked",
        ]);
        let request = cli.request("tx-cli".to_string()).unwrap();

        assert_eq!(request.id, "tx-cli");
        assert_eq!(request.source.base_url(), Some("http://provider/a"));
        assert_eq!(request.source.get("header:Accept"), Some("text/csv"));
        assert_eq!(request.destination.method(), Some("PUT"));
        assert_eq!(request.destination.get("header:X-Trace"), Some("1"));
        assert!(request.destination.non_chunked_transfer());
    }

    #[test]
    fn test_cli_settings_feed_config() {
        let cli = Cli::parse_from([
            "dataplane-http",
            "http://provider/a",
            "http://consumer/b",
            "--max-attempts",
            "5",
            "--chunk-size",
            "1024",
            "--sink-queue-chunks",
            "2",
        ]);
        let config = TransferConfig::from_settings(&cli.settings()).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.sink_queue_chunks, 2);
        assert_eq!(config.request_timeout, TransferConfig::default().request_timeout);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&TransferOutcome::Succeeded { bytes: 1, attempts: 1 }), 0);
        assert_eq!(exit_code(&TransferOutcome::Cancelled { attempts: 1 }), EXIT_CANCELLED);
    }
}
