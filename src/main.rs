//! Headless screener console.
//!
//! Loads the filter catalog, applies selections from the command line,
//! submits a run, and prints the results table.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

use common::ScreenerEvent;
use screener::config;
use screener::render::{render_filters, render_results};
use screener::ScreenerSession;
use screener_client::ScreenerRestClient;

/// Stock screener console
#[derive(Parser)]
#[command(name = "screener", about = "Run the stock screener from the terminal")]
struct Cli {
    /// Print the filter catalog with current values and exit.
    #[arg(long)]
    list: bool,

    /// Keep only these filters enabled (repeatable).
    #[arg(long = "only", value_name = "FILTER_ID")]
    only: Vec<String>,

    /// Set a parameter, e.g. `--set pe_low.max_pe=15` (repeatable).
    #[arg(long = "set", value_name = "FILTER.PARAM=VALUE")]
    set: Vec<String>,

    /// Print the request body instead of submitting it.
    #[arg(long)]
    dry_run: bool,
}

/// Split `filter.param=value`.
fn parse_assignment(raw: &str) -> Option<(&str, &str, &str)> {
    let (target, value) = raw.split_once('=')?;
    let (filter, param) = target.split_once('.')?;
    if filter.is_empty() || param.is_empty() {
        return None;
    }
    Some((filter.trim(), param.trim(), value))
}

/// Apply `--set` assignments in order. An assignment for a filter that is
/// not enabled is rejected, since editing it would silently re-enable it.
fn apply_assignments(session: &ScreenerSession, raw: &[String]) -> Result<(), String> {
    for item in raw {
        let Some((filter, param, value)) = parse_assignment(item) else {
            return Err(format!("Expected FILTER.PARAM=VALUE, got {item:?}"));
        };
        if !session.is_enabled(filter) {
            return Err(format!(
                "Filter {filter} is not enabled; add --only {filter} or drop {item:?}"
            ));
        }
        session.set_parameter(filter, param, value);
    }
    Ok(())
}

fn spawn_event_log(session: &ScreenerSession) {
    let mut rx = session.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ScreenerEvent::SelectionChanged { revision }) => {
                    debug!("selection changed (revision {})", revision)
                }
                Ok(event) => debug!("event: {:?}", event),
                Err(RecvError::Lagged(n)) => debug!("event log skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "screener=info,screener_client=info,selection=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using screener backend at {}", cfg.api_base_url);

    let client = match ScreenerRestClient::new(&cfg) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let session = ScreenerSession::new(Arc::new(client));
    spawn_event_log(&session);

    if let Err(e) = session.load_catalog().await {
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }

    if !cli.only.is_empty() {
        for def in session.catalog() {
            if !cli.only.contains(&def.id) {
                session.toggle_filter(&def.id, false);
            }
        }
    }

    if let Err(e) = apply_assignments(&session, &cli.set) {
        error!("{}", e);
        std::process::exit(1);
    }

    if cli.list {
        print!("{}", render_filters(&session.view()));
        return;
    }

    if cli.dry_run {
        match serde_json::to_string_pretty(&session.run_request()) {
            Ok(body) => println!("{body}"),
            Err(e) => {
                error!("Failed to encode request: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if !session.can_run() {
        eprintln!("{}", common::Error::EmptySelection.user_message());
        std::process::exit(1);
    }

    let outcome = session.run().await;
    print!("{}", render_results(&session.view()));
    if outcome.is_err() {
        std::process::exit(1);
    }
}
