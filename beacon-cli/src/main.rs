// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! `beacon`: feed events to the agent from the command line or stdin.
//!
//! Each stdin line is one event, `type<TAB>data` or `type=data`. A line with
//! neither separator is an event with empty data.

use anyhow::{Context, Result};
use beacon_agent::{Agent, FileStore, HttpTransport, Lifecycle};
use beacon_core::AgentConfig;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Collector endpoint (overrides config file)
    #[arg(long, env = "BEACON_ENDPOINT")]
    endpoint: Option<String>,

    /// Directory for pending events (overrides config file)
    #[arg(long, env = "BEACON_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Event to track, as `type=data`; may be repeated. Stdin is read when none are given
    #[arg(short, long = "event", value_parser = parse_event)]
    events: Vec<(String, String)>,

    /// OTLP collector for traces and metrics
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Seconds to wait for an in-flight flush before exiting
    #[arg(long, default_value_t = 10)]
    grace_secs: u64,

    /// Print delivery statistics as JSON on exit
    #[arg(long)]
    stats: bool,
}

fn parse_event(raw: &str) -> Result<(String, String), String> {
    let (kind, data) = raw
        .split_once('\t')
        .or_else(|| raw.split_once('='))
        .unwrap_or((raw, ""));
    let kind = kind.trim();
    if kind.is_empty() {
        return Err(format!("missing event type in {:?}", raw));
    }
    Ok((kind.to_string(), data.to_string()))
}

async fn read_stdin(agent: &Agent) -> Result<usize> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tracked = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_event(&line) {
                    Ok((kind, data)) => {
                        agent.track(kind, data);
                        tracked += 1;
                    }
                    Err(e) => warn!("Skipping line: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    Ok(tracked)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AgentConfig::load(args.config)?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    config.validate()?;

    let telemetry = beacon_telemetry::init_telemetry(
        "beacon",
        args.otlp_endpoint.as_deref(),
        args.json_logs,
    )?;

    let transport = Arc::new(HttpTransport::from_config(&config)?);
    let store = Arc::new(FileStore::new(&config.data_dir));
    let agent = Agent::builder(transport, store)
        .with_config(&config)
        .observer(telemetry.metrics.clone())
        .build();

    info!(
        "Beacon agent started (endpoint: {}, data dir: {})",
        config.endpoint,
        config.data_dir.display()
    );
    agent.handle(Lifecycle::Start);

    let tracked = if args.events.is_empty() {
        read_stdin(&agent).await?
    } else {
        let count = args.events.len();
        for (kind, data) in args.events {
            agent.track(kind, data);
        }
        count
    };
    info!("Tracked {} events", tracked);

    // Persists before waiting, so this is also the terminate notification.
    let idle = agent.shutdown(Duration::from_secs(args.grace_secs)).await;
    if !idle {
        warn!("{} events left for the next run", agent.pending_count());
    }

    if args.stats {
        println!("{}", serde_json::to_string_pretty(&agent.stats())?);
    }

    telemetry.shutdown();
    Ok(())
}
