//! # gatelink
//!
//! Command-line front end for [`gatelink_client::GatewayClient`]: connects to
//! a gateway, runs one command and exits (or streams events until Ctrl-C).

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use gatelink_client::GatewayClient;
use gatelink_client::api::SessionsListParams;
use gatelink_core::logging;
use gatelink_settings::GatelinkSettings;
use serde_json::Value;
use tracing::{debug, info};

/// Talk to a gateway over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "gatelink", version, about = "Talk to a gateway over WebSocket")]
struct Cli {
    /// Settings file (defaults to `~/.gatelink/settings.json`).
    #[arg(long, global = true, env = "GATELINK_SETTINGS")]
    settings: Option<PathBuf>,

    /// Gateway host (overrides settings).
    #[arg(long, global = true)]
    host: Option<String>,

    /// Gateway port (overrides settings).
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Connect with `wss://`.
    #[arg(long, global = true)]
    tls: bool,

    /// Auth token (overrides settings).
    #[arg(long, global = true)]
    token: Option<String>,

    /// Request timeout in milliseconds (overrides settings).
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Log filter, e.g. `debug` or `gatelink_client=trace`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the gateway status summary.
    Status,
    /// Print the gateway health report.
    Health,
    /// Call any method and print its payload.
    Call {
        /// Method name, e.g. `chat.history`.
        method: String,
        /// Params as a JSON object.
        params: Option<String>,
    },
    /// Stream gateway events until interrupted.
    Watch {
        /// Only print these event names (repeatable).
        #[arg(long = "event")]
        events: Vec<String>,
        /// Exit after this many events.
        #[arg(long)]
        count: Option<usize>,
    },
    /// List sessions.
    Sessions {
        /// Maximum number of sessions.
        #[arg(long)]
        limit: Option<u32>,
    },
    /// List available models.
    Models,
}

impl Cli {
    fn load_settings(&self) -> Result<GatelinkSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(gatelink_settings::settings_path);
        let mut settings = gatelink_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.gateway.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.gateway.port = port;
        }
        if self.tls {
            settings.gateway.tls = true;
        }
        if let Some(token) = &self.token {
            settings.gateway.token = Some(token.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings.requests.timeout_ms = timeout_ms;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_params(raw: Option<&str>) -> Result<Option<Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw).context("params must be valid JSON")?;
    if !value.is_object() {
        bail!("params must be a JSON object");
    }
    Ok(Some(value))
}

async fn watch(client: &GatewayClient, filter: &[String], count: Option<usize>) -> Result<()> {
    let mut events = client
        .take_events()
        .context("event stream already taken")?;
    let _observer = client.observe_state(|change| {
        info!(from = %change.from, to = %change.to, "connection state changed");
    });

    let mut printed = 0_usize;
    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                if !filter.is_empty() && !filter.contains(&event.event) {
                    continue;
                }
                println!("{}", serde_json::to_string(&event)?);
                printed += 1;
                if count.is_some_and(|limit| printed >= limit) {
                    break;
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                debug!("interrupted");
                break;
            }
        }
    }
    Ok(())
}

async fn run(client: &GatewayClient, command: Command) -> Result<()> {
    match command {
        Command::Status => print_json(&client.status().await?),
        Command::Health => print_json(&client.health().await?),
        Command::Call { method, params } => {
            let params = parse_params(params.as_deref())?;
            let payload: Value = client
                .call(&method, params)
                .await
                .with_context(|| format!("{method} failed"))?;
            print_json(&payload)
        }
        Command::Watch { events, count } => watch(client, &events, count).await,
        Command::Sessions { limit } => {
            let params = SessionsListParams {
                limit,
                ..SessionsListParams::default()
            };
            let list = client.sessions_list(&params).await?;
            for session in &list.sessions {
                let label = session.label.as_deref().unwrap_or("-");
                let model = session.model.as_deref().unwrap_or("-");
                println!("{}\t{label}\t{model}", session.key);
            }
            Ok(())
        }
        Command::Models => {
            let list = client.models_list().await?;
            for model in &list.models {
                let provider = model.provider.as_deref().unwrap_or("-");
                let name = model.name.as_deref().unwrap_or(&model.id);
                println!("{}\t{provider}\t{name}", model.id);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    if settings.logging.json {
        logging::init_json_subscriber(&settings.logging.level);
    } else {
        logging::init_subscriber(&settings.logging.level);
    }

    let client = GatewayClient::new(&settings);
    let url = settings.gateway.url().context("Invalid gateway endpoint")?;
    let hello = client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    info!(conn_id = %hello.conn_id(), protocol = hello.protocol_version, "connected");

    let outcome = run(&client, cli.command).await;
    client.shutdown().await;
    outcome
}
