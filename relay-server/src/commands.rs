use crate::api::{create_router, AppState};
use crate::exchange::ExchangeStore;
use crate::{Command, TargetArgs};
use anyhow::{Context, Result};
use relay_common::config::RelayConfig;
use relay_common::metrics::CounterMetrics;
use relay_common::types::{AppTarget, NodeAddress};
use relay_proxy::{DispatchResult, Operations};
use relay_resolve::serving::detect_serving_node;
use serde::Serialize;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("relay/", env!("CARGO_PKG_VERSION"));

pub async fn run(command: Command, config: &RelayConfig, auth: Option<&str>) -> Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_millis(config.retry.attempt_timeout_ms))
        .build()
        .context("Failed to build HTTP client")?;
    let metrics = Arc::new(CounterMetrics::new());
    let ops = Operations::from_config(client.clone(), config).with_metrics(metrics.clone());

    match command {
        Command::Master { app } => {
            let resolved = ops.resolver().resolve(&app, &[]).await?;
            match resolved.master {
                Some(candidate) => print_json(&candidate)?,
                None => println!("no master detected for {}", app),
            }
        }
        Command::ServingNode { domain } => match detect_serving_node(&client, &domain).await? {
            Some(node) => println!("{}", node),
            None => println!("unknown"),
        },
        Command::Logs { target, lines } => {
            let result = ops.logs(&target.app_target(), &target.nodes, auth, lines).await?;
            let text = finish(result)?;
            println!("{}", text);
        }
        Command::Ls { target, folder } => {
            let result = ops
                .list_folder(&target.app_target(), &target.nodes, auth, &folder)
                .await?;
            print_json(&finish(result)?)?;
        }
        Command::Download { target, file, output } => {
            let result = ops.download(&target.app_target(), &target.nodes, auth, &file).await?;
            let data = finish(result)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &data)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("wrote {} bytes to {}", data.len(), path.display());
                }
                None => std::io::stdout().write_all(&data)?,
            }
        }
        Command::Upload { target, file, folder } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("Upload path has no file name")?;
            let result = ops
                .upload(&target.app_target(), &target.nodes, auth, &folder, file_name, data.into())
                .await?;
            print_json(&finish(result)?)?;
        }
        Command::Stats { target, disk_limit } => {
            let result = ops
                .stats(&target.app_target(), &target.nodes, auth, disk_limit)
                .await?;
            print_json(&finish(result)?)?;
        }
        Command::Exec { target, command } => {
            let command = command.join(" ");
            let result = ops.exec(&target.app_target(), &target.nodes, auth, &command).await?;
            print!("{}", finish(result)?);
        }
        Command::Serve { bind } => serve(&bind, config).await?,
    }

    debug!(
        attempts = metrics.counter("dispatch.attempt"),
        successes = metrics.counter("dispatch.success"),
        exhausted = metrics.counter("dispatch.exhausted"),
        "dispatch totals"
    );
    Ok(())
}

impl TargetArgs {
    fn app_target(&self) -> AppTarget {
        match &self.component {
            Some(component) => AppTarget::with_component(&self.app, component),
            None => AppTarget::new(&self.app),
        }
    }
}

/// Unwraps a dispatch result, reporting the node that answered.
fn finish<T>(result: DispatchResult<T>) -> Result<T> {
    let (value, source): (T, NodeAddress) = result.into_result()?;
    eprintln!("source node: {}", source);
    Ok(value)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(bind: &str, config: &RelayConfig) -> Result<()> {
    let state = Arc::new(AppState {
        exchange: ExchangeStore::from_config(&config.exchange),
    });
    let app = create_router(state);

    let addr: SocketAddr = bind.parse().with_context(|| format!("Invalid bind address {}", bind))?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections...");
}
