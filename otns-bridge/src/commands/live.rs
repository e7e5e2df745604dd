use anyhow::{Context, Result, ensure};
use otns_bridge_core::config::BridgeConfig;
use otns_bridge_core::topology::Subscription;
use otns_bridge_core::{CommandChannel, TopologyManager};
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::output::{OutputFormat, print_history};
use crate::utils::{
    print_device_failed, print_device_skipped, print_monitoring, print_nodes_removed,
};

pub async fn handle_live<C: CommandChannel + 'static>(
    manager: Arc<TopologyManager<C>>,
    config: &BridgeConfig,
    follow: Option<String>,
    summary: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut subscriptions = Vec::new();
    let mut children = Vec::new();

    match follow.as_deref() {
        Some("-") => {
            subscriptions.push(manager.follow("stdin", BufReader::new(tokio::io::stdin())));
        }
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("Failed to open {path}"))?;
            subscriptions.push(manager.follow(path, BufReader::new(file)));
        }
        None => {
            for device in &config.devices {
                let Some(command) = &device.command else {
                    print_device_skipped(&device.name);
                    continue;
                };
                match spawn_device(&manager, &device.name, command) {
                    Ok((child, mut feeds)) => {
                        children.push(child);
                        subscriptions.append(&mut feeds);
                    }
                    Err(e) => print_device_failed(&device.name, &e),
                }
            }
        }
    }
    ensure!(
        !subscriptions.is_empty(),
        "Nothing to monitor; configure a device command or use --follow"
    );

    print_monitoring(subscriptions.len());

    let aborts: Vec<_> = subscriptions.iter().map(Subscription::abort_handle).collect();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            debug!("Interrupt received");
        }
        _ = wait_all(subscriptions) => {
            debug!("All sources closed");
        }
    }
    for abort in aborts {
        abort.abort();
    }
    for mut child in children {
        if let Err(e) = child.kill().await {
            debug!("Device process already gone: {e}");
        }
    }

    manager.remove_all().await;
    print_nodes_removed();

    if summary {
        print_history(&manager.export().await, format)?;
    }
    Ok(())
}

/// Starts a device's process and subscribes to its stdout and stderr
fn spawn_device<C: CommandChannel + 'static>(
    manager: &Arc<TopologyManager<C>>,
    name: &str,
    command: &str,
) -> Result<(Child, Vec<Subscription>)> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start `{command}`"))?;
    debug!("Started `{command}` for {name}");

    let mut feeds = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        feeds.push(manager.subscribe(name, BufReader::new(stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        feeds.push(manager.subscribe(name, BufReader::new(stderr)));
    }
    Ok((child, feeds))
}

async fn wait_all(subscriptions: Vec<Subscription>) {
    for subscription in subscriptions {
        let source = subscription.source().to_string();
        if let Err(e) = subscription.join().await {
            debug!("Feed from {source} failed: {e:#}");
        }
    }
}
