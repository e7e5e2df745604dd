mod decode;
mod live;
mod replay;

use anyhow::{Context, Result};
use otns_bridge_core::transport::local_host_for;
use otns_bridge_core::{
    BridgeConfig, CommandChannel, GrpcChannel, ManagerSettings, RecordingChannel, TopologyManager,
};
use std::sync::Arc;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::output::OutputFormat;
use crate::utils::print_dry_run;

pub async fn handle_command(cli: Cli) -> Result<()> {
    let output_format = cli.output_format();

    // Decoding needs neither configuration nor visualizer
    if let Commands::Decode { hex } = &cli.command {
        return decode::handle_decode(hex, output_format);
    }

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(server) = &cli.server {
        config = config.with_host(server.clone());
    }

    let event_server = config.event_server().await?;
    let local_host = match config.visualizer.local_host {
        Some(host) => host,
        None => local_host_for(event_server).await?,
    };
    let settings = ManagerSettings::new(event_server, local_host)
        .with_layout(config.layout_params())
        .with_root_entity(config.root_entity.clone());
    info!("Sending events from {local_host} to {event_server}");

    if cli.dry_run {
        print_dry_run();
        return run(cli, config, settings, RecordingChannel::new(), output_format).await;
    }

    let timeout = cli.timeout.unwrap_or_else(|| config.connect_timeout());
    let channel = GrpcChannel::connect(&config.command_address(), timeout)
        .await
        .context("Visualizer is not reachable")?;
    run(cli, config, settings, channel, output_format).await
}

async fn run<C: CommandChannel + 'static>(
    cli: Cli,
    config: BridgeConfig,
    settings: ManagerSettings,
    channel: C,
    format: OutputFormat,
) -> Result<()> {
    let manager = Arc::new(TopologyManager::new(
        settings,
        config.device_handles(),
        channel,
    )?);

    match cli.command {
        Commands::Replay {
            log,
            speed,
            start_line,
            stop,
            summary,
        } => {
            let options = replay::ReplayOptions {
                speed,
                start_line,
                stop,
                summary,
            };
            replay::handle_replay(manager, &log, options, format).await
        }
        Commands::Live { follow, summary } => {
            live::handle_live(manager, &config, follow, summary, format).await
        }
        Commands::Decode { hex } => decode::handle_decode(&hex, format),
    }
}
