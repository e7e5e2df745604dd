use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use otns_bridge_core::{CommandChannel, Replayer, TopologyManager};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::debug;

use crate::output::{OutputFormat, print_history, print_output};
use crate::utils::{print_info, print_replay_outcome};

pub struct ReplayOptions {
    pub speed: f64,
    pub start_line: usize,
    pub stop: Option<String>,
    pub summary: bool,
}

pub async fn handle_replay<C: CommandChannel + 'static>(
    manager: Arc<TopologyManager<C>>,
    log: &Path,
    options: ReplayOptions,
    format: OutputFormat,
) -> Result<()> {
    let stop = options
        .stop
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("Invalid stop pattern")?;

    let file = File::open(log)
        .await
        .with_context(|| format!("Failed to open {}", log.display()))?;
    let size = file.metadata().await.map(|m| m.len()).unwrap_or_default();

    let progress = ProgressBar::new(size);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    if format == OutputFormat::Json {
        progress.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let observed = progress.clone();
    let mut replayer = Replayer::new(Arc::clone(&manager), options.speed)?.with_observer(
        move |index, line| {
            observed.inc(line.len() as u64 + 1);
            observed.set_message(format!("line {index}"));
        },
    );

    let cancel = replayer.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, stopping replay");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    print_info(&format!(
        "Replaying {} at {}x",
        log.display(),
        options.speed
    ));
    replayer.announce_speed().await;

    let outcome = replayer
        .run(BufReader::new(file), options.start_line, stop.as_ref())
        .await?;
    progress.finish_and_clear();

    print_replay_outcome(&outcome);

    if options.summary {
        print_history(&manager.export().await, format)?;
    } else if format == OutputFormat::Json {
        print_output(outcome, format)?;
    }
    Ok(())
}
