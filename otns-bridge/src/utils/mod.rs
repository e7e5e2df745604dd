use colored::*;
use otns_bridge_core::replay::{ReplayOutcome, ReplayState};

fn status(prefix: ColoredString, message: &str) {
    eprintln!("{prefix} {message}");
}

pub fn print_error(message: &str) {
    status("Error:".red().bold(), message);
}

pub fn print_info(message: &str) {
    status("ℹ".blue().bold(), message);
}

pub fn print_dry_run() {
    print_info("Dry run, visualizer commands are only logged");
}

pub fn print_device_skipped(device: &str) {
    status(
        "⚠".yellow().bold(),
        &format!("Device {} has no command, skipping", device.bold()),
    );
}

pub fn print_device_failed(device: &str, error: &anyhow::Error) {
    print_error(&format!("{}: {error:#}", device.bold()));
}

pub fn print_monitoring(sources: usize) {
    print_info(&format!(
        "Monitoring {sources} sources, press {} to stop",
        "Ctrl-C".bold()
    ));
}

pub fn print_nodes_removed() {
    status("✓".green().bold(), "Removed all nodes from the visualizer");
}

/// Reports how a replay ended; a stopped replay gets its resume flag
pub fn print_replay_outcome(outcome: &ReplayOutcome) {
    match outcome.state {
        ReplayState::Stopped => print_info(&format!(
            "Replay stopped at line {line}, resume with {flag}",
            line = outcome.last_line,
            flag = format!("--start-line {}", outcome.last_line).bold()
        )),
        _ => status(
            "✓".green().bold(),
            &format!(
                "Replayed {lines} lines, {dispatched} dispatched",
                lines = outcome.last_line,
                dispatched = outcome.dispatched
            ),
        ),
    }
}
