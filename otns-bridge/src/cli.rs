use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "otns-bridge")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Bridge configuration file (TOML)
    #[arg(short, long, global = true, env = "OTNS_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Visualizer host, overriding the configuration
    #[arg(short = 's', long, global = true)]
    pub server: Option<String>,

    /// Visualizer connect timeout (e.g. 10s, 1m)
    #[arg(short = 't', long, global = true, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Log visualizer commands instead of sending them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Output in JSON format
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Table
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a recorded test log
    Replay {
        /// Log file to replay
        log: PathBuf,

        /// Playback speed; 2 plays twice as fast as recorded
        #[arg(short = 'p', long, default_value_t = 1.0)]
        speed: f64,

        /// Skip this many lines before replaying
        #[arg(long, default_value_t = 0)]
        start_line: usize,

        /// Stop before the first line matching this pattern
        #[arg(long)]
        stop: Option<String>,

        /// Print the topology history when done
        #[arg(long)]
        summary: bool,
    },

    /// Stream live device output until interrupted
    Live {
        /// Follow a combined log file instead of device commands ("-" for stdin)
        #[arg(long)]
        follow: Option<String>,

        /// Print the topology history when done
        #[arg(long)]
        summary: bool,
    },

    /// Decode a hex encoded event datagram
    Decode {
        /// Datagram bytes as hex
        hex: String,
    },
}
