use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "work-pilot")]
#[command(author, version, about = "Natural-language work tracking", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Directory holding .work-pilot (default: current directory)
    #[arg(long, global = true, env = "WORK_PILOT_ROOT")]
    pub root: Option<PathBuf>,
}

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize work-pilot in the current directory
    Init,

    /// Interpret and run one utterance, e.g. "list epics"
    Exec {
        utterance: String,

        /// Current project for this command
        #[arg(long, short = 'p')]
        project: Option<u64>,

        /// Override the confidence threshold for this run
        #[arg(long)]
        threshold: Option<f32>,

        /// Physically remove deleted entities
        #[arg(long)]
        hard: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Reset to defaults
    Reset,
}
