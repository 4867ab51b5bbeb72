//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Record an exercise attempt from a camera source and get it scored
#[derive(Parser, Debug)]
#[command(name = "pose-capture")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record one attempt and submit it for scoring
    Record {
        /// Exercise task id
        #[arg(short, long)]
        task: String,

        /// Directory of frames to replay as the camera
        #[arg(short, long)]
        frames: PathBuf,

        /// Recording length in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Reference video the attempt is compared against
        #[arg(long)]
        reference_video: Option<String>,

        /// User id sent with the attempt (defaults to the stored login)
        #[arg(long)]
        user: Option<String>,

        /// Stop when the reference clip ends instead of after --duration
        #[arg(long)]
        follow_reference: bool,

        /// Replay the frame directory in a loop
        #[arg(long = "loop")]
        loop_frames: bool,
    },

    /// Show the reference pose sequence for a task
    Reference {
        /// Exercise task id
        #[arg(short, long)]
        task: String,

        /// Reference video URL, used to pick the most specific file
        #[arg(long)]
        video: Option<String>,

        /// Download the sequence from this URL instead of the local library
        #[arg(long)]
        url: Option<String>,
    },

    /// Manage the stored access token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum TokenAction {
    /// Store a bearer token for scoring requests
    Set {
        token: String,

        #[arg(long)]
        user: Option<String>,
    },
    /// Remove the stored token
    Clear,
    /// Show whether a token is stored
    Show,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Restore defaults
    Reset,
    /// Print the configuration file path
    Path,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
