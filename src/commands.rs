//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options. With no subcommand the interactive loop runs.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use olympiq::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command.unwrap_or_default() {
//!     Commands::Ask { question, .. } => println!("asking {question}"),
//!     Commands::Interactive { .. } => println!("interactive"),
//!     Commands::Load => println!("loading"),
//!     Commands::Init => println!("writing defaults"),
//! }
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Path to config.yaml. Defaults to the per-user config directory.
    #[arg(long, short = 'c', env = "OLYMPIQ_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Overrides for the configured retrieval settings.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct SearchArgs {
    /// Number of passages passed to the model.
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,

    /// Minimum cosine relevance for a passage to be used.
    #[arg(long, short = 'm', allow_hyphen_values = true)]
    pub min_relevance: Option<f64>,

    /// Prompt template name under `<config_dir>/templates/`.
    #[arg(long, short = 't')]
    pub template: Option<String>,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug, Clone, PartialEq)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Load the articles and answer a single question.
    #[clap(name = "ask", alias = "a")]
    Ask {
        /// The question to be asked.
        question: String,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Load the articles and answer questions until `exit`.
    ///
    /// This subcommand can be invoked with either 'i' or 'interactive'.
    #[clap(name = "interactive", alias = "i")]
    Interactive {
        #[command(flatten)]
        search: SearchArgs,
    },

    /// Download (if needed) and load the articles, then print the load report.
    #[clap(name = "load", alias = "l")]
    Load,

    /// Write a default config.yaml and prompt template.
    Init,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Interactive {
            search: SearchArgs::default(),
        }
    }
}
