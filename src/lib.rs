//! # Olympiq (library root)
//!
//! Retrieval-augmented question answering over the 2022 Winter Olympics
//! Wikipedia sections, with the vectors held in memory:
//! - An in-memory vector store with named collections (`vector_store`, `record`).
//! - Exact cosine top-k retrieval and the text-level query surface (`retriever`).
//! - CSV ingestion with download, cancellation and progress (`ingest`).
//! - OpenAI-compatible embedding and chat providers (`api`).
//! - Prompt templates and the question loop (`template`, `qa`, `pretty`).
//! - CLI parsing and configuration (`commands`, `config`, `error`).
//!
//! ## Flow
//!
//! ```text
//! CsvLoader ──► ingest ──► MemoryStore ◄── nearest ◄── SemanticMemory::search
//!                                                          │
//!                          ChatProvider::complete ◄── answer_question
//! ```
//!
//! ## Configuration directory
//!
//! `config.yaml` and `templates/` live under [`config_dir`]:
//!
//! - macOS: `~/Library/Application Support/com.olympiq.olympiq`
//! - Linux (XDG): `~/.config/olympiq`
//! - Windows: `C:\Users\<you>\AppData\Roaming\olympiq\olympiq\config`
//!
//! ## Modules
//! - [`api`], [`commands`], [`config`], [`error`], [`ingest`], [`pretty`],
//!   [`qa`], [`record`], [`retriever`], [`template`], [`vector_store`]

use directories::ProjectDirs;
use std::{error::Error, path::PathBuf};

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod ingest;
pub mod pretty;
pub mod qa;
pub mod record;
pub mod retriever;
pub mod template;
pub mod vector_store;

/// Return the per-platform configuration directory.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "olympiq", "olympiq")`. The directory is **not** created here;
/// `init` creates it.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined
/// (which is rare but possible in heavily sandboxed environments).
///
/// # Examples
/// ```rust
/// let cfg = olympiq::config_dir().expect("has a config dir");
/// assert!(cfg.ends_with("olympiq") || cfg.ends_with("config"));
/// ```
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "olympiq", "olympiq")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
