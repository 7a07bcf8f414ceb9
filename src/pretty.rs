//! # Console output
//!
//! Colored terminal output for the question loop, plus the spinner shown while
//! the CSV is loaded.
//!
//! | Element | Rendering |
//! |---------|-----------|
//! | random question banner | green `RANDOM QUESTION:` |
//! | retrieval hit | `Semantic result #<rank>, Relevance: <score>.` |
//! | question | cyan `QUESTION:` header |
//! | answer | yellow `RESPONSE:` header |
//! | failure | red |
//!
//! Every printer writes to any [`Write`] so it can be pointed at a buffer; the
//! binary passes `stdout()`.
//!
//! ```no_run
//! use olympiq::pretty::print_answer;
//! use std::io::stdout;
//!
//! print_answer(&mut stdout(), "What is 2+2?", "I could not find an answer.").unwrap();
//! ```

use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::io::Write;
use std::time::Duration;

use crate::ingest::IngestProgress;
use crate::retriever::MemoryQueryResult;

pub const SEPARATOR: &str = "------";

fn colored<W: Write>(out: &mut W, color: Color, text: &str) -> Result<(), Box<dyn Error>> {
    out.execute(SetForegroundColor(color))?;
    write!(out, "{text}")?;
    out.execute(SetForegroundColor(Color::Reset))?;
    Ok(())
}

/// The question prompt. No newline; the user's Enter ends the line.
pub fn print_prompt<W: Write>(out: &mut W) -> Result<(), Box<dyn Error>> {
    write!(
        out,
        "Ask a question about the 2022 Winter Olympics (or press Enter for a random question):"
    )?;
    out.flush()?;
    Ok(())
}

pub fn print_random_question<W: Write>(out: &mut W, question: &str) -> Result<(), Box<dyn Error>> {
    colored(out, Color::Green, "RANDOM QUESTION: ")?;
    writeln!(out, "{question}")?;
    Ok(())
}

/// One line per retrieval hit; `rank` counts from 0.
pub fn print_match<W: Write>(
    out: &mut W,
    rank: usize,
    hit: &MemoryQueryResult,
) -> Result<(), Box<dyn Error>> {
    writeln!(out, "Semantic result #{rank}, Relevance: {}.", hit.relevance)?;
    Ok(())
}

pub fn print_answer<W: Write>(
    out: &mut W,
    question: &str,
    response: &str,
) -> Result<(), Box<dyn Error>> {
    writeln!(out, "{SEPARATOR}")?;
    out.execute(SetAttribute(Attribute::Bold))?;
    colored(out, Color::Cyan, "QUESTION:")?;
    out.execute(SetAttribute(Attribute::Reset))?;
    writeln!(out)?;
    writeln!(out, "{question}")?;
    writeln!(out)?;
    out.execute(SetAttribute(Attribute::Bold))?;
    colored(out, Color::Yellow, "RESPONSE:")?;
    out.execute(SetAttribute(Attribute::Reset))?;
    writeln!(out)?;
    writeln!(out, "{response}")?;
    writeln!(out, "{SEPARATOR}")?;
    out.flush()?;
    Ok(())
}

pub fn print_error<W: Write>(out: &mut W, err: &dyn Error) -> Result<(), Box<dyn Error>> {
    colored(out, Color::Red, &format!("Error: {err}"))?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Spinner for the ingestion phase. Update it with [`loading_message`].
pub fn loading_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Loading memory records...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

pub fn loading_message(progress: IngestProgress) -> String {
    if progress.skipped == 0 {
        format!("Loaded {} memory records...", progress.ingested)
    } else {
        format!(
            "Loaded {} memory records ({} skipped)...",
            progress.ingested, progress.skipped
        )
    }
}
