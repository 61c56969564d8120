//! Command-line interface definitions for Inbox Digest.
//!
//! Secrets are read from flags or environment variables only; they are never
//! part of the YAML config.

use crate::summarizer::LengthTier;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Inbox Digest application.
///
/// # Examples
///
/// ```sh
/// # Scrape and summarize the top 3 inbox articles (manual login in the browser window)
/// OPENAI_API_KEY=sk-... inbox_digest
///
/// # Scripted login, five articles, brief summaries, written to a file
/// inbox_digest --email me@example.com --password '...' \
///     --json-output ./out/today.json refresh --limit 5 --length 1
///
/// # One article
/// inbox_digest summarize https://example.substack.com/p/some-post --length 3
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file (defaults to ./inbox_digest.yaml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Platform login email (enables scripted login together with --password)
    #[arg(long, env = "SUBSTACK_EMAIL", global = true)]
    pub email: Option<String>,

    /// Platform login password
    #[arg(long, env = "SUBSTACK_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// API key for the summarization provider
    #[arg(long, env = "OPENAI_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Write the JSON result to this file instead of stdout
    #[arg(short, long, global = true)]
    pub json_output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scrape the inbox and summarize each article (default)
    Refresh {
        /// Number of inbox entries to process (defaults to inbox.default_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Summary length tier: 1 (1-2 sentences), 2 (3-4), 3 (5-6)
        #[arg(short = 'n', long, default_value_t = 2)]
        length: u8,
    },

    /// Scrape the inbox without summarizing
    Inbox {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Summarize a single article
    Summarize {
        url: String,

        #[arg(short = 'n', long, default_value_t = 2)]
        length: u8,
    },
}

impl Command {
    pub fn tier(&self) -> LengthTier {
        match self {
            Command::Refresh { length, .. } | Command::Summarize { length, .. } => LengthTier::from(*length),
            Command::Inbox { .. } => LengthTier::default(),
        }
    }
}

impl Cli {
    /// The subcommand to run; `refresh` with defaults when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Refresh {
            limit: None,
            length: 2,
        })
    }
}
