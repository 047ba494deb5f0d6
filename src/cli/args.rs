//! Command-line argument parsing for ragquery
//!
//! Provides clap-based CLI with subcommands and verbosity control. Every
//! deployment setting can also come from the environment.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ConfigOverrides;
use crate::telemetry::LogFormat;

/// ragquery - retrieval-augmented question answering
#[derive(Parser, Debug)]
#[command(name = "ragquery")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Answer questions from a semantic document index", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only the answer is printed)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormatArg::Text, env = "LOG_FORMAT", global = true)]
    pub log_format: LogFormatArg,

    #[command(flatten)]
    pub settings: Settings,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Deployment settings layered over the configuration file
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Settings {
    #[arg(long, env = "SUPABASE_URL", global = true)]
    pub supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_KEY", global = true, hide_env_values = true)]
    pub supabase_key: Option<String>,

    #[arg(long, env = "OLLAMA_BASE_URL", global = true)]
    pub ollama_url: Option<String>,

    #[arg(long, env = "EMBEDDING_MODEL", global = true)]
    pub embedding_model: Option<String>,

    #[arg(long, env = "LLM_MODEL", global = true)]
    pub llm_model: Option<String>,

    #[arg(long, env = "RERANKER_ENABLED", global = true)]
    pub reranker_enabled: Option<bool>,

    #[arg(long, env = "MATCH_THRESHOLD", global = true)]
    pub match_threshold: Option<f64>,

    #[arg(long, env = "MATCH_COUNT", global = true)]
    pub match_count: Option<usize>,

    #[arg(long, env = "INITIAL_RETRIEVAL_COUNT", global = true)]
    pub initial_retrieval_count: Option<usize>,

    #[arg(long, env = "FINAL_RESULT_COUNT", global = true)]
    pub final_result_count: Option<usize>,

    #[arg(long, env = "VECTOR_TABLE_NAME", global = true)]
    pub vector_table: Option<String>,

    #[arg(long, env = "PORT", global = true)]
    pub port: Option<u16>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP service
    Serve,

    /// Answer one question and exit
    Ask {
        /// Question to answer
        #[arg(value_name = "QUESTION")]
        question: String,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,

        /// Search a local JSON corpus instead of the configured vector store
        #[arg(long, value_name = "FILE")]
        corpus: Option<PathBuf>,

        /// Similarity threshold for this question
        #[arg(long)]
        threshold: Option<f64>,

        /// Skip the reranker for this question
        #[arg(long)]
        no_rerank: bool,
    },

    /// Display current configuration
    Config,
}

/// Log format accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Settings {
    /// Overrides to apply on top of the loaded configuration
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            supabase_url: self.supabase_url.clone(),
            supabase_key: self.supabase_key.clone(),
            ollama_url: self.ollama_url.clone(),
            embedding_model: self.embedding_model.clone(),
            llm_model: self.llm_model.clone(),
            reranker_enabled: self.reranker_enabled,
            match_threshold: self.match_threshold,
            match_count: self.match_count,
            initial_retrieval_count: self.initial_retrieval_count,
            final_result_count: self.final_result_count,
            vector_table: self.vector_table.clone(),
            port: self.port,
        }
    }
}

impl Verbosity {
    /// Check if should show progress bars
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show sources and metadata
    pub fn show_details(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
