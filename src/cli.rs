use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Content Guard - check text against a configurable content rule set
#[derive(Parser, Debug)]
#[command(name = "content-guard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a single text (use - to read from stdin)
    Check {
        /// Text to check, or - for stdin
        text: String,

        /// Path to the rule document
        #[arg(short, long, env = "RULES_PATH")]
        rules: Option<PathBuf>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format,

        /// Disable the result cache
        #[arg(long)]
        no_cache: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool
    },

    /// Check a batch of texts, one per line (use - for stdin)
    Batch {
        /// Path to the input file
        file: PathBuf,

        /// Path to the rule document
        #[arg(short, long, env = "RULES_PATH")]
        rules: Option<PathBuf>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format,

        /// Disable the result cache
        #[arg(long)]
        no_cache: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool
    },

    /// List loaded rules
    Rules {
        /// Path to the rule document
        #[arg(short, long, env = "RULES_PATH")]
        rules: Option<PathBuf>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format
    },

    /// Force a reload of the rule document
    Reload {
        /// Path to the rule document
        #[arg(short, long, env = "RULES_PATH")]
        rules: Option<PathBuf>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format
    },

    /// Report subsystem health
    Health {
        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml
}
