//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sieve - Extract question/answer pairs from support conversations.
#[derive(Debug, Parser)]
#[command(name = "sieve")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path (defaults to ~/.sieve/config.toml)
    #[arg(short, long, global = true, env = "SIEVE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (questions only)
    Quiet,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract Q&A pairs from a conversation file
    Extract(ExtractArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

/// Arguments for the extract command.
#[derive(Debug, Parser)]
pub struct ExtractArgs {
    /// Conversation file, or `-` for stdin
    pub file: PathBuf,

    /// Platform the conversation came from (e.g. zendesk, discord)
    #[arg(long)]
    pub platform: Option<String>,

    /// Conversation language
    #[arg(long)]
    pub language: Option<String>,

    /// Completion provider
    #[arg(long, value_enum)]
    pub provider: Option<ProviderArg>,

    /// Model name passed to the provider
    #[arg(long)]
    pub model: Option<String>,

    /// Provider endpoint or base URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Skip the completion service and use pattern extraction only
    #[arg(long)]
    pub pattern_only: bool,

    /// Give up on the AI path after this many seconds
    #[arg(
        long,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..=sieve_extractor::MAX_DURATION_SECS)
    )]
    pub timeout: Option<u64>,
}

/// Arguments for the config command.
#[derive(Debug, Parser)]
pub struct ConfigArgs {
    /// Print built-in defaults instead of the effective configuration
    #[arg(long)]
    pub show_defaults: bool,
}

/// Provider argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderArg {
    /// Local Ollama server
    Ollama,
    /// OpenAI-compatible chat completions API
    Openai,
    /// Offline provider that finds nothing
    Mock,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
            CliFormat::Quiet => crate::config::OutputFormat::Quiet,
        }
    }
}

impl From<ProviderArg> for crate::config::ProviderKind {
    fn from(provider: ProviderArg) -> Self {
        match provider {
            ProviderArg::Ollama => crate::config::ProviderKind::Ollama,
            ProviderArg::Openai => crate::config::ProviderKind::OpenAi,
            ProviderArg::Mock => crate::config::ProviderKind::Mock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    #[test]
    fn test_extract_command() {
        let cli = Cli::parse_from([
            "sieve",
            "extract",
            "ticket.txt",
            "--platform",
            "zendesk",
            "--provider",
            "openai",
            "--timeout",
            "30",
        ]);
        match cli.command {
            Command::Extract(args) => {
                assert_eq!(args.file, PathBuf::from("ticket.txt"));
                assert_eq!(args.platform.as_deref(), Some("zendesk"));
                assert_eq!(args.provider, Some(ProviderArg::Openai));
                assert_eq!(args.timeout, Some(30));
                assert!(!args.pattern_only);
            }
            _ => panic!("Expected Extract command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["sieve", "config", "--show-defaults", "--format", "json", "--no-color"]);
        assert_eq!(cli.format, Some(CliFormat::Json));
        assert!(cli.no_color);
        assert!(matches!(cli.command, Command::Config(ConfigArgs { show_defaults: true })));
    }

    #[test]
    fn test_out_of_range_timeout_is_rejected() {
        assert!(Cli::try_parse_from(["sieve", "extract", "ticket.txt", "--timeout", "0"]).is_err());
        let huge = u64::MAX.to_string();
        assert!(Cli::try_parse_from(["sieve", "extract", "ticket.txt", "--timeout", huge.as_str()]).is_err());
    }

    #[test]
    fn test_missing_file_is_rejected() {
        assert!(Cli::try_parse_from(["sieve", "extract"]).is_err());
    }

    #[test]
    fn test_provider_conversion() {
        let kind: ProviderKind = ProviderArg::Openai.into();
        assert_eq!(kind, ProviderKind::OpenAi);
    }
}
