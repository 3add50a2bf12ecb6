use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CollectArgs {
    #[arg(
        long,
        help = "Catastrophe records JSON (array, {\"examples\": [...]} or {\"catastrophes\": [...]})"
    )]
    pub records: PathBuf,

    #[arg(long, help = "Write the dataset JSON here instead of stdout")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Write the collection report JSON here")]
    pub report: Option<PathBuf>,

    #[arg(long, help = "Catastrophes collected concurrently (overrides run.concurrency)")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Only collect the catastrophes with these ids")]
    pub only: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct WindowArgs {
    #[arg(long, help = "Repository URL")]
    pub repo: String,

    #[arg(long, help = "Pivot commit id")]
    pub commit: String,

    #[arg(long, help = "Ancestors to fetch (overrides window.ancestors)")]
    pub ancestors: Option<usize>,

    #[arg(long, help = "Descendants to fetch (overrides window.descendants)")]
    pub descendants: Option<usize>,

    #[arg(long, help = "Find descendants through git only, never the GitHub API")]
    pub no_github: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct VerifyArgs {
    #[arg(long, help = "Catastrophe records JSON")]
    pub records: PathBuf,

    #[arg(long, help = "Only verify the catastrophes with these ids")]
    pub only: Vec<String>,

    #[arg(long, help = "Print JSON instead of a table")]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ComponentArgs {
    #[arg(long, help = "Source file (the after version when --before is given)")]
    pub file: PathBuf,

    #[arg(long, help = "Earlier version of the file; roots become the changed symbols")]
    pub before: Option<PathBuf>,

    #[arg(long = "symbol", help = "Root symbol (repeatable); required without --before")]
    pub symbols: Vec<String>,

    #[arg(long, help = "Hop bound (overrides sampling.k_hops)")]
    pub k: Option<usize>,

    #[arg(long, help = "Language tag when the file extension is not enough")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Collect the stratified dataset for a set of catastrophes
    Collect(CollectArgs),
    /// Fetch one history window and print it as JSON
    Window(WindowArgs),
    /// Check that every record's fix commit can be fetched
    Verify(VerifyArgs),
    /// Print the dependency component of a file or a change
    Component(ComponentArgs),
    /// Write a default faultline.toml into the workspace
    Init,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Component-aware hard-negative miner")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root holding faultline.toml"
    )]
    pub workspace: PathBuf,

    #[arg(long, global = true, help = "Explicit config file path")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}
