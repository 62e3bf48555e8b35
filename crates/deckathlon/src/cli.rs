//! Clap derive structures for the `deckathlon` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// deckathlon -- inspect and edit a Deckathlon server's data
#[derive(Debug, Parser)]
#[command(
    name = "deckathlon",
    version,
    about = "Work with Deckathlon game server data from the command line",
    long_about = "Loads the site's schema, mirrors entity collections from the JSON API\n\
        and lets you list, edit, query and poll them the way the web client does.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Profile to use
    #[arg(long, short = 'p', env = "DECKATHLON_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "DECKATHLON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// API root URL (overrides profile)
    #[arg(long, short = 'r', env = "DECKATHLON_ROOT_URL", global = true)]
    pub root_url: Option<String>,

    /// Schema document (overrides profile)
    #[arg(long, short = 's', env = "DECKATHLON_SCHEMA", global = true)]
    pub schema: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "json", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Primary keys (or values), one per line
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the types defined by the schema
    Types,

    /// List items of a type
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one item
    Get(GetArgs),

    /// Show a new item with schema defaults
    Blank(BlankArgs),

    /// Create or update items
    Save(SaveArgs),

    /// Delete items
    #[command(alias = "rm")]
    Remove(RemoveArgs),

    /// Send an ad-hoc query and print its data
    Query(QueryArgs),

    /// Poll for pushed updates and print each store change
    Poll(PollArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Entity type
    pub type_name: String,

    /// Only items where FIELD equals VALUE (VALUE parsed as JSON if possible)
    #[arg(long = "where", short = 'w', value_name = "FIELD=VALUE")]
    pub filters: Vec<String>,

    /// Sort by this field instead of the schema order
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long, requires = "sort")]
    pub desc: bool,

    /// Use only locally known data, do not fetch
    #[arg(long)]
    pub local: bool,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    pub type_name: String,

    /// Primary key
    pub id: String,

    /// Print the related item of this type instead
    #[arg(long)]
    pub related: Option<String>,

    #[arg(long)]
    pub local: bool,
}

#[derive(Debug, Args)]
pub struct BlankArgs {
    pub type_name: String,

    /// Required foreign keys to prefill from their first loaded record
    #[arg(long = "require", value_name = "FIELD")]
    pub requireds: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SaveArgs {
    pub type_name: String,

    /// Item or array of items as JSON, or `-` for stdin
    pub data: String,
}

#[derive(Debug, Args)]
pub struct RemoveArgs {
    pub type_name: String,

    /// Primary keys
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// URL relative to the API root
    pub url: String,

    #[arg(long, short = 'X', default_value = "post")]
    pub method: HttpMethod,

    /// JSON payload
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Cache the result for this many seconds
    #[arg(long)]
    pub cache: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Args)]
pub struct PollArgs {
    /// Poll URL (defaults to the profile's)
    pub url: Option<String>,

    /// Interval in milliseconds (defaults to the profile's)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,

    /// Stop after this many ticks
    #[arg(long, short = 'n')]
    pub ticks: Option<u64>,

    /// JSON arguments sent with every tick
    #[arg(long, short = 'd')]
    pub data: Option<String>,
}
