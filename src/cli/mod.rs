mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use datex::Config;

#[derive(Parser)]
#[command(name = "datex", version, about = "DATEX binary inspection tooling")]
struct Cli {
    /// JSON configuration file
    #[arg(short = 'c', long = "config", global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log decode milestones to stderr
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decompile a DXB message back into script text
    Decompile(DecompileArgs),
    /// Inspect endpoint identities
    Endpoint {
        #[command(subcommand)]
        command: EndpointCommand,
    },
    /// Inspect encoded quantities
    Quantity {
        #[command(subcommand)]
        command: QuantityCommand,
    },
}

#[derive(Args)]
pub(crate) struct DecompileArgs {
    /// Input file, or `-` for stdin
    #[arg(default_value = "-")]
    pub(crate) input: PathBuf,
    /// Input is base64 text
    #[arg(long, conflicts_with = "hex")]
    pub(crate) base64: bool,
    /// Input is hex text
    #[arg(long)]
    pub(crate) hex: bool,
    /// Input is a bare body without message header
    #[arg(long = "no-header")]
    pub(crate) no_header: bool,
    /// Indent multi-line subscopes
    #[arg(long)]
    pub(crate) formatted: bool,
    /// Keep newlines in strings literal
    #[arg(long = "formatted-strings")]
    pub(crate) formatted_strings: bool,
    /// Drop jump annotations
    #[arg(long = "no-comments")]
    pub(crate) no_comments: bool,
    /// Print the token tree as JSON instead of script text
    #[arg(long)]
    pub(crate) tokens: bool,
}

#[derive(Subcommand)]
pub(crate) enum EndpointCommand {
    /// Show the canonical form and binary layout of an endpoint
    Show {
        /// Endpoint text such as `@alice/0001` or `@@local`
        name: String,
    },
    /// Check whether VALUE satisfies the filter AGAINST
    Match {
        value: String,
        against: String,
        /// Treat AGAINST as a wildcard over every instance
        #[arg(long)]
        wildcard: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum QuantityCommand {
    /// Render a hex-encoded quantity record
    Decode {
        hex: String,
        /// Render base units without aliases
        #[arg(long)]
        base: bool,
    },
}

pub(crate) fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Decompile(args) => commands::cmd_decompile(&config, &args),
        Command::Endpoint { command } => commands::cmd_endpoint(command),
        Command::Quantity { command } => commands::cmd_quantity(command),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
