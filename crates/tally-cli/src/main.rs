#![forbid(unsafe_code)]

mod cmd;
mod output;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::process::ExitCode;
use tally_core::config::{self, Config};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cmd::context::AppContext;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tally: offline-first customer ledger with cloud sync",
    long_about = None
)]
struct Cli {
    /// Enable debug logging (unless TALLY_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output (alias for `--format json`).
    #[arg(long, global = true)]
    json: bool,

    /// Output format: pretty, text or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Work against the local cache only; skip the cloud for this run.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Session",
        about = "Log in to an account",
        long_about = "Activate an account: load its ledger from the local cache, then pull from the cloud.",
        after_help = "EXAMPLES:\n    # Log in\n    tally login shop@example.com\n\n    # Log in without touching the network\n    tally --offline login shop@example.com"
    )]
    Login(cmd::account::LoginArgs),

    #[command(
        next_help_heading = "Session",
        about = "Log out of the active account",
        after_help = "EXAMPLES:\n    # Log out after a final sync\n    tally logout\n\n    # Log out even with unsynced changes\n    tally logout --force"
    )]
    Logout(cmd::account::LogoutArgs),

    #[command(next_help_heading = "Session", about = "Show the active account")]
    Whoami,

    #[command(
        next_help_heading = "Session",
        about = "List or sign out devices using this account",
        after_help = "EXAMPLES:\n    # Devices signed in to this account\n    tally sessions list\n\n    # Sign out one device\n    tally sessions revoke <DEVICE_ID>\n\n    # Sign out every idle device\n    tally sessions revoke --idle"
    )]
    Sessions {
        #[command(subcommand)]
        command: cmd::sessions::SessionsCommand,
    },

    #[command(
        next_help_heading = "Ledger",
        about = "Manage customers",
        after_help = "EXAMPLES:\n    # Add a customer\n    tally customer add \"Asha\" --phone 5550100\n\n    # List by balance\n    tally customer list --sort balance-asc"
    )]
    Customer {
        #[command(subcommand)]
        command: cmd::customer::CustomerCommand,
    },

    #[command(
        next_help_heading = "Ledger",
        about = "Manage the item catalog",
        after_help = "EXAMPLES:\n    # Add an item\n    tally item add Rice --price 2.5 --unit kg\n\n    # Bulk add from a file of `name, price[, unit]` lines\n    tally item bulk-add --file items.txt"
    )]
    Item {
        #[command(subcommand)]
        command: cmd::item::ItemCommand,
    },

    #[command(
        next_help_heading = "Ledger",
        about = "Record and list transactions",
        after_help = "EXAMPLES:\n    # Record credit given\n    tally tx add <CUSTOMER_ID> gave 120 --description \"groceries\"\n\n    # Record a sale from the catalog\n    tally tx add <CUSTOMER_ID> gave --item <ITEM_ID>:2\n\n    # List payments received in June\n    tally tx list --kind got --from 2024-06-01 --to 2024-06-30"
    )]
    Tx {
        #[command(subcommand)]
        command: cmd::tx::TxCommand,
    },

    #[command(next_help_heading = "Ledger", about = "Show dashboard totals")]
    Summary,

    #[command(
        next_help_heading = "Sync",
        about = "Sync with the cloud now",
        long_about = "Run one pull, merge, push cycle. Resumes background sync after an authentication failure.",
        after_help = "EXAMPLES:\n    tally sync\n    tally sync --json"
    )]
    Sync,

    #[command(next_help_heading = "Sync", about = "Show sync status")]
    Status,

    #[command(
        next_help_heading = "Sync",
        about = "Keep syncing in the background",
        after_help = "EXAMPLES:\n    # Sync every interval until Ctrl-C\n    tally watch\n\n    # Stop after five minutes\n    tally watch --duration 300"
    )]
    Watch(cmd::sync::WatchArgs),

    #[command(next_help_heading = "Backup", about = "Export the ledger to a JSON backup")]
    Export(cmd::backup::ExportArgs),

    #[command(
        next_help_heading = "Backup",
        about = "Merge a JSON backup into the ledger",
        long_about = "Merge a backup into the active account. Existing records are kept; newer records win."
    )]
    Import(cmd::backup::ImportArgs),

    #[command(
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    tally completions bash\n    tally completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "tally=debug,tally_core=debug,info"
        } else {
            "tally=info,tally_core=info,warn"
        })
    });

    let format = env::var("TALLY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

async fn dispatch(command: Commands, ctx: &AppContext) -> anyhow::Result<()> {
    match command {
        Commands::Login(args) => cmd::account::run_login(&args, ctx).await,
        Commands::Logout(args) => cmd::account::run_logout(&args, ctx).await,
        Commands::Whoami => cmd::account::run_whoami(ctx),
        Commands::Sessions { command } => cmd::sessions::run_sessions(&command, ctx).await,
        Commands::Customer { command } => cmd::customer::run_customer(&command, ctx).await,
        Commands::Item { command } => cmd::item::run_item(&command, ctx).await,
        Commands::Tx { command } => cmd::tx::run_tx(&command, ctx).await,
        Commands::Summary => cmd::summary::run_summary(ctx),
        Commands::Sync => cmd::sync::run_sync(ctx).await,
        Commands::Status => cmd::sync::run_status(ctx),
        Commands::Watch(args) => cmd::sync::run_watch(&args, ctx).await,
        Commands::Export(args) => cmd::backup::run_export(&args, ctx),
        Commands::Import(args) => cmd::backup::run_import(&args, ctx).await,
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

fn run(cli: Cli, config: Config, output: OutputMode) -> anyhow::Result<()> {
    let ctx = AppContext::new(config, output, cli.offline)?;
    debug!(data_dir = %ctx.data_dir.display(), offline = ctx.offline, "starting");

    // One logical thread of control: mutations, timers and sync cycles all
    // interleave on this runtime.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(dispatch(cli.command, &ctx))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match config::load_config() {
        Ok(config) => config,
        Err(err) => {
            let output = resolve_output_mode(cli.format, cli.json, None);
            report_failure(output, &err);
            return ExitCode::FAILURE;
        }
    };
    let output = resolve_output_mode(cli.format, cli.json, config.output.as_deref());

    match run(cli, config, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_failure(output, &err);
            ExitCode::FAILURE
        }
    }
}

fn report_failure(output: OutputMode, err: &anyhow::Error) {
    if let Err(render_err) = render_error(output, &CliError::from_anyhow(err)) {
        eprintln!("error: {err:#} (while rendering: {render_err})");
    }
}
