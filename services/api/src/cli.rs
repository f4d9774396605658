use crate::demo::{run_demo, run_fee_compute, DemoArgs, FeeComputeArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use class_dispatch::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Class Dispatch",
    about = "Price school class requests, dispatch instructors and settle their payments",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Fee tooling for admins checking a rule table
    Fees {
        #[command(subcommand)]
        command: FeesCommand,
    },
    /// Run a seeded end-to-end dispatch demo: matching, quoting, assignment and payment
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum FeesCommand {
    /// Print the fee breakdown for one class
    Compute(FeeComputeArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Settings CSV export to load instead of APP_RULES_PATH
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
    /// Start with the demo schools and instructors loaded
    #[arg(long)]
    pub(crate) seed_demo: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Fees {
            command: FeesCommand::Compute(args),
        } => run_fee_compute(args),
        Command::Demo(args) => run_demo(args),
    }
}
