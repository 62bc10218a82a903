use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use ratefeed::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display current exchange rates
    Rates {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare cash-out channels for an amount of USDT
    Compare {
        /// Amount in USDT, or in the city's payout currency with --fiat
        amount: f64,
        /// City slug, defaults to the first configured city
        #[arg(long)]
        city: Option<String>,
        /// Treat the amount as payout currency and work out the USDT needed
        #[arg(long)]
        fiat: bool,
    },
}

impl From<Commands> for ratefeed::AppCommand {
    fn from(cmd: Commands) -> ratefeed::AppCommand {
        match cmd {
            Commands::Rates { json } => ratefeed::AppCommand::Rates { json },
            Commands::Compare { amount, city, fiat } => {
                ratefeed::AppCommand::Compare { amount, city, fiat }
            }
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => ratefeed::cli::setup::setup(),
        Some(cmd) => ratefeed::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
