//! tapctl command - create, inspect and list TUN/TAP devices.

mod commands;

use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

#[derive(Parser)]
#[command(name = "tapctl", version, about = "TUN/TAP device tool")]
struct Cli {
    /// Output JSON.
    #[arg(short = 'j', long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a device and read packets from it.
    #[command(visible_alias = "c")]
    Create(commands::create::CreateCmd),

    /// Show interface settings.
    #[command(visible_alias = "s")]
    Show(commands::show::ShowCmd),

    /// List TUN/TAP devices.
    #[command(visible_alias = "ls")]
    List(commands::list::ListCmd),
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level(cli.verbose).into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Create(cmd) => cmd.run().await,
        Command::Show(cmd) => cmd.run(cli.json),
        Command::List(cmd) => cmd.run(cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
