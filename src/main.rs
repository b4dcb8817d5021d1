use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use tunup::cli::args::usage;
use tunup::cli::commands::cmd_up;
use tunup::cli::{parse_invocation, Cli, Invocation};

const EXIT_SETUP_SUCCESS: i32 = 0;
const EXIT_SETUP_FAILED: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match parse_invocation(&cli.operands) {
        Invocation::Usage => {
            let prog = std::env::args().next().unwrap_or_else(|| "tunup".to_string());
            println!("{}", usage(&prog));
            std::process::exit(EXIT_SETUP_SUCCESS);
        }
        Invocation::Run(args) => {
            // Failures were already logged with the interface prefix.
            if cmd_up(args).await.is_err() {
                std::process::exit(EXIT_SETUP_FAILED);
            }
        }
    }
}
