//! narsil-mcp CLI entry point

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use narsil_mcp::cli::{Cli, Commands};
use narsil_mcp::commands::{run_cache, run_config, run_index, run_serve, run_tool};

fn main() -> ExitCode {
    match run() {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run() -> narsil_mcp::Result<String> {
    let cli = Cli::parse_args();
    let settings = cli.settings()?;
    init_logging(&cli.log_directive(&settings));

    match &cli.command {
        None => run_serve(&cli, &settings),
        Some(Commands::Index) => run_index(&cli, &settings),
        Some(Commands::Tool(args)) => run_tool(&cli, &settings, args),
        Some(Commands::Cache(args)) => run_cache(&cli, &settings, args),
        Some(Commands::Config(args)) => run_config(&cli, &settings, args),
    }
}

/// Logs always go to stderr; stdout carries the MCP protocol
fn init_logging(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("narsil_mcp=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
