//! Entry point: parses CLI arguments and dispatches into the pipeline,
//! mapping any error onto the exit-code table (§6).

mod cli;

use clap::Parser;
use cli::Cli;

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(err) = cli::run_cli(cli) {
        log::error!("{err}");
        std::process::exit(err.exit_code());
    }
}
