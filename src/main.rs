use clap::Parser;
use colored::*;
use faultsched::cli::Cli;
use faultsched::commands::execute_command;
use std::process;

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::init();
    }

    // Set up colored output
    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = execute_command(cli.command, cli.debug, cli.verbose) {
        eprintln!("{} {}", "Error:".bright_red().bold(), e);
        process::exit(1);
    }
}
