#[cfg(not(unix))]
compile_error!("converge manages POSIX hosts and only builds on unix targets");

mod argv;
mod cli;
mod commands;
mod config;
mod expression;
mod facts;
mod healthcheck;
mod manager;
mod manifest;
mod paths;
mod providers;
mod runner;
mod session;
mod template;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let succeeded = match cli.command {
        Command::Apply(args) => commands::apply::apply(&ctx, args)?,
        Command::Healthcheck(args) => commands::apply::healthcheck(&ctx, args)?,
        Command::Status(args) => commands::status::run(&ctx, args)?,
        Command::Providers => {
            commands::providers::run(&ctx)?;
            true
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "converge", &mut io::stdout());
            true
        }
    };

    if !succeeded {
        process::exit(1);
    }
    Ok(())
}
