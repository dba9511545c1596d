use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge this host to the state declared in a manifest", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply every resource in a manifest, in order
    Apply(ApplyArgs),

    /// Run the health checks declared in a manifest
    Healthcheck(ManifestArgs),

    /// Show the current state of every resource in a manifest
    Status(StatusArgs),

    /// List the registered resource types and providers
    Providers,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ManifestArgs {
    /// Path to the manifest (TOML)
    pub manifest: PathBuf,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Path to the manifest (TOML)
    pub manifest: PathBuf,

    /// Report what would change without changing anything
    #[arg(short = 'n', long)]
    pub noop: bool,

    /// Also write the session report to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Path to the manifest (TOML)
    pub manifest: PathBuf,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::parse_from(["converge", "-vv", "apply", "site.toml", "--noop"]);
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.noop);
        assert_eq!(args.manifest, PathBuf::from("site.toml"));
        assert!(args.report.is_none());
    }

    #[test]
    fn test_parse_status_json() {
        let cli = Cli::parse_from(["converge", "status", "site.toml", "--json", "-q"]);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::Status(StatusArgs { json: true, .. })));
    }
}
