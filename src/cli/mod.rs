pub mod args;
pub mod commands;

pub use args::{ListArgs, RecoverArgs, RunArgs, ShowArgs, ValidateArgs};
use crate::core::config::ConfigLoader;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
WORKFLOW COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version = crate::VERSION)]
#[command(about = "Dependency-aware workflow orchestration engine")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: validate a definitions file, run a workflow from it, then inspect instances with show and list."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Start a workflow and wait for it to finish",
        long_about = "Run registers every workflow in FILE, starts the named one with the given parameters, and prints the final instance as JSON.",
        after_help = "Example:\n    conductor run flows.yaml --workflow report --param region=eu"
    )]
    Run(RunArgs),
    #[command(
        about = "Check a definitions file without running it",
        long_about = "Validate parses FILE, registers each workflow against the built-in functions, and reports dependency cycles or unknown dependencies.",
        after_help = "Example:\n    conductor validate flows.yaml"
    )]
    Validate(ValidateArgs),
    #[command(
        about = "Print one stored instance",
        long_about = "Show loads an instance from the configured store and prints it as JSON.",
        after_help = "Example:\n    conductor show 1f0e6a52-8c1d-4f59-9d4e-0c7b7f2f9c11"
    )]
    Show(ShowArgs),
    #[command(
        about = "List stored instances, newest first",
        long_about = "List prints one line per instance from the configured store, optionally filtered by tenant and status.",
        after_help = "Example:\n    conductor list --tenant acme --status failed --limit 20"
    )]
    List(ListArgs),
    #[command(
        about = "Resume instances left running by a previous process",
        long_about = "Recover restarts scheduling for stored running or pending instances and waits for them to finish. Tasks that were in flight run again.",
        after_help = "Example:\n    conductor recover --config conductor.toml"
    )]
    Recover(RecoverArgs),
}

impl Command {
    /// Config file consulted by this command, explicit or the default location.
    pub fn config_path(&self) -> Option<PathBuf> {
        let explicit = match self {
            Command::Run(args) => args.config.clone(),
            Command::Validate(args) => args.config.clone(),
            Command::Show(args) => args.config.clone(),
            Command::List(args) => args.config.clone(),
            Command::Recover(args) => args.config.clone(),
        };
        explicit.or_else(|| Some(ConfigLoader::default_path()))
    }

    /// Whether the command prints its result on stdout.
    pub fn writes_stdout(&self) -> bool {
        !matches!(self, Command::Validate(_))
    }
}

pub async fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::Run(run_args) => commands::run(run_args).await,
        Command::Validate(validate_args) => commands::validate(validate_args).await,
        Command::Show(show_args) => commands::show(show_args).await,
        Command::List(list_args) => commands::list(list_args).await,
        Command::Recover(recover_args) => commands::recover(recover_args).await,
    }
}
