use std::ffi::OsString;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::commands;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::formatter::{OutputFormat, emit_result};
use crate::util::Verbosity;

const NAME: &str = "cards";

pub fn run() -> ExitCode {
    init_tracing();
    match run_cli(std::env::args()) {
        Ok(code) => code,
        Err(err) => {
            err.print();
            err.exit_code()
        }
    }
}

/// Parses arguments, resolves the project and dispatches to a command.
/// Returns a `sysexits`-compatible `ExitCode`.
pub fn run_cli<I, S>(args: I) -> Result<ExitCode, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let command = build_cli();
    let matches = command.try_get_matches_from(args)?;

    let verbosity = Verbosity {
        json: matches.get_flag("json"),
        verbose: matches.get_flag("verbose"),
    };
    let output = if verbosity.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let project_override = matches.get_one::<String>("project").cloned();
    if let Some(("init", sub)) = matches.subcommand() {
        let result = commands::init::run(project_override, sub)?;
        return emit_result(result, output);
    }

    let session = CliSession::bootstrap(project_override, verbosity)?;
    if session.verbosity.verbose {
        tracing::info!(
            project = %session.paths.root().display(),
            cardroot = %session.paths.card_root().display(),
            local = %session.paths.local_dir().display(),
            "resolved project context"
        );
    }

    let result = dispatch(&session, &matches)?;
    emit_result(result, output)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    Command::new(NAME)
        .about("Manage card projects")
        .arg(
            Arg::new("project")
                .long("project")
                .value_name("PATH")
                .global(true)
                .help("Project root. Defaults to the nearest ancestor with a .cards folder."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Emit JSON instead of human-readable text."),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Log the resolved project paths."),
        )
        .subcommand_required(true)
        .subcommand(commands::init::command())
        .subcommand(commands::create::command())
        .subcommand(commands::remove::command())
        .subcommand(commands::rename::command())
        .subcommand(commands::show::command())
        .subcommand(commands::validate::command())
}

fn dispatch(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<commands::CommandResult, CliError> {
    match matches.subcommand() {
        Some(("create", sub)) => commands::create::run(session, sub),
        Some(("remove", sub)) => commands::remove::run(session, sub),
        Some(("rename", sub)) => commands::rename::run(session, sub),
        Some(("show", sub)) => commands::show::run(session, sub),
        Some(("validate", sub)) => commands::validate::run(session, sub),
        _ => Err(CliError::new("missing command", ExitStatus::Usage)),
    }
}
