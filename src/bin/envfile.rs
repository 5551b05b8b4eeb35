use std::ffi::OsString;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{self, Command};

use clap::{Args, Parser, Subcommand};
use envfile::{
    EnvLoader, EnvironmentSetter, KeyPattern, MemoryEnv, SubstitutionMode, apply, write_env,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILE: &str = ".env";

#[derive(Debug, Parser)]
#[command(name = "envfile")]
#[command(about = "Load .env files and run commands with the resulting environment", long_about = None)]
#[command(version)]
struct Cli {
    /// Print loader diagnostics to stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load env files and execute a command.
    Run {
        #[command(flatten)]
        load: LoadArgs,

        /// Command to execute, followed by its arguments.
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_name = "COMMAND"
        )]
        command: Vec<OsString>,
    },
    /// Parse env files and report problems.
    Check {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Print the merged variables in .env format.
    Print {
        #[command(flatten)]
        load: LoadArgs,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
struct LoadArgs {
    /// Env file path(s). Repeat or pass comma-separated paths. Defaults to .env.
    #[arg(short, long = "file", value_name = "PATHS", value_delimiter = ',', value_parser = parse_path)]
    files: Vec<PathBuf>,

    /// Ignore missing env files.
    #[arg(short, long = "ignore-missing", visible_alias = "ignore")]
    ignore_missing: bool,

    /// Replace variables that are already set.
    #[arg(short, long, visible_alias = "override")]
    overwrite: bool,

    /// Search parent directories for relative env files.
    #[arg(short = 'u', long)]
    search_upward: bool,

    /// Expand $VAR and ${VAR} placeholders in values.
    #[arg(long)]
    expand: bool,

    /// Accept dotted and dashed keys.
    #[arg(long)]
    extended_keys: bool,

    /// Skip malformed lines instead of failing.
    #[arg(long)]
    lenient: bool,
}

impl LoadArgs {
    fn loader(&self) -> EnvLoader {
        let files = if self.files.is_empty() {
            vec![PathBuf::from(DEFAULT_FILE)]
        } else {
            self.files.clone()
        };

        EnvLoader::new()
            .paths(files)
            .required(!self.ignore_missing)
            .overwrite(self.overwrite)
            .search_upward(self.search_upward)
            .strict(!self.lenient)
            .substitution_mode(if self.expand {
                SubstitutionMode::Expand
            } else {
                SubstitutionMode::Disabled
            })
            .key_pattern(if self.extended_keys {
                KeyPattern::Extended
            } else {
                KeyPattern::Identifier
            })
    }
}

fn parse_path(raw: &str) -> Result<PathBuf, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("path must not be empty".to_owned());
    }
    Ok(PathBuf::from(trimmed))
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    process::exit(run(cli.command));
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_filter = if verbose {
        "envfile=debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(command: Commands) -> i32 {
    let result = match command {
        Commands::Run { load, command } => execute_run(&load, &command),
        Commands::Check { load } => check(&load),
        Commands::Print { load } => print(&load),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("envfile: {err}");
            1
        }
    }
}

fn execute_run(load: &LoadArgs, argv: &[OsString]) -> Result<i32, String> {
    let Some((program, args)) = argv.split_first() else {
        return Err("missing command after `run`".to_owned());
    };

    let snapshot = MemoryEnv::from_process();
    let set = load
        .loader()
        .parse_against(&snapshot)
        .map_err(|err| err.to_string())?;

    let mut command = Command::new(program);
    command.args(args);
    let mut child_env = ChildEnv {
        inherited: &snapshot,
        command: &mut command,
    };
    apply(&set, load.overwrite, &mut child_env).map_err(|err| err.to_string())?;

    execute_command(command, program)
}

/// Environment of the child process: the inherited variables plus whatever
/// is set on `command`.
struct ChildEnv<'a> {
    inherited: &'a MemoryEnv,
    command: &'a mut Command,
}

impl EnvironmentSetter for ChildEnv<'_> {
    fn contains_key(&self, key: &str) -> bool {
        self.inherited.contains_key(key)
    }

    fn get_var(&self, key: &str) -> Option<String> {
        self.inherited.get_var(key)
    }

    fn set_var(&mut self, key: &str, value: &str) {
        self.command.env(key, value);
    }
}

fn check(load: &LoadArgs) -> Result<i32, String> {
    let report = load
        .loader()
        .load(&mut MemoryEnv::new())
        .map_err(|err| err.to_string())?;

    let mut summary = format!(
        "ok: {} variable(s) from {} file(s)",
        report.loaded, report.files_read
    );
    if report.skipped_lines > 0 {
        summary.push_str(&format!(", {} malformed line(s) skipped", report.skipped_lines));
    }
    println!("{summary}");
    Ok(0)
}

fn print(load: &LoadArgs) -> Result<i32, String> {
    let set = load
        .loader()
        .parse_against(&MemoryEnv::from_process())
        .map_err(|err| err.to_string())?;

    write_env(&set, std::io::stdout().lock()).map_err(|err| format!("I/O error: {err}"))?;
    Ok(0)
}

#[cfg(unix)]
fn execute_command(mut command: Command, program: &OsString) -> Result<i32, String> {
    let err = command.exec();
    Err(format!(
        "failed to execute `{}`: {err}",
        program.to_string_lossy()
    ))
}

#[cfg(not(unix))]
fn execute_command(mut command: Command, program: &OsString) -> Result<i32, String> {
    let status = command
        .status()
        .map_err(|err| format!("failed to execute `{}`: {err}", program.to_string_lossy()))?;
    Ok(status.code().unwrap_or(1))
}
