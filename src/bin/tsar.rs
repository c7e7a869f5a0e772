//! tsar CLI
//!
//! Run `.tsar` scripts from a file or directory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tsar::{CaptureT, Engine, Params, SCRIPT_EXT};

#[derive(Parser, Debug)]
#[command(name = "tsar")]
#[command(version)]
#[command(about = "Run tsar test scripts")]
struct Cli {
    /// Script file or directory of scripts
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Print every script's execution log, not only failing ones
    #[arg(short, long, env = "TSAR_VERBOSE")]
    verbose: bool,

    /// Value of the [short] condition
    #[arg(short, long, env = "TSAR_SHORT")]
    short: bool,

    /// Keep working directories and print their paths
    #[arg(long, env = "TSAR_TEST_WORK")]
    test_work: bool,

    /// Create working directories under this root (implies --test-work)
    #[arg(short, long, value_name = "DIR", env = "TSAR_WORKDIR_ROOT")]
    workdir_root: Option<PathBuf>,

    /// Keep running after a script fails
    #[arg(short, long, env = "TSAR_CONTINUE_ON_ERROR")]
    continue_on_error: bool,

    /// Treat unknown commands as errors instead of running them
    #[arg(short = 'e', long, env = "TSAR_REQUIRE_EXPLICIT_EXEC")]
    require_explicit_exec: bool,

    /// Reject scripts that share a base name
    #[arg(short = 'u', long, env = "TSAR_REQUIRE_UNIQUE_NAMES")]
    require_unique_names: bool,

    /// Bound every process wait, in seconds
    #[arg(long, value_name = "SECS", env = "TSAR_TIMEOUT")]
    timeout: Option<u64>,

    /// List available commands and conditions
    #[arg(long = "list-commands")]
    list_commands: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tsar::logging::init_cli(cli.verbose);

    if cli.list_commands {
        print_commands();
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut params = if cli.path.is_file() {
        if cli.path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXT) {
            bail!("not a .{} script: {}", SCRIPT_EXT, cli.path.display());
        }
        Params::new(cli.path.parent().map(PathBuf::from).unwrap_or_default())
            .files([cli.path.clone()])
    } else if cli.path.is_dir() {
        Params::new(cli.path.clone())
    } else {
        bail!("no such file or directory: {}", cli.path.display());
    };

    params = params
        .verbose(cli.verbose)
        .short(cli.short)
        .test_work(cli.test_work)
        .continue_on_error(cli.continue_on_error)
        .require_explicit_exec(cli.require_explicit_exec)
        .require_unique_names(cli.require_unique_names);
    if let Some(root) = cli.workdir_root {
        params = params.workdir_root(root);
    }
    if let Some(secs) = cli.timeout {
        params = params.wait_timeout(Duration::from_secs(secs));
    }

    let mut t = CaptureT::echo();
    let result = tsar::run(&mut t, params);
    if result.cases.is_empty() && !t.failures.is_empty() {
        bail!("{}", t.failures.join("\n"));
    }

    println!();
    println!("{}", result.summary());
    if result.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_commands() {
    let engine = Engine::new();

    println!("Built-in commands:");
    println!();
    for name in engine.command_names() {
        if let Some(usage) = engine.command_usage(name) {
            println!("  {:<12} {} {}", name, usage.summary, usage.args);
        }
    }

    println!();
    println!("Built-in conditions:");
    println!();
    for (name, summary) in engine.condition_summaries() {
        println!("  {:<12} {}", name, summary);
    }

    println!();
    println!("Prefixes:");
    println!("  !            Command must fail");
    println!("  [cond]       Conditional execution");
    println!("  [!cond]      Negated condition");
    println!("  &, &name     Trailing word: run exec in the background");
}
