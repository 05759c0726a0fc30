use anyhow::{bail, Context, Result};
use backend::{usage, Config, StopRunner, CONFIG_ENV, PROGRAM_NAME};
use std::env;
use std::io;
use std::path::PathBuf;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    debug: bool,
    help: bool,
    version: bool,
    process: Option<String>,
}

fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => parsed.help = true,
            "--version" | "-v" => parsed.version = true,
            "--debug" => parsed.debug = true,
            "--config" => match args.next() {
                Some(path) => parsed.config = Some(PathBuf::from(path)),
                None => bail!("--config requires a path"),
            },
            // Only the first positional is the process name; anything else,
            // including unknown flags, falls through to allow-list validation.
            _ => {
                if parsed.process.is_none() {
                    parsed.process = Some(arg);
                }
            }
        }
    }
    Ok(parsed)
}

fn print_help() {
    println!("{}", usage());
    println!("\nStop an allow-listed process through the supervisor and notify the operator channel.\n");
    println!("Options:");
    println!("  --help, -h        Show this help message");
    println!("  --version, -v     Show version information");
    println!("  --debug           Enable debug logging");
    println!("  --config <path>   Configuration file (default: ${})", CONFIG_ENV);
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let args = parse_args(env::args().skip(1))?;

    if args.help {
        print_help();
        return Ok(0);
    }
    if args.version {
        println!("{} {}", PROGRAM_NAME, env!("CARGO_PKG_VERSION"));
        return Ok(0);
    }

    init_logging(args.debug);
    debug!(?args, "starting");

    // Load errors are handed to the runner so an unrecognised name still gets usage.
    let config = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let outcome = StopRunner::invoke(config, args.process.as_deref(), &mut io::stdout().lock())
        .context("failed to set up the stop")?;
    debug!(?outcome, "done");
    Ok(outcome.exit_code())
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{}: {:#}", PROGRAM_NAME, e);
            1
        }
    };
    std::process::exit(code);
}
