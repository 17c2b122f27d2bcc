use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "RTV - Browse Reddit from the terminal.

Usage: rtv [OPTIONS]

  -s SUBREDDIT         Open this subreddit (front, all, name, u/name, me)
  -l LINK              Open this submission first
  --ascii              Draw with ASCII characters only
  --log FILE           Write debug logs to FILE
  --non-persistent     Keep logins and history in memory only
  --clear-auth         Forget stored logins before starting
  --config FILE        Read settings from FILE
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

enum Command {
    Run {
        options: rtv::app::Options,
        log: Option<PathBuf>,
    },
    Version,
    Help,
}

fn main() {
    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("error: {err}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    match command {
        Command::Version => println!("RTV {}", rtv::VERSION),
        Command::Help => println!("{USAGE}"),
        Command::Run { options, log } => {
            if let Some(path) = log.as_deref() {
                if let Err(err) = init_logging(path) {
                    eprintln!("error: {err:?}");
                    std::process::exit(1);
                }
            }
            if let Err(err) = rtv::run(options) {
                eprintln!("error: {err:?}");
                std::process::exit(1);
            }
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let mut options = rtv::app::Options::default();
    let mut log = None;
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .filter(|value| !value.starts_with('-'))
                .with_context(|| format!("{flag} needs a value"))
        };
        match arg.as_str() {
            "--version" | "-V" => return Ok(Command::Version),
            "--help" | "-h" => return Ok(Command::Help),
            "-s" => options.subreddit = Some(value("-s")?),
            "-l" => options.link = Some(value("-l")?),
            "--log" => log = Some(PathBuf::from(value("--log")?)),
            "--config" => options.config_file = Some(PathBuf::from(value("--config")?)),
            "--ascii" => options.ascii = true,
            "--non-persistent" => options.non_persistent = true,
            "--clear-auth" => options.clear_auth = true,
            other => bail!("unknown argument {other}"),
        }
    }
    Ok(Command::Run { options, log })
}

fn init_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    tracing::info!(version = rtv::VERSION, "starting");
    Ok(())
}
