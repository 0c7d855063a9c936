//! rawline - echo REPL on top of the line editor
//!
//! Usage:
//!   rawline                      Read lines and echo them back
//!   rawline --prompt "$ "        Use another prompt
//!   rawline --history FILE       Keep history in FILE
//!   rawline --log FILE           Write debug logs to FILE

use std::env;
use std::fs::OpenOptions;
use std::path::Path;
use std::process;
use std::sync::Mutex;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rawline::args::{parse_arguments, ParseMode, ParseOptions, ParsedArguments};
use rawline::config::Config;
use rawline::line::{DefaultHooks, History, LineCodec, ReadOutcome, Session, Terminal};

/// Environment variable naming a log file when `--log` isn't given.
const LOG_ENV: &str = "RAWLINE_LOG";

const KNOWN_FLAGS: &[&str] = &[
    "prompt", "history", "no-history", "raw", "no-signals", "config", "log", "h", "help", "v",
    "version",
];

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut rest = args.as_slice();
    let parsed = match parse_arguments(&cli_options(), &mut rest) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("rawline: {}", e);
            process::exit(1);
        }
    };
    if let Some((key, _)) = parsed.iter().find(|(k, _)| !KNOWN_FLAGS.contains(k)) {
        eprintln!("rawline: unknown option: {}", key);
        process::exit(1);
    }

    if flag(&parsed, "help") || flag(&parsed, "h") {
        print_help();
        return Ok(());
    }
    if flag(&parsed, "version") || flag(&parsed, "v") {
        println!("rawline v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let log_path = parsed.get("log").map(str::to_owned).or_else(|| env::var(LOG_ENV).ok());
    if let Some(path) = log_path {
        init_logging(Path::new(&path))?;
    }

    let mut config = Config::load(parsed.get("config").map(Path::new))?;
    apply_flags(&mut config, &parsed);
    debug!(?config, "configuration");

    let code = run_repl(&config)?;
    process::exit(code);
}

fn cli_options() -> ParseOptions {
    ParseOptions {
        mode: ParseMode::DASH | ParseMode::DASH_VAL | ParseMode::SINGLE_DASH,
        ignore_first_arg: true,
        ..ParseOptions::default()
    }
}

/// A bare flag parses as `"true"`; anything but `"false"` counts as set.
fn flag(parsed: &ParsedArguments, key: &str) -> bool {
    parsed.get(key).is_some_and(|v| v != "false")
}

fn apply_flags(config: &mut Config, parsed: &ParsedArguments) {
    if let Some(prompt) = parsed.get("prompt") {
        config.prompt = prompt.to_string();
    }
    if let Some(history) = parsed.get("history") {
        config.history_file = Some(history.to_string());
    }
    if flag(parsed, "no-history") {
        config.history_file = None;
    }
    if flag(parsed, "raw") {
        config.terminal.cbreak = false;
    }
    if flag(parsed, "no-signals") {
        config.terminal.install_signal_handlers = false;
    }
}

fn init_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install log subscriber")?;
    info!("rawline {} starting", env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn print_help() {
    println!("{}", "rawline - raw-mode line editor".bold());
    println!();
    println!("Usage:");
    println!("  rawline                    Read lines and echo them back");
    println!("  rawline --prompt TEXT      Prompt to show (default \"> \")");
    println!("  rawline --history FILE     History file (default ~/.rawline_history)");
    println!("  rawline --no-history       Keep history in memory only");
    println!("  rawline --raw              Full raw mode, Ctrl-C and Ctrl-Z arrive as keys");
    println!("  rawline --no-signals       Don't install signal handlers");
    println!("  rawline --config FILE      Config file (default ~/.rawline.toml)");
    println!("  rawline --log FILE         Write logs to FILE (or set {})", LOG_ENV);
    println!("  rawline -h, --help         Show this help");
    println!("  rawline -v, --version      Show version");
    println!();
    println!("Keys: arrows move and browse history, Enter submits, \"exit\" quits.");
}

fn run_repl(config: &Config) -> Result<i32> {
    let mut history = History::with_codec(LineCodec);
    let history_path = config.history_path();
    history.init(history_path.as_deref()).context("failed to open history")?;

    let mut session = Session::stdio();
    if !session.terminal().is_tty() {
        eprintln!("{}: stdin and stdout must be a terminal", "error".red());
        return Ok(1);
    }
    session.set_history(history);
    session.set_hooks(DefaultHooks { exit_keyword: config.exit_keyword.clone() });
    session.init(config.terminal).context("failed to set up terminal")?;

    let mut code = 0;
    loop {
        match session.read_line(&config.prompt) {
            Ok(ReadOutcome::Line(line)) => println!("{}", line),
            Ok(ReadOutcome::Interrupted) => continue,
            Ok(ReadOutcome::Eof) => {
                debug!("eof, leaving");
                break;
            }
            Err(e) => {
                eprintln!("{}: {}", "error".red(), e);
                code = 1;
                break;
            }
        }
    }

    session.shutdown().context("failed to save history")?;
    Ok(code)
}
