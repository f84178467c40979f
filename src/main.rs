//! Purpose: `diskpart` CLI entry point: argument parsing, tracing setup, session bootstrap.
//! Role: Binary crate root; builds a `Session` over the discovered disks and feeds it
//! a script file or the interactive terminal.
//! Invariants: Command output goes to stdout; diagnostics and notices go to stderr.
//! Invariants: Startup errors are emitted as text on a terminal, JSON otherwise.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::fs::File;
use std::io::{self, BufReader, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use diskpart::api::{
    DiscoveryConfig, Error, ErrorKind, Notice, ScriptOutcome, Session, notice_json,
    system_engine, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                return Ok(RunOutcome::ok());
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::InvalidArgument)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();
    let color_mode = cli.color;
    let result = match cli.command {
        Some(command) => command_dispatch::dispatch_command(command, color_mode),
        None => run_session(cli),
    };
    result.map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "diskpart",
    version,
    about = "Interactive MBR disk partitioning shell",
    long_about = None,
    after_help = r#"EXAMPLES
  $ diskpart                                   # interactive, all system disks
  $ diskpart -s layout.txt                     # run a script, stop at the first failure
  $ diskpart --disk ./disk.img -s layout.txt   # operate on an image file

Inside the shell, type `help` for the command list."#
)]
struct Cli {
    #[arg(
        short = 's',
        long = "script",
        value_name = "FILE",
        help = "Run the commands in FILE instead of prompting",
        value_hint = ValueHint::FilePath
    )]
    script: Option<PathBuf>,
    #[arg(
        short = 't',
        long = "timeout",
        value_name = "SECONDS",
        help = "Wait this many seconds before running"
    )]
    timeout: Option<u64>,
    #[arg(
        long = "disk",
        value_name = "PATH",
        help = "Operate on this device or image file (repeatable); skips the system scan",
        value_hint = ValueHint::FilePath
    )]
    disks: Vec<PathBuf>,
    #[arg(
        long,
        default_value = "/sys",
        help = "sysfs root used to enumerate block devices",
        value_hint = ValueHint::DirPath
    )]
    sysfs_root: PathBuf,
    #[arg(
        long,
        default_value = "/dev",
        help = "Device node directory",
        value_hint = ValueHint::DirPath
    )]
    dev_root: PathBuf,
    #[arg(
        long,
        default_value = "/proc/mounts",
        help = "Mount table used to discover volumes",
        value_hint = ValueHint::FilePath
    )]
    mounts: PathBuf,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Print version information")]
    Version,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ diskpart completion bash > /etc/bash_completion.d/diskpart
  $ diskpart completion zsh > "${fpath[1]}/_diskpart""#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn discovery_config(cli: &Cli) -> DiscoveryConfig {
    DiscoveryConfig {
        disk_paths: cli.disks.clone(),
        sysfs_root: cli.sysfs_root.clone(),
        dev_root: cli.dev_root.clone(),
        mounts_path: cli.mounts.clone(),
    }
}

fn run_session(cli: Cli) -> Result<RunOutcome, Error> {
    let color_mode = cli.color;
    let config = discovery_config(&cli);
    if let Some(seconds) = cli.timeout {
        std::thread::sleep(Duration::from_secs(seconds));
    }

    let script = match &cli.script {
        Some(path) => Some(File::open(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to open script")
                .with_path(path)
                .with_source(err)
        })?),
        None => None,
    };

    let engine = system_engine(&config);
    let mut session = Session::open(engine, config, io::stdout())?
        .with_notice_sink(move |notice| emit_notice(notice, color_mode));

    match script {
        Some(file) => match session.run_script(BufReader::new(file))? {
            ScriptOutcome::Finished => Ok(RunOutcome::ok()),
            ScriptOutcome::Stopped(err) => {
                tracing::debug!(kind = ?err.kind(), "script stopped");
                Ok(RunOutcome::with_code(to_exit_code(err.kind())))
            }
        },
        None => {
            println!();
            println!("DiskPart version {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("On computer: {}", host_name());
            println!();
            session.run_interactive(io::stdin().lock())?;
            Ok(RunOutcome::ok())
        }
    }
}

#[cfg(unix)]
fn host_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: `buf` is writable for `buf.len()` bytes for the duration of the call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(not(unix))]
fn host_name() -> String {
    "localhost".to_string()
}

#[derive(Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
}

fn emit_version_output(_color_mode: ColorMode) {
    let info = VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    };
    if io::stdout().is_terminal() {
        println!("{} {}", info.name, info.version);
    } else {
        println!(
            "{}",
            serde_json::to_string(&info)
                .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string())
        );
    }
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        match notice.disk {
            Some(disk) => eprintln!("{label} {} (disk: {disk})", notice.message),
            None => eprintln!("{label} {}", notice.message),
        }
        return;
    }

    let value = notice_json(notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::InvalidArgument => "invalid argument".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::NoSelection => "nothing selected".to_string(),
        ErrorKind::EndOfEnumeration => "enumeration finished".to_string(),
        ErrorKind::Busy => "device is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt partition table".to_string(),
        ErrorKind::Unsupported => "unsupported".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Write => "write failed".to_string(),
        ErrorKind::Sync => "sync failed".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(disk) = err.disk() {
        inner.insert("disk".to_string(), json!(disk));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(disk) = err.disk() {
        lines.push(format!(
            "{} {disk}",
            colorize_label("disk:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!(
            "{} {offset}",
            colorize_label("offset:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `diskpart --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "diskpart") else {
        return "Try `diskpart --help`.".to_string();
    };

    let parts = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return "Try `diskpart --help`.".to_string();
    }
    format!("Try `diskpart {} --help`.", parts.join(" "))
}
