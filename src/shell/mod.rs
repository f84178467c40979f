//! Purpose: The interactive/script shell that owns a session's store and selection.
//! Exports: `Session`, `Flow`, `ScriptOutcome`, `PROMPT`.
//! Role: Tokenizes lines, dispatches them through the command table, reports outcomes.
//! Invariants: Only `exit` (or end of input) stops a session; failures are reported and
//! the interactive loop continues, while scripts stop at the first failing line.
//! Invariants: One session owns the entity store; every handler runs to completion.
use std::fmt::Display;
use std::io::{BufRead, Write};

use crate::core::discovery::DiscoveryConfig;
use crate::core::engine::Engine;
use crate::core::error::{Error, ErrorKind};
use crate::core::selection::Selection;
use crate::core::store::EntityStore;
use crate::notice::Notice;

mod args;
mod commands;
mod render;
mod table;
mod tokenize;

pub use table::{Action, COMMANDS, Entry, lookup};
pub use tokenize::{MAX_ARGS, tokenize, unquote};

pub const PROMPT: &str = "DISKPART> ";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Exit,
}

/// How a script run ended when its input could be read.
#[derive(Debug)]
pub enum ScriptOutcome {
    Finished,
    /// A line failed; the failure has already been reported to the session output.
    Stopped(Error),
}

type NoticeSink = Box<dyn FnMut(&Notice)>;

pub struct Session<W: Write> {
    store: EntityStore,
    selection: Selection,
    engine: Engine,
    config: DiscoveryConfig,
    out: W,
    notice_sink: Option<NoticeSink>,
}

impl<W: Write> Session<W> {
    /// Scans devices and volumes and starts with nothing selected.
    pub fn open(engine: Engine, config: DiscoveryConfig, out: W) -> Result<Self, Error> {
        let store = engine.scan(&config)?;
        Ok(Self::with_store(store, engine, config, out))
    }

    pub fn with_store(store: EntityStore, engine: Engine, config: DiscoveryConfig, out: W) -> Self {
        Self {
            store,
            selection: Selection::new(),
            engine,
            config,
            out,
            notice_sink: None,
        }
    }

    /// Routes warnings to `sink` instead of printing them with the command output.
    pub fn with_notice_sink(mut self, sink: impl FnMut(&Notice) + 'static) -> Self {
        self.notice_sink = Some(Box::new(sink));
        self
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs one line; handler failures come back as `Err` without being printed.
    pub fn execute(&mut self, line: &str) -> Result<Flow, Error> {
        let args = tokenize(line);
        let Some(first) = args.first() else {
            return Ok(Flow::Continue);
        };
        if first.eq_ignore_ascii_case("exit") {
            return Ok(Flow::Exit);
        }
        if first.eq_ignore_ascii_case("rem") {
            return Ok(Flow::Continue);
        }

        match lookup(&args) {
            Some(Entry::Leaf { action, .. }) => commands::invoke(*action, self, &args)?,
            Some(entry @ Entry::HelpOnly { .. }) => commands::help::command(self, entry)?,
            None => commands::help::list(self)?,
        }
        Ok(Flow::Continue)
    }

    /// Runs one line and prints any failure.
    pub fn run_line(&mut self, line: &str) -> Result<Flow, Error> {
        self.execute(line).inspect_err(|err| self.report(err))
    }

    /// Runs every line of `input`, stopping at `exit` or at the first failure.
    ///
    /// `Err` is reserved for input that cannot be read.
    pub fn run_script(&mut self, input: impl BufRead) -> Result<ScriptOutcome, Error> {
        for line in input.lines() {
            let line = line.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read script")
                    .with_source(err)
            })?;
            tracing::debug!(line = %line, "script line");
            match self.run_line(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(err) => return Ok(ScriptOutcome::Stopped(err)),
            }
        }
        Ok(ScriptOutcome::Finished)
    }

    /// Prompts and runs lines until `exit` or end of input.
    pub fn run_interactive(&mut self, mut input: impl BufRead) -> Result<(), Error> {
        loop {
            write!(self.out, "{PROMPT}")
                .and_then(|_| self.out.flush())
                .map_err(output_error)?;
            let mut line = String::new();
            let read = input.read_line(&mut line).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read input")
                    .with_source(err)
            })?;
            if read == 0 {
                self.blank()?;
                return Ok(());
            }
            if let Ok(Flow::Exit) = self.run_line(&line) {
                return Ok(());
            }
        }
    }

    pub(crate) fn say(&mut self, text: impl Display) -> Result<(), Error> {
        writeln!(self.out, "{text}").map_err(output_error)
    }

    pub(crate) fn blank(&mut self) -> Result<(), Error> {
        writeln!(self.out).map_err(output_error)
    }

    pub(crate) fn warn(&mut self, cmd: &str, warning: Option<Error>) -> Result<(), Error> {
        let Some(warning) = warning else {
            return Ok(());
        };
        let notice = Notice::from_warning(cmd, &warning);
        match self.notice_sink.as_mut() {
            Some(sink) => {
                sink(&notice);
                Ok(())
            }
            None => self.say(format!("Warning: {}", notice.message)),
        }
    }

    fn report(&mut self, err: &Error) {
        let text = match err.kind() {
            ErrorKind::InvalidArgument
            | ErrorKind::NotFound
            | ErrorKind::NoSelection
            | ErrorKind::EndOfEnumeration => err.message().unwrap_or("Invalid argument.").to_string(),
            _ => format!("DiskPart has encountered an error: {}", describe(err)),
        };
        let _ = writeln!(self.out, "{text}");
        if let Some(hint) = err.hint() {
            let _ = writeln!(self.out, "{hint}");
        }
    }
}

fn describe(err: &Error) -> String {
    let mut text = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err.kind()));
    if let Some(path) = err.path() {
        text.push_str(&format!(" ({})", path.display()));
    }
    if let Some(source) = std::error::Error::source(err) {
        text.push_str(&format!(": {source}"));
    }
    text
}

fn output_error(err: std::io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write output")
        .with_source(err)
}
