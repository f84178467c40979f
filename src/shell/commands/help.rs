// HELP: the command list and per-entry help.
use std::io::Write;

use crate::core::error::Error;
use crate::shell::Session;
use crate::shell::table::{COMMANDS, Entry, lookup};

pub(crate) fn help<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    match lookup(&args[1..]) {
        Some(entry) => command(session, entry),
        None => list(session),
    }
}

/// Every top-level command with its one-line description.
pub(crate) fn list<W: Write>(session: &mut Session<W>) -> Result<(), Error> {
    session.blank()?;
    session.say("DiskPart - Available commands:")?;
    session.blank()?;
    for entry in COMMANDS.iter().filter(|entry| entry.names().len() == 1) {
        session.say(format!(
            "  {:<12}  {}",
            entry.names()[0].to_ascii_uppercase(),
            entry.help()
        ))?;
    }
    session.blank()
}

/// Help for one entry plus the sub-commands directly below it.
pub(crate) fn command<W: Write>(session: &mut Session<W>, entry: &Entry) -> Result<(), Error> {
    session.blank()?;
    session.say(format!("    {}", entry.help()))?;
    if let Some(usage) = entry.usage() {
        session.blank()?;
        session.say(format!("Syntax:  {usage}"))?;
    }

    let children = COMMANDS
        .iter()
        .filter(|child| child.is_child_of(entry))
        .collect::<Vec<_>>();
    if !children.is_empty() {
        session.blank()?;
        for child in children {
            let name = child.names().last().copied().unwrap_or_default();
            session.say(format!("  {:<12}  {}", name.to_ascii_uppercase(), child.help()))?;
        }
    }
    session.blank()
}
