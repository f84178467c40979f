// ACTIVE, INACTIVE and SETID: single-partition attribute changes.
use std::io::Write;

use crate::core::engine::{Deactivated, validate_type_code};
use crate::core::error::Error;
use crate::core::model::PartitionId;
use crate::shell::{Session, unquote};
use crate::shell::args::{invalid, option_value, parse_type_code};

/// Disk number and partition id of the current selection.
fn target<W: Write>(session: &Session<W>) -> Result<(u32, PartitionId), Error> {
    let disk = session.selection.current_disk(&session.store)?;
    let part = session.selection.current_partition(&session.store)?;
    Ok((disk.number, part.id))
}

pub(super) fn active<W: Write>(session: &mut Session<W>, _args: &[String]) -> Result<(), Error> {
    let (disk, id) = target(session)?;
    let commit = session.engine.set_active(&mut session.store, disk, id)?;
    session.say("DiskPart marked the current partition as active.")?;
    session.warn("active", commit.warning)
}

pub(super) fn inactive<W: Write>(session: &mut Session<W>, _args: &[String]) -> Result<(), Error> {
    let (disk, id) = target(session)?;
    match session.engine.set_inactive(&mut session.store, disk, id)? {
        Deactivated::AlreadyInactive => session.say("Partition is already inactive."),
        Deactivated::Cleared(commit) => {
            session.say("DiskPart marked the current partition as inactive.")?;
            session.warn("inactive", commit.warning)
        }
    }
}

pub(super) fn setid<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    let mut type_code = None;
    for arg in &args[1..] {
        if let Some(value) = option_value(&unquote(arg), "id=") {
            type_code = Some(parse_type_code(value)?);
        }
    }
    let type_code = type_code.ok_or_else(|| invalid("Invalid argument: id= value missing."))?;
    validate_type_code(type_code)?;

    let (disk, id) = target(session)?;
    let commit = session
        .engine
        .set_type(&mut session.store, disk, id, type_code)?;
    session.say("Partition ID set successfully.")?;
    session.warn("setid", commit.warning)
}
