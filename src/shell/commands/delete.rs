// DELETE <N> (raw MBR slot) and DELETE PARTITION.
use std::io::Write;

use crate::core::engine::Deleted;
use crate::core::error::Error;
use crate::shell::Session;
use crate::shell::args::{invalid, parse_decimal_u32};

pub(super) fn slot<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    let [_, index] = args else {
        return Err(invalid("Invalid arguments.").with_hint("Usage: DELETE <N>   (N = slot 1-4)"));
    };
    let index = parse_decimal_u32(index, "partition index")?;
    let disk = session.selection.current_disk(&session.store)?.number;

    let deleted = session.engine.delete_slot(&mut session.store, disk, index)?;
    finish(session, deleted)?;
    session.say(format!("Partition {index} deleted successfully."))
}

pub(super) fn partition<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    if args.len() > 2 {
        return Err(invalid("Invalid arguments."));
    }
    let disk = session.selection.current_disk(&session.store)?.number;
    let id = session.selection.current_partition(&session.store)?.id;

    let deleted = session.engine.delete_partition(&mut session.store, disk, id)?;
    finish(session, deleted)?;
    session.say("DiskPart successfully deleted the selected partition.")
}

/// Drops selections that pointed at removed partitions or volumes.
fn finish<W: Write>(session: &mut Session<W>, deleted: Deleted) -> Result<(), Error> {
    session.selection.forget_partitions(&deleted.removed);
    for number in &deleted.volumes {
        session.selection.forget_volume(*number);
    }
    session.warn("delete", deleted.warning)
}
