// Whole-disk commands: UNIQUEID DISK, CLEAN, RESCAN, DUMP.
use std::io::Write;

use crate::core::error::Error;
use crate::shell::Session;
use crate::shell::args::{invalid, option_value, parse_decimal_u64, parse_signature};
use crate::shell::render::hex_dump;

pub(super) fn uniqueid<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    let disk = session.selection.current_disk(&session.store)?;
    let number = disk.number;
    match args {
        [_, _] => {
            let signature = disk.signature;
            session.blank()?;
            session.say(format!("Disk ID: {signature:08x}"))?;
            session.blank()
        }
        [_, _, value] => {
            let signature = option_value(value, "id=")
                .ok_or_else(|| invalid("Invalid arguments."))
                .and_then(parse_signature)?;
            let commit = session
                .engine
                .set_signature(&mut session.store, number, signature)?;
            session.say(format!("New Signature: 0x{signature:08x}"))?;
            session.warn("uniqueid", commit.warning)
        }
        _ => Err(invalid("Invalid arguments.")),
    }
}

pub(super) fn clean<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    let all = match args {
        [_] => false,
        [_, word] if word.eq_ignore_ascii_case("all") => true,
        _ => return Err(invalid("Invalid arguments.").with_hint("Usage: CLEAN [ALL]")),
    };
    let disk = session.selection.current_disk(&session.store)?.number;

    let cleaned = session.engine.clean(&mut session.store, disk, all)?;
    session.selection.clear_partition();
    for number in &cleaned.volumes {
        session.selection.forget_volume(*number);
    }
    session.say("DiskPart succeeded in cleaning the disk.")?;
    session.warn("clean", cleaned.warning)
}

pub(super) fn rescan<W: Write>(session: &mut Session<W>, _args: &[String]) -> Result<(), Error> {
    session.blank()?;
    session.say("Please wait while DiskPart scans your configuration...")?;
    let store = session.engine.scan(&session.config)?;
    session.store = store;
    session.selection.clear();
    session.blank()?;
    session.say("DiskPart has finished scanning your configuration.")?;
    session.blank()
}

pub(super) fn dump_disk<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    let sector = sector_arg(args)?;
    let disk = session.selection.current_disk(&session.store)?.number;
    let bytes = session.engine.read_sector(&session.store, disk, sector)?;
    print_dump(session, sector, &bytes)
}

pub(super) fn dump_partition<W: Write>(
    session: &mut Session<W>,
    args: &[String],
) -> Result<(), Error> {
    let sector = sector_arg(args)?;
    let disk = session.selection.current_disk(&session.store)?.number;
    let part = session.selection.current_partition(&session.store)?;
    if sector >= part.sector_count {
        return Err(invalid("Sector number is beyond the end of the partition."));
    }
    let lba = part.start_sector + sector;
    let bytes = session.engine.read_sector(&session.store, disk, lba)?;
    print_dump(session, lba, &bytes)
}

fn sector_arg(args: &[String]) -> Result<u64, Error> {
    let [_, _, sector] = args else {
        return Err(invalid("Invalid arguments.").with_hint("Usage: DUMP DISK|PARTITION <SECTOR>"));
    };
    parse_decimal_u64(sector, "sector number")
}

fn print_dump<W: Write>(session: &mut Session<W>, lba: u64, bytes: &[u8]) -> Result<(), Error> {
    session.blank()?;
    session.say(format!("Sector {lba}"))?;
    for line in hex_dump(bytes) {
        session.say(line)?;
    }
    session.blank()
}
