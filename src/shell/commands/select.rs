// SELECT DISK | PARTITION | VOLUME.
use std::io::Write;

use crate::core::error::Error;
use crate::shell::Session;
use crate::shell::args::{invalid, is_decimal, parse_decimal_u32};

fn check_argc(args: &[String]) -> Result<(), Error> {
    if args.len() > 3 {
        return Err(invalid("Invalid number of arguments."));
    }
    Ok(())
}

pub(super) fn disk<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    check_argc(args)?;
    let Some(target) = args.get(2) else {
        let text = match session.selection.disk() {
            Some(number) => format!("Disk {number} is currently selected."),
            None => "No disk is currently selected.".to_string(),
        };
        return session.say(text);
    };

    let outcome = if target.eq_ignore_ascii_case("system") {
        session.selection.select_system(&session.store)
    } else if target.eq_ignore_ascii_case("next") {
        session.selection.select_next(&session.store)
    } else if is_decimal(target) {
        let number = parse_decimal_u32(target, "disk number")?;
        session.selection.select_disk(&session.store, number)
    } else {
        return Err(invalid("Invalid argument."));
    };

    match outcome {
        Ok(()) => {
            let number = session.selection.disk().unwrap_or_default();
            session.say(format!("Disk {number} selected."))
        }
        // Walking off the end of the list is a normal outcome of `next`.
        Err(err) if err.is_condition() => {
            session.say(err.message().unwrap_or("Disk enumeration finished."))
        }
        Err(err) => Err(err),
    }
}

pub(super) fn partition<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    check_argc(args)?;
    session.selection.current_disk(&session.store)?;
    let Some(target) = args.get(2) else {
        let current = session
            .selection
            .current_partition(&session.store)
            .ok()
            .and_then(|part| {
                session
                    .selection
                    .current_disk(&session.store)
                    .ok()
                    .and_then(|disk| disk.display_number(part.id))
            });
        let text = match current {
            Some(number) => format!("Partition {number} is currently selected."),
            None => "No partition is currently selected.".to_string(),
        };
        return session.say(text);
    };

    let number = parse_decimal_u32(target, "partition number")?;
    session.selection.select_partition(&session.store, number)?;
    session.say(format!("Partition {number} selected."))
}

pub(super) fn volume<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    check_argc(args)?;
    let Some(target) = args.get(2) else {
        let text = match session.selection.volume() {
            Some(number) => format!("Volume {number} is currently selected."),
            None => "No volume is currently selected.".to_string(),
        };
        return session.say(text);
    };

    let number = parse_decimal_u32(target, "volume number")?;
    session.selection.select_volume(&session.store, number)?;
    session.say(format!("Volume {number} selected."))
}
