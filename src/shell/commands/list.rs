// LIST DISK | PARTITION | VOLUME.
use std::io::Write;

use crate::core::error::Error;
use crate::core::model::{Disk, TableKind};
use crate::core::table::free_regions;
use crate::shell::Session;
use crate::shell::render::{format_disk_size, format_size, render_table};

fn marker(current: bool) -> &'static str {
    if current { "*" } else { " " }
}

/// Unallocated bytes in the primary area; GPT disks report none.
fn free_bytes(disk: &Disk) -> u64 {
    if disk.table == TableKind::Gpt {
        return 0;
    }
    free_regions(disk, false)
        .iter()
        .map(|region| region.sector_count * u64::from(disk.geometry.bytes_per_sector))
        .sum()
}

pub(super) fn disk<W: Write>(session: &mut Session<W>, _args: &[String]) -> Result<(), Error> {
    let current = session.selection.disk();
    let rows = session
        .store
        .disks()
        .iter()
        .map(|disk| {
            vec![
                format!("{} Disk {}", marker(current == Some(disk.number)), disk.number),
                "Online".to_string(),
                format_disk_size(disk.geometry.size_bytes()),
                format_disk_size(free_bytes(disk)),
            ]
        })
        .collect::<Vec<_>>();
    let table = render_table(&["  Disk ###", "Status", "Size", "Free"], &rows);
    session.blank()?;
    session.say(table)?;
    session.blank()
}

pub(super) fn partition<W: Write>(session: &mut Session<W>, _args: &[String]) -> Result<(), Error> {
    let disk = session.selection.current_disk(&session.store)?;
    let current = session.selection.partition();
    let bytes_per_sector = disk.geometry.bytes_per_sector;
    let rows = disk
        .numbered_partitions()
        .map(|(number, part)| {
            vec![
                format!("{} Partition {number}", marker(current == Some(part.id))),
                part.kind_label().to_string(),
                format_size(part.size_bytes(bytes_per_sector)),
                format_size(part.offset_bytes(bytes_per_sector)),
            ]
        })
        .collect::<Vec<_>>();

    session.blank()?;
    if rows.is_empty() {
        session.say("There are no partitions on this disk to show.")?;
    } else {
        let table = render_table(&["  Partition ###", "Type", "Size", "Offset"], &rows);
        session.say(table)?;
    }
    session.blank()
}

pub(super) fn volume<W: Write>(session: &mut Session<W>, _args: &[String]) -> Result<(), Error> {
    let current = session.selection.volume();
    let rows = session
        .store
        .volumes()
        .iter()
        .map(|volume| {
            vec![
                format!("{} Volume {}", marker(current == Some(volume.number)), volume.number),
                volume.letter.map(String::from).unwrap_or_default(),
                volume.label.clone(),
                volume.filesystem.clone(),
                volume.kind.label().to_string(),
                format_size(volume.size),
            ]
        })
        .collect::<Vec<_>>();
    let table = render_table(&["  Volume ###", "Ltr", "Label", "Fs", "Type", "Size"], &rows);
    session.blank()?;
    session.say(table)?;
    session.blank()
}
