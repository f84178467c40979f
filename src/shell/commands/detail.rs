// DETAIL DISK | PARTITION | VOLUME.
use std::io::Write;

use crate::core::error::Error;
use crate::shell::Session;
use crate::shell::args::invalid;
use crate::shell::render::{format_disk_size, format_size};

fn no_extra_args(args: &[String]) -> Result<(), Error> {
    if args.len() > 2 {
        return Err(invalid("Invalid arguments."));
    }
    Ok(())
}

pub(super) fn disk<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    no_extra_args(args)?;
    let disk = session.selection.current_disk(&session.store)?;
    let geometry = disk.geometry;
    let mut lines = vec![
        String::new(),
        format!("Disk {}", disk.number),
        format!("Path: {}", disk.path().display()),
        format!("Disk ID: {:08X}", disk.signature),
        format!("Type: {}", disk.table.label()),
        format!("Removable: {}", yes_no(disk.removable)),
        format!("Size: {}", format_disk_size(geometry.size_bytes())),
        format!("Bytes per sector: {}", geometry.bytes_per_sector),
        format!("Sectors: {}", geometry.sector_count),
        format!(
            "Cylinders: {}  Tracks per cylinder: {}  Sectors per track: {}",
            geometry.cylinders, geometry.tracks_per_cylinder, geometry.sectors_per_track
        ),
    ];

    let volumes = session.store.volumes_on_disk(disk).collect::<Vec<_>>();
    lines.push(String::new());
    if volumes.is_empty() {
        lines.push("There are no volumes.".to_string());
    } else {
        lines.push("Volumes:".to_string());
        for volume in volumes {
            lines.push(format!(
                "  Volume {}  {}  {}  {}",
                volume.number,
                volume.kind.label(),
                volume.filesystem,
                format_size(volume.size)
            ));
        }
    }

    for line in lines {
        session.say(line)?;
    }
    session.blank()
}

pub(super) fn partition<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    no_extra_args(args)?;
    let disk = session.selection.current_disk(&session.store)?;
    let part = session.selection.current_partition(&session.store)?;
    let bytes_per_sector = disk.geometry.bytes_per_sector;
    let number = disk.display_number(part.id).unwrap_or_default();
    let mut lines = vec![
        String::new(),
        format!("Partition {number}"),
        format!("Type  : {:02X}", part.type_code),
        format!("Kind  : {}", part.kind_label()),
        format!("Active: {}", yes_no(part.boot)),
        format!("Offset in Bytes: {}", part.offset_bytes(bytes_per_sector)),
        format!("Size  : {}", format_size(part.size_bytes(bytes_per_sector))),
        String::new(),
    ];

    let volumes = session.store.volumes_on_partition(part).collect::<Vec<_>>();
    if volumes.is_empty() {
        lines.push("No volume found".to_string());
    } else {
        lines.push("Volumes:".to_string());
        for volume in volumes {
            lines.push(format!(
                "  Volume {}  {}  {}",
                volume.number,
                volume.kind.label(),
                format_size(volume.size)
            ));
        }
    }

    for line in lines {
        session.say(line)?;
    }
    session.blank()
}

pub(super) fn volume<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    no_extra_args(args)?;
    let volume = session.selection.current_volume(&session.store)?;
    let mut lines = vec![
        String::new(),
        format!("Volume {}", volume.number),
        format!("Type  : {}", volume.kind.label()),
        format!("Label : {}", volume.label),
        format!("Fs    : {}", volume.filesystem),
        format!("Size  : {}", format_size(volume.size)),
    ];
    if let Some(device) = &volume.device {
        lines.push(format!("Device: {}", device.display()));
    }
    if let Some(mount_point) = &volume.mount_point {
        lines.push(format!("Mounted at: {}", mount_point.display()));
    }
    lines.push(String::new());

    let disks = session.store.disks_of_volume(volume).collect::<Vec<_>>();
    if disks.is_empty() {
        lines.push("No disks found".to_string());
    } else {
        lines.push("Disks:".to_string());
        for disk in disks {
            lines.push(format!(
                "  Disk {}  {}",
                disk.number,
                format_disk_size(disk.geometry.size_bytes())
            ));
        }
    }

    for line in lines {
        session.say(line)?;
    }
    session.blank()
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}
