//! Purpose: Translate between a device's MBR/EBR sectors and a Disk's partition sequences.
//! Exports: `LoadedTable`, `TableImage`, `SectorWrite`, `load_table`, `build_image`,
//! `alignment_sectors`, `free_regions`, `FreeRegion`.
//! Role: Partition-table provider used by discovery (load) and the commit engine (serialize).
//! Invariants: Images are always built from a full sector 0; sub-structures are never written alone.
//! Invariants: EBR sectors come before sector 0 in `TableImage::writes`.
use std::collections::HashSet;

use crate::core::device::BlockDevice;
use crate::core::error::{Error, ErrorKind};
use crate::core::mbr::{self, BootSector, MbrEntry};
use crate::core::model::{Disk, Partition, PartitionId, TableKind};

const ALIGNMENT_BYTES: u64 = 1024 * 1024;
const MAX_LOGICAL: usize = 128;

#[derive(Clone, Debug)]
pub struct LoadedTable {
    pub kind: TableKind,
    pub signature: u32,
    pub primary: Vec<Partition>,
    pub logical: Vec<Partition>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SectorWrite {
    pub lba: u64,
    pub sector: BootSector,
}

/// Every sector a commit writes, in write order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableImage {
    pub writes: Vec<SectorWrite>,
}

impl TableImage {
    pub fn sector_zero(&self) -> Option<&BootSector> {
        self.writes
            .iter()
            .find(|write| write.lba == 0)
            .map(|write| &write.sector)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FreeRegion {
    pub start_sector: u64,
    pub sector_count: u64,
}

/// One MiB in sectors; the minimum gap before the first partition and inside each EBR gap.
pub fn alignment_sectors(bytes_per_sector: u32) -> u64 {
    (ALIGNMENT_BYTES / u64::from(bytes_per_sector.max(1))).max(1)
}

pub fn read_sector(
    device: &mut dyn BlockDevice,
    lba: u64,
    bytes_per_sector: u32,
) -> Result<BootSector, Error> {
    let mut buf = [0u8; mbr::SECTOR_SIZE];
    device.read_at(lba * u64::from(bytes_per_sector), &mut buf)?;
    BootSector::from_bytes(&buf)
}

/// Reads sector 0 (and the EBR chain) of `device`; ids come from `next_id`.
pub fn load_table(
    device: &mut dyn BlockDevice,
    disk: u32,
    bytes_per_sector: u32,
    next_id: &mut dyn FnMut() -> PartitionId,
) -> Result<LoadedTable, Error> {
    let sector = read_sector(device, 0, bytes_per_sector)?;
    if !sector.has_signature() {
        return Ok(LoadedTable {
            kind: TableKind::None,
            signature: 0,
            primary: Vec::new(),
            logical: Vec::new(),
        });
    }
    if sector.is_gpt_protective() {
        return Ok(LoadedTable {
            kind: TableKind::Gpt,
            signature: sector.disk_id(),
            primary: Vec::new(),
            logical: Vec::new(),
        });
    }

    let mut primary = Vec::new();
    let mut extended = None;
    for (slot, entry) in sector.entries().iter().enumerate() {
        if entry.is_empty() {
            continue;
        }
        let partition = Partition {
            id: next_id(),
            disk,
            start_sector: u64::from(entry.lba_start),
            sector_count: u64::from(entry.sector_count),
            type_code: entry.type_code,
            boot: entry.boot,
            logical: false,
            partitioned: entry.type_code != mbr::TYPE_EMPTY,
            on_disk_index: slot,
            ebr_sector: None,
        };
        if partition.is_container() && extended.is_none() {
            extended = Some((partition.start_sector, partition.sector_count));
        }
        primary.push(partition);
    }

    let logical = match extended {
        Some((start, count)) => {
            load_logical_chain(device, disk, bytes_per_sector, start, count, next_id)?
        }
        None => Vec::new(),
    };

    tracing::debug!(
        disk,
        primary = primary.len(),
        logical = logical.len(),
        "loaded MBR table"
    );
    Ok(LoadedTable {
        kind: TableKind::Mbr,
        signature: sector.disk_id(),
        primary,
        logical,
    })
}

fn load_logical_chain(
    device: &mut dyn BlockDevice,
    disk: u32,
    bytes_per_sector: u32,
    container_start: u64,
    container_count: u64,
    next_id: &mut dyn FnMut() -> PartitionId,
) -> Result<Vec<Partition>, Error> {
    let container_end = container_start + container_count;
    let mut logical = Vec::new();
    let mut visited = HashSet::new();
    let mut ebr_lba = container_start;

    loop {
        if !visited.insert(ebr_lba) || logical.len() >= MAX_LOGICAL {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("EBR chain loops")
                .with_disk(disk)
                .with_offset(ebr_lba * u64::from(bytes_per_sector)));
        }
        let ebr = read_sector(device, ebr_lba, bytes_per_sector)?;
        if !ebr.has_signature() {
            break;
        }
        let entry = ebr.entry(0);
        if !entry.is_empty() {
            let start = ebr_lba + u64::from(entry.lba_start);
            let count = u64::from(entry.sector_count);
            if start + count > container_end {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("logical partition exceeds extended container")
                    .with_disk(disk));
            }
            logical.push(Partition {
                id: next_id(),
                disk,
                start_sector: start,
                sector_count: count,
                type_code: entry.type_code,
                boot: entry.boot,
                logical: true,
                partitioned: entry.type_code != mbr::TYPE_EMPTY,
                on_disk_index: logical.len(),
                ebr_sector: Some(ebr_lba),
            });
        }
        let link = ebr.entry(1);
        if link.is_empty() || !mbr::is_container_type(link.type_code) {
            break;
        }
        let next = container_start + u64::from(link.lba_start);
        if next <= container_start || next >= container_end {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("EBR link points outside the extended container")
                .with_disk(disk));
        }
        ebr_lba = next;
    }
    Ok(logical)
}

/// Serializes the in-memory table of `disk` on top of the current sector 0 bytes.
pub fn build_image(disk: &Disk, current: &BootSector) -> Result<TableImage, Error> {
    if disk.table == TableKind::Gpt {
        return Err(unsupported_gpt(disk.number));
    }

    let mut sector = current.clone();
    sector.clear_table();
    for partition in disk.primary().iter().filter(|part| part.partitioned) {
        if partition.on_disk_index >= mbr::SLOT_COUNT {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("primary partition has no MBR slot")
                .with_disk(disk.number));
        }
        let entry = MbrEntry::for_range(
            partition.boot,
            partition.type_code,
            partition.start_sector,
            partition.sector_count,
        )?;
        sector.set_entry(partition.on_disk_index, &entry);
    }
    sector.set_disk_id(disk.signature);
    sector.set_signature();

    let mut writes = match disk.extended() {
        Some(container) => build_ebr_chain(disk, container)?,
        None => Vec::new(),
    };
    writes.push(SectorWrite { lba: 0, sector });
    Ok(TableImage { writes })
}

fn build_ebr_chain(disk: &Disk, container: &Partition) -> Result<Vec<SectorWrite>, Error> {
    let mut logicals = disk
        .logical()
        .iter()
        .filter(|part| part.partitioned)
        .collect::<Vec<_>>();
    logicals.sort_by_key(|part| part.start_sector);

    if logicals.is_empty() {
        let mut empty = BootSector::zeroed();
        empty.set_signature();
        return Ok(vec![SectorWrite {
            lba: container.start_sector,
            sector: empty,
        }]);
    }

    let mut writes = Vec::with_capacity(logicals.len());
    for (index, partition) in logicals.iter().enumerate() {
        let ebr_lba = partition.ebr_sector.ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message("logical partition has no EBR sector")
                .with_disk(disk.number)
        })?;
        if ebr_lba >= partition.start_sector {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("EBR must precede its logical partition")
                .with_disk(disk.number));
        }
        let mut ebr = BootSector::zeroed();
        let entry = MbrEntry::for_range(
            false,
            partition.type_code,
            partition.start_sector - ebr_lba,
            partition.sector_count,
        )?;
        ebr.set_entry(0, &entry);
        if let Some(next) = logicals.get(index + 1) {
            let next_ebr = next.ebr_sector.unwrap_or(next.start_sector);
            let link = MbrEntry::for_range(
                false,
                mbr::TYPE_EXTENDED,
                next_ebr - container.start_sector,
                next.start_sector + next.sector_count - next_ebr,
            )?;
            ebr.set_entry(1, &link);
        }
        ebr.set_signature();
        writes.push(SectorWrite {
            lba: ebr_lba,
            sector: ebr,
        });
    }

    // The first EBR must sit at the container start so the chain is reachable.
    if writes.first().map(|write| write.lba) != Some(container.start_sector) {
        let first = logicals[0];
        let first_ebr = first.ebr_sector.unwrap_or(first.start_sector);
        let mut head = BootSector::zeroed();
        let link = MbrEntry::for_range(
            false,
            mbr::TYPE_EXTENDED,
            first_ebr - container.start_sector,
            first.start_sector + first.sector_count - first_ebr,
        )?;
        head.set_entry(1, &link);
        head.set_signature();
        writes.insert(
            0,
            SectorWrite {
                lba: container.start_sector,
                sector: head,
            },
        );
    }
    Ok(writes)
}

/// Free regions of the primary area (`logical == false`) or of the extended container,
/// ascending by start sector, each at least one alignment unit long.
pub fn free_regions(disk: &Disk, logical: bool) -> Vec<FreeRegion> {
    let align = alignment_sectors(disk.geometry.bytes_per_sector);
    let (area_start, area_end, used) = if logical {
        let Some(container) = disk.extended() else {
            return Vec::new();
        };
        let used = disk
            .logical()
            .iter()
            .filter(|part| part.partitioned)
            .map(|part| {
                let from = part.ebr_sector.unwrap_or(part.start_sector);
                (from, part.start_sector + part.sector_count)
            })
            .collect::<Vec<_>>();
        (
            container.start_sector,
            container.start_sector + container.sector_count,
            used,
        )
    } else {
        let used = disk
            .primary()
            .iter()
            .filter(|part| part.partitioned)
            .map(|part| (part.start_sector, part.start_sector + part.sector_count))
            .collect::<Vec<_>>();
        (align, disk.geometry.sector_count, used)
    };
    gaps(area_start, area_end, used, align)
}

fn gaps(area_start: u64, area_end: u64, mut used: Vec<(u64, u64)>, min_len: u64) -> Vec<FreeRegion> {
    used.sort_unstable();
    let mut regions = Vec::new();
    let mut cursor = area_start;
    for (start, end) in used {
        if start > cursor {
            push_region(&mut regions, cursor, start.min(area_end), min_len);
        }
        cursor = cursor.max(end);
    }
    push_region(&mut regions, cursor, area_end, min_len);
    regions
}

fn push_region(regions: &mut Vec<FreeRegion>, start: u64, end: u64, min_len: u64) {
    if end > start && end - start >= min_len {
        regions.push(FreeRegion {
            start_sector: start,
            sector_count: end - start,
        });
    }
}

pub fn unsupported_gpt(disk: u32) -> Error {
    Error::new(ErrorKind::Unsupported)
        .with_message("GPT partition tables are not supported")
        .with_hint("Only MBR tables can be modified.")
        .with_disk(disk)
}
