//! Purpose: Apply partition mutations to the entity store and persist them to devices.
//! Exports: `Engine`, `Commit`, `Deleted`, `Cleaned`, `Created`, `CreateKind`, `CreateRequest`,
//! `Deactivated`, `validate_type_code`.
//! Role: Mutation & commit engine shared by every mutating shell command.
//! Invariants: The dirty flag is cleared only after both the table write and the sync succeed.
//! Invariants: Tables are always serialized in full; no sub-structure is written on its own.
//! Invariants: Partition re-read failures are reported as warnings, never as errors.
use getrandom::fill as fill_random;

use crate::core::device::{Access, BlockDevice, DeviceOpener};
use crate::core::discovery::{self, DiscoveryConfig, MountProvider};
use crate::core::error::{Error, ErrorKind};
use crate::core::mbr::{self, BootSector};
use crate::core::model::{Disk, Geometry, Partition, PartitionId, TableKind};
use crate::core::store::{EntityStore, NewPartition};
use crate::core::table::{self, FreeRegion};

const CLEAN_SPAN: u64 = 1024 * 1024;
const BYTES_PER_MB: u64 = 1024 * 1024;
const CHS_CYLINDER_LIMIT: u64 = 1023;
/// First sector a 32-bit MBR entry cannot reach.
const MBR_SECTOR_LIMIT: u64 = 1 << 32;

/// Result of a successful write + sync.
#[derive(Debug)]
pub struct Commit {
    pub sectors_written: usize,
    /// The kernel refused to re-read the table; the table itself is durable.
    pub warning: Option<Error>,
}

#[derive(Debug)]
pub enum Deactivated {
    AlreadyInactive,
    Cleared(Commit),
}

#[derive(Debug)]
pub struct Deleted {
    pub removed: Vec<Partition>,
    pub volumes: Vec<u32>,
    pub warning: Option<Error>,
}

#[derive(Debug)]
pub struct Cleaned {
    pub removed: Vec<Partition>,
    pub volumes: Vec<u32>,
    pub warning: Option<Error>,
}

#[derive(Debug)]
pub struct Created {
    pub id: PartitionId,
    pub commit: Commit,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CreateKind {
    Primary,
    Extended,
    Logical,
}

impl CreateKind {
    pub fn label(self) -> &'static str {
        match self {
            CreateKind::Primary => "primary",
            CreateKind::Extended => "extended",
            CreateKind::Logical => "logical",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CreateRequest {
    pub kind: CreateKind,
    pub size_mb: Option<u64>,
    pub type_code: Option<u8>,
}

/// Rejects the type codes no partition may carry: 0 (free space) and 0x42.
pub fn validate_type_code(code: u8) -> Result<(), Error> {
    match code {
        mbr::TYPE_EMPTY => Err(Error::new(ErrorKind::InvalidArgument)
            .with_message("Invalid partition type: 0 is not allowed.")),
        mbr::TYPE_RESERVED => Err(Error::new(ErrorKind::InvalidArgument)
            .with_message("Partition type 0x42 is invalid.")),
        _ => Ok(()),
    }
}

pub struct Engine {
    opener: Box<dyn DeviceOpener>,
    mounts: Box<dyn MountProvider>,
}

impl Engine {
    pub fn new(opener: Box<dyn DeviceOpener>, mounts: Box<dyn MountProvider>) -> Self {
        Self { opener, mounts }
    }

    pub fn scan(&self, config: &DiscoveryConfig) -> Result<EntityStore, Error> {
        discovery::scan(config, self.opener.as_ref(), self.mounts.as_ref())
    }

    /// Serializes the table of `disk`, writes every sector, then syncs once.
    pub fn commit(&self, store: &mut EntityStore, disk: u32) -> Result<Commit, Error> {
        let entry = lookup(store, disk)?;
        if entry.table == TableKind::Gpt {
            return Err(table::unsupported_gpt(disk));
        }
        let bytes_per_sector = entry.geometry.bytes_per_sector;
        let mut device = self.opener.open(&entry.path, Access::ReadWrite)?;
        let current = table::read_sector(device.as_mut(), 0, bytes_per_sector)?;
        let image = table::build_image(entry, &current)?;

        for write in &image.writes {
            tracing::debug!(disk, lba = write.lba, "writing table sector");
            device
                .write_at(write.lba * u64::from(bytes_per_sector), write.sector.as_bytes())
                .map_err(|err| err.with_disk(disk))?;
        }
        device.sync().map_err(|err| err.with_disk(disk))?;
        store.disk_mut(disk)?.mark_clean();

        let warning = reread(device.as_mut(), disk);
        tracing::info!(disk, sectors = image.writes.len(), "committed partition table");
        Ok(Commit {
            sectors_written: image.writes.len(),
            warning,
        })
    }

    /// Clears boot flags on every normal partition, then sets it on `id`.
    pub fn set_active(
        &self,
        store: &mut EntityStore,
        disk: u32,
        id: PartitionId,
    ) -> Result<Commit, Error> {
        let partition = lookup_partition(store, disk, id)?;
        ensure_mbr(lookup(store, disk)?)?;
        if !partition.is_normal() {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message("Only primary partitions can be marked active.")
                .with_disk(disk));
        }
        store.clear_boot_indicators(disk)?;
        store.set_boot_indicator(disk, id, true)?;
        self.commit(store, disk)
    }

    pub fn set_inactive(
        &self,
        store: &mut EntityStore,
        disk: u32,
        id: PartitionId,
    ) -> Result<Deactivated, Error> {
        let partition = lookup_partition(store, disk, id)?;
        if !partition.boot {
            return Ok(Deactivated::AlreadyInactive);
        }
        ensure_mbr(lookup(store, disk)?)?;
        store.set_boot_indicator(disk, id, false)?;
        Ok(Deactivated::Cleared(self.commit(store, disk)?))
    }

    pub fn set_type(
        &self,
        store: &mut EntityStore,
        disk: u32,
        id: PartitionId,
        type_code: u8,
    ) -> Result<Commit, Error> {
        validate_type_code(type_code)?;
        lookup_partition(store, disk, id)?;
        ensure_mbr(lookup(store, disk)?)?;
        store.set_partition_type(disk, id, type_code)?;
        self.commit(store, disk)
    }

    pub fn set_signature(
        &self,
        store: &mut EntityStore,
        disk: u32,
        signature: u32,
    ) -> Result<Commit, Error> {
        let entry = lookup(store, disk)?;
        ensure_mbr(entry)?;
        if entry.table == TableKind::None {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message("The disk has no partition table.")
                .with_hint("Create a partition first.")
                .with_disk(disk));
        }
        store.set_disk_signature(disk, signature)?;
        self.commit(store, disk)
    }

    /// Zero-fills MBR slot `slot` (1-based) in sector 0 and writes the sector back.
    pub fn delete_slot(
        &self,
        store: &mut EntityStore,
        disk: u32,
        slot: u32,
    ) -> Result<Deleted, Error> {
        if !(1..=mbr::SLOT_COUNT as u32).contains(&slot) {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message("Partition index must be between 1 and 4."));
        }
        let index = (slot - 1) as usize;
        let entry = lookup(store, disk)?;
        ensure_mbr(entry)?;
        let path = entry.path.clone();
        let was_dirty = entry.is_dirty();
        let targets = entry
            .primary()
            .iter()
            .filter(|part| part.partitioned && part.on_disk_index == index)
            .map(|part| part.id)
            .collect::<Vec<_>>();

        let mut device = self.opener.open(&path, Access::ReadWrite)?;
        let mut raw = [0u8; mbr::SECTOR_SIZE];
        device.read_at(0, &mut raw).map_err(|err| err.with_disk(disk))?;
        let mut sector = BootSector::from_bytes(&raw)?;
        if !sector.has_signature() {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("The disk has no valid MBR.")
                .with_path(&path)
                .with_disk(disk));
        }
        if sector.entry(index).is_empty() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("Partition not found.")
                .with_disk(disk));
        }

        let volumes = self.dismount_partitions(store, disk, &targets)?;
        sector.clear_entry(index);
        device
            .write_at(0, sector.as_bytes())
            .map_err(|err| err.with_disk(disk))?;
        device.sync().map_err(|err| err.with_disk(disk))?;

        let mut removed = Vec::new();
        for id in targets {
            removed.extend(store.remove_partition(disk, id)?);
        }
        if !was_dirty {
            store.disk_mut(disk)?.mark_clean();
        }
        for number in &volumes {
            store.remove_volume(*number);
        }

        let warning = reread(device.as_mut(), disk);
        tracing::info!(disk, slot, removed = removed.len(), "deleted MBR slot");
        Ok(Deleted {
            removed,
            volumes,
            warning,
        })
    }

    /// Deletes `id`: primaries through the slot path, logicals through a full commit.
    pub fn delete_partition(
        &self,
        store: &mut EntityStore,
        disk: u32,
        id: PartitionId,
    ) -> Result<Deleted, Error> {
        let partition = lookup_partition(store, disk, id)?;
        ensure_mbr(lookup(store, disk)?)?;
        if !partition.logical {
            return self.delete_slot(store, disk, partition.on_disk_index as u32 + 1);
        }

        let volumes = self.dismount_partitions(store, disk, &[id])?;
        let removed = store.remove_partition(disk, id)?;
        for number in &volumes {
            store.remove_volume(*number);
        }
        let commit = self.commit(store, disk)?;
        Ok(Deleted {
            removed,
            volumes,
            warning: commit.warning,
        })
    }

    /// Places a new partition first-fit and commits the table.
    pub fn create_partition(
        &self,
        store: &mut EntityStore,
        disk: u32,
        request: CreateRequest,
    ) -> Result<Created, Error> {
        let type_code = requested_type(&request)?;
        let entry = lookup(store, disk)?;
        ensure_mbr(entry)?;
        let needs_table = entry.table == TableKind::None;
        let placement = plan_placement(entry, &request, type_code)?;

        let signature = match (needs_table, entry.signature) {
            (true, 0) => Some(fresh_signature()?),
            _ => None,
        };
        if needs_table {
            let entry = store.disk_mut(disk)?;
            entry.table = TableKind::Mbr;
            if let Some(signature) = signature {
                entry.signature = signature;
            }
        }
        let id = store.insert_partition(disk, placement)?;
        tracing::debug!(
            disk,
            start = placement.start_sector,
            sectors = placement.sector_count,
            type_code = placement.type_code,
            "planned partition"
        );
        let commit = self.commit(store, disk)?;
        Ok(Created { id, commit })
    }

    /// Zeroes the first and last MiB (or the whole device) and forgets all partitions.
    pub fn clean(&self, store: &mut EntityStore, disk: u32, all: bool) -> Result<Cleaned, Error> {
        let entry = lookup(store, disk)?;
        let path = entry.path.clone();
        let size = entry.geometry.size_bytes();
        let ids = entry.partitions().map(|part| part.id).collect::<Vec<_>>();
        let volumes = store
            .volumes_on_disk(entry)
            .map(|volume| volume.number)
            .collect::<Vec<_>>();

        for number in &volumes {
            if let Some(volume) = store.volume(*number) {
                self.mounts.dismount(volume)?;
            }
        }

        let mut device = self.opener.open(&path, Access::ReadWrite)?;
        let head_end = size.min(CLEAN_SPAN);
        let tail_start = size.saturating_sub(CLEAN_SPAN).max(head_end);
        if all {
            zero_range(device.as_mut(), 0, size)?;
        } else {
            zero_range(device.as_mut(), 0, head_end)?;
            zero_range(device.as_mut(), tail_start, size)?;
        }
        device.sync().map_err(|err| err.with_disk(disk))?;

        let mut removed = Vec::new();
        for id in ids {
            if let Some(partition) = store.partition(disk, id).cloned() {
                removed.push(partition);
            }
        }
        store.replace_partitions(disk, Vec::new(), Vec::new())?;
        let entry = store.disk_mut(disk)?;
        entry.table = TableKind::None;
        entry.signature = 0;
        entry.mark_clean();
        for number in &volumes {
            store.remove_volume(*number);
        }

        let warning = reread(device.as_mut(), disk);
        tracing::info!(disk, all, "cleaned disk");
        Ok(Cleaned {
            removed,
            volumes,
            warning,
        })
    }

    /// Reads one sector of `disk` at `lba`.
    pub fn read_sector(&self, store: &EntityStore, disk: u32, lba: u64) -> Result<Vec<u8>, Error> {
        let entry = lookup(store, disk)?;
        if lba >= entry.geometry.sector_count {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message("Sector number is beyond the end of the disk.")
                .with_disk(disk));
        }
        let bytes_per_sector = entry.geometry.bytes_per_sector;
        let mut device = self.opener.open(&entry.path, Access::Read)?;
        let mut buf = vec![0u8; bytes_per_sector as usize];
        device
            .read_at(lba * u64::from(bytes_per_sector), &mut buf)
            .map_err(|err| err.with_disk(disk))?;
        Ok(buf)
    }

    /// Unmounts every volume that sits exactly on one of `ids` (or their logicals).
    fn dismount_partitions(
        &self,
        store: &EntityStore,
        disk: u32,
        ids: &[PartitionId],
    ) -> Result<Vec<u32>, Error> {
        let entry = lookup(store, disk)?;
        let mut affected: Vec<&Partition> = Vec::new();
        for id in ids {
            if let Some(partition) = entry.partition(*id) {
                affected.push(partition);
                if partition.is_container() && entry.extended == Some(*id) {
                    affected.extend(entry.logical());
                }
            }
        }

        let mut volumes = Vec::new();
        for partition in affected {
            for volume in store.volumes_on_partition(partition) {
                if !volumes.contains(&volume.number) {
                    self.mounts.dismount(volume)?;
                    volumes.push(volume.number);
                }
            }
        }
        Ok(volumes)
    }
}

fn lookup(store: &EntityStore, disk: u32) -> Result<&Disk, Error> {
    store.disk(disk).ok_or_else(|| {
        Error::new(ErrorKind::NotFound)
            .with_message("Disk not found.")
            .with_disk(disk)
    })
}

fn lookup_partition(store: &EntityStore, disk: u32, id: PartitionId) -> Result<Partition, Error> {
    store.partition(disk, id).cloned().ok_or_else(|| {
        Error::new(ErrorKind::NotFound)
            .with_message("Partition not found.")
            .with_disk(disk)
    })
}

fn ensure_mbr(disk: &Disk) -> Result<(), Error> {
    if disk.table == TableKind::Gpt {
        return Err(table::unsupported_gpt(disk.number));
    }
    Ok(())
}

fn reread(device: &mut dyn BlockDevice, disk: u32) -> Option<Error> {
    match device.reread_partitions() {
        Ok(()) => None,
        Err(err) => {
            tracing::warn!(disk, error = %err, "partition re-read failed");
            Some(err.with_disk(disk))
        }
    }
}

fn zero_range(device: &mut dyn BlockDevice, start: u64, end: u64) -> Result<(), Error> {
    let zeros = vec![0u8; CLEAN_SPAN as usize];
    let mut offset = start;
    while offset < end {
        let len = (end - offset).min(CLEAN_SPAN) as usize;
        device.write_at(offset, &zeros[..len])?;
        offset += len as u64;
    }
    Ok(())
}

fn requested_type(request: &CreateRequest) -> Result<Option<u8>, Error> {
    match (request.kind, request.type_code) {
        (CreateKind::Extended, Some(_)) => Err(Error::new(ErrorKind::InvalidArgument)
            .with_message("The id= option is not valid for extended partitions.")),
        (_, Some(code)) => {
            validate_type_code(code)?;
            if mbr::is_container_type(code) {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("Partition type 0x{code:02x} is reserved for extended partitions."))
                    .with_hint("Use \"create partition extended\" instead."));
            }
            Ok(Some(code))
        }
        (_, None) => Ok(None),
    }
}

fn plan_placement(
    disk: &Disk,
    request: &CreateRequest,
    type_code: Option<u8>,
) -> Result<NewPartition, Error> {
    let bytes_per_sector = u64::from(disk.geometry.bytes_per_sector);
    let align = table::alignment_sectors(disk.geometry.bytes_per_sector);
    let wanted = match request.size_mb {
        Some(0) => {
            return Err(Error::new(ErrorKind::InvalidArgument).with_message("Invalid size."));
        }
        Some(mb) => Some(
            mb.checked_mul(BYTES_PER_MB)
                .map(|bytes| bytes / bytes_per_sector)
                .ok_or_else(|| {
                    Error::new(ErrorKind::InvalidArgument).with_message("Invalid size.")
                })?,
        ),
        None => None,
    };

    match request.kind {
        CreateKind::Primary | CreateKind::Extended => {
            if request.kind == CreateKind::Extended && disk.extended().is_some() {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_message("An extended partition already exists.")
                    .with_disk(disk.number));
            }
            let slot = disk.free_slot().ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_message("No free partition table slot.")
                    .with_hint("An MBR disk holds at most four primary or extended partitions.")
                    .with_disk(disk.number)
            })?;
            let regions = table::free_regions(disk, false);
            let (_, start, count) =
                first_fit(&regions, wanted, |region| align_up(region.start_sector, align))
                    .ok_or_else(|| not_enough_space(disk, request))?;
            let type_code = match request.kind {
                CreateKind::Extended => extended_type(&disk.geometry, start + count - 1),
                _ => type_code.unwrap_or(mbr::TYPE_LINUX),
            };
            Ok(NewPartition {
                start_sector: start,
                sector_count: count,
                type_code,
                logical: false,
                on_disk_index: slot,
                ebr_sector: None,
            })
        }
        CreateKind::Logical => {
            if disk.extended().is_none() {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_message("No extended partition exists.")
                    .with_hint("Create one with \"create partition extended\".")
                    .with_disk(disk.number));
            }
            let regions = table::free_regions(disk, true);
            let (region, start, count) = first_fit(&regions, wanted, |region| {
                align_up(region.start_sector + 1, align)
            })
            .ok_or_else(|| not_enough_space(disk, request))?;
            Ok(NewPartition {
                start_sector: start,
                sector_count: count,
                type_code: type_code.unwrap_or(mbr::TYPE_LINUX),
                logical: true,
                on_disk_index: disk.logical().len(),
                ebr_sector: Some(region.start_sector),
            })
        }
    }
}

/// First region, by ascending start, that fits `wanted` sectors (or any space when unsized).
/// Space past `MBR_SECTOR_LIMIT` is never offered.
fn first_fit(
    regions: &[FreeRegion],
    wanted: Option<u64>,
    first_usable: impl Fn(&FreeRegion) -> u64,
) -> Option<(FreeRegion, u64, u64)> {
    regions.iter().find_map(|region| {
        let end = (region.start_sector + region.sector_count).min(MBR_SECTOR_LIMIT);
        let start = first_usable(region);
        if start >= end {
            return None;
        }
        let available = end - start;
        let count = wanted.unwrap_or(available);
        (count > 0 && count <= available).then_some((*region, start, count))
    })
}

fn align_up(sector: u64, align: u64) -> u64 {
    sector.div_ceil(align) * align
}

fn extended_type(geometry: &Geometry, last_sector: u64) -> u8 {
    let per_cylinder = u64::from(geometry.tracks_per_cylinder) * u64::from(geometry.sectors_per_track);
    if per_cylinder > 0 && last_sector / per_cylinder > CHS_CYLINDER_LIMIT {
        mbr::TYPE_EXTENDED_LBA
    } else {
        mbr::TYPE_EXTENDED
    }
}

fn not_enough_space(disk: &Disk, request: &CreateRequest) -> Error {
    let message = match request.size_mb {
        Some(mb) => format!("Not enough free space for requested size {mb} MB."),
        None => "No free space available.".to_string(),
    };
    Error::new(ErrorKind::InvalidArgument)
        .with_message(message)
        .with_disk(disk.number)
}

fn fresh_signature() -> Result<u32, Error> {
    let mut bytes = [0u8; 4];
    fill_random(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to generate disk signature: {err}"))
    })?;
    Ok(match u32::from_le_bytes(bytes) {
        0 => 1,
        value => value,
    })
}
