//! Purpose: Own the canonical Disk and Volume collections and their relationships.
//! Exports: `EntityStore`, `NewPartition`.
//! Role: Single source of truth mutated by command handlers through explicit setters.
//! Invariants: Collections keep insertion order; iteration is forward only.
//! Invariants: Every partition setter marks the owning disk dirty.
//! Invariants: Volume queries are exact matches on disk number and byte extents.
use crate::core::error::{Error, ErrorKind};
use crate::core::model::{Disk, Partition, PartitionId, Volume};

/// Fields for a partition about to be inserted; the store assigns the id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NewPartition {
    pub start_sector: u64,
    pub sector_count: u64,
    pub type_code: u8,
    pub logical: bool,
    pub on_disk_index: usize,
    pub ebr_sector: Option<u64>,
}

#[derive(Debug, Default)]
pub struct EntityStore {
    disks: Vec<Disk>,
    volumes: Vec<Volume>,
    next_partition_id: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn disk(&self, number: u32) -> Option<&Disk> {
        self.disks.iter().find(|disk| disk.number == number)
    }

    pub(crate) fn disk_mut(&mut self, number: u32) -> Result<&mut Disk, Error> {
        self.disks
            .iter_mut()
            .find(|disk| disk.number == number)
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message("disk not found")
                    .with_disk(number)
            })
    }

    pub fn volume(&self, number: u32) -> Option<&Volume> {
        self.volumes.iter().find(|volume| volume.number == number)
    }

    pub fn add_disk(&mut self, disk: Disk) {
        self.disks.push(disk);
    }

    pub fn remove_disk(&mut self, number: u32) -> Option<Disk> {
        let index = self.disks.iter().position(|disk| disk.number == number)?;
        Some(self.disks.remove(index))
    }

    pub fn add_volume(&mut self, volume: Volume) {
        self.volumes.push(volume);
    }

    /// Drops a volume from the collection. Callers holding a selection must clear it.
    pub fn remove_volume(&mut self, number: u32) -> Option<Volume> {
        let index = self
            .volumes
            .iter()
            .position(|volume| volume.number == number)?;
        Some(self.volumes.remove(index))
    }

    pub fn clear(&mut self) {
        self.disks.clear();
        self.volumes.clear();
    }

    pub(crate) fn allocate_partition_id(&mut self) -> PartitionId {
        self.next_partition_id += 1;
        PartitionId(self.next_partition_id)
    }

    /// Resolves a partition anywhere in the store.
    pub fn partition(&self, disk: u32, id: PartitionId) -> Option<&Partition> {
        self.disk(disk)?.partition(id)
    }

    pub fn disk_has_volume(&self, volume: &Volume, disk: &Disk) -> bool {
        volume.extents.iter().any(|extent| extent.disk == disk.number)
    }

    pub fn partition_has_volume(&self, volume: &Volume, partition: &Partition) -> bool {
        let Some(disk) = self.disk(partition.disk) else {
            return false;
        };
        let bytes_per_sector = disk.geometry.bytes_per_sector;
        let offset = partition.offset_bytes(bytes_per_sector);
        let length = partition.size_bytes(bytes_per_sector);
        volume.extents.iter().any(|extent| {
            extent.disk == partition.disk && extent.offset == offset && extent.length == length
        })
    }

    pub fn volumes_on_disk<'a>(&'a self, disk: &'a Disk) -> impl Iterator<Item = &'a Volume> {
        self.volumes
            .iter()
            .filter(move |volume| self.disk_has_volume(volume, disk))
    }

    pub fn volumes_on_partition<'a>(
        &'a self,
        partition: &'a Partition,
    ) -> impl Iterator<Item = &'a Volume> {
        self.volumes
            .iter()
            .filter(move |volume| self.partition_has_volume(volume, partition))
    }

    pub fn disks_of_volume<'a>(&'a self, volume: &'a Volume) -> impl Iterator<Item = &'a Disk> {
        self.disks
            .iter()
            .filter(move |disk| self.disk_has_volume(volume, disk))
    }

    pub fn set_boot_indicator(
        &mut self,
        disk: u32,
        id: PartitionId,
        boot: bool,
    ) -> Result<(), Error> {
        let entry = self.disk_mut(disk)?;
        let partition = entry.partition_mut(id).ok_or_else(|| partition_not_found(disk))?;
        partition.boot = boot;
        entry.mark_dirty();
        Ok(())
    }

    /// Clears the boot flag of every normal (primary, non-container) partition.
    pub fn clear_boot_indicators(&mut self, disk: u32) -> Result<(), Error> {
        let entry = self.disk_mut(disk)?;
        for partition in entry.primary.iter_mut().filter(|part| part.is_normal()) {
            partition.boot = false;
        }
        entry.mark_dirty();
        Ok(())
    }

    pub fn set_partition_type(
        &mut self,
        disk: u32,
        id: PartitionId,
        type_code: u8,
    ) -> Result<(), Error> {
        let entry = self.disk_mut(disk)?;
        let partition = entry.partition_mut(id).ok_or_else(|| partition_not_found(disk))?;
        partition.type_code = type_code;
        entry.mark_dirty();
        Ok(())
    }

    pub fn set_disk_signature(&mut self, disk: u32, signature: u32) -> Result<(), Error> {
        let entry = self.disk_mut(disk)?;
        entry.signature = signature;
        entry.mark_dirty();
        Ok(())
    }

    /// Adds a partition to `disk`: primaries by slot index, logicals at the end.
    pub fn insert_partition(&mut self, disk: u32, new: NewPartition) -> Result<PartitionId, Error> {
        let id = self.allocate_partition_id();
        let entry = self.disk_mut(disk)?;
        let partition = Partition {
            id,
            disk,
            start_sector: new.start_sector,
            sector_count: new.sector_count,
            type_code: new.type_code,
            boot: false,
            logical: new.logical,
            partitioned: new.type_code != 0,
            on_disk_index: new.on_disk_index,
            ebr_sector: new.ebr_sector,
        };
        if partition.logical {
            entry.logical.push(partition);
        } else {
            if partition.is_container() {
                entry.extended = Some(id);
            }
            // Slot order, so numbering matches a fresh load.
            let at = entry
                .primary
                .iter()
                .position(|part| part.on_disk_index > partition.on_disk_index)
                .unwrap_or(entry.primary.len());
            entry.primary.insert(at, partition);
        }
        entry.mark_dirty();
        Ok(id)
    }

    /// Removes a partition; removing the extended container drops its logicals too.
    pub fn remove_partition(&mut self, disk: u32, id: PartitionId) -> Result<Vec<Partition>, Error> {
        let entry = self.disk_mut(disk)?;
        let mut removed = Vec::new();
        if let Some(index) = entry.logical.iter().position(|part| part.id == id) {
            removed.push(entry.logical.remove(index));
            renumber_logical(&mut entry.logical);
        } else if let Some(index) = entry.primary.iter().position(|part| part.id == id) {
            let mut partition = entry.primary.remove(index);
            partition.boot = false;
            if entry.extended == Some(id) {
                entry.extended = None;
                removed.append(&mut entry.logical);
            }
            removed.insert(0, partition);
        } else {
            return Err(partition_not_found(disk));
        }
        entry.mark_dirty();
        Ok(removed)
    }

    /// Replaces the partition sequences of `disk`, e.g. after a fresh table load.
    pub(crate) fn replace_partitions(
        &mut self,
        disk: u32,
        primary: Vec<Partition>,
        logical: Vec<Partition>,
    ) -> Result<(), Error> {
        let entry = self.disk_mut(disk)?;
        entry.extended = primary
            .iter()
            .find(|part| part.is_container())
            .map(|part| part.id);
        entry.primary = primary;
        entry.logical = logical;
        Ok(())
    }
}

fn renumber_logical(logical: &mut [Partition]) {
    for (index, partition) in logical.iter_mut().enumerate() {
        partition.on_disk_index = index;
    }
}

fn partition_not_found(disk: u32) -> Error {
    Error::new(ErrorKind::NotFound)
        .with_message("partition not found")
        .with_disk(disk)
}

#[cfg(test)]
mod tests {
    use super::{EntityStore, NewPartition};
    use crate::core::model::{Disk, Extent, Geometry, Volume, VolumeKind};

    fn store_with_disk() -> EntityStore {
        let mut store = EntityStore::new();
        store.add_disk(Disk::new(0, "/dev/null", Geometry::from_sectors(512, 1 << 21)));
        store
    }

    fn primary(start: u64, count: u64, type_code: u8, slot: usize) -> NewPartition {
        NewPartition {
            start_sector: start,
            sector_count: count,
            type_code,
            logical: false,
            on_disk_index: slot,
            ebr_sector: None,
        }
    }

    #[test]
    fn partition_volume_match_is_exact() {
        let mut store = store_with_disk();
        let id = store
            .insert_partition(0, primary(2048, 4096, 0x83, 0))
            .expect("insert");
        let partition = store.partition(0, id).expect("partition").clone();

        let mut exact = Volume::new(1, VolumeKind::Partition);
        exact.extents.push(Extent {
            disk: 0,
            offset: 2048 * 512,
            length: 4096 * 512,
        });
        let mut near = Volume::new(2, VolumeKind::Partition);
        near.extents.push(Extent {
            disk: 0,
            offset: 2048 * 512,
            length: 4096 * 512 - 1,
        });
        let mut other_disk = Volume::new(3, VolumeKind::Partition);
        other_disk.extents.push(Extent {
            disk: 7,
            offset: 2048 * 512,
            length: 4096 * 512,
        });

        assert!(store.partition_has_volume(&exact, &partition));
        assert!(!store.partition_has_volume(&near, &partition));
        assert!(!store.partition_has_volume(&other_disk, &partition));

        let disk = store.disk(0).expect("disk");
        assert!(store.disk_has_volume(&near, disk));
        assert!(!store.disk_has_volume(&other_disk, disk));
    }

    #[test]
    fn setters_mark_disk_dirty() {
        let mut store = store_with_disk();
        let id = store
            .insert_partition(0, primary(2048, 4096, 0x83, 0))
            .expect("insert");
        store.disk_mut(0).expect("disk").mark_clean();

        store.set_partition_type(0, id, 0x07).expect("set type");
        let disk = store.disk(0).expect("disk");
        assert!(disk.is_dirty());
        assert_eq!(disk.partition(id).expect("partition").type_code, 0x07);
    }

    #[test]
    fn numbering_skips_free_entries_and_runs_primary_then_logical() {
        let mut store = store_with_disk();
        let first = store
            .insert_partition(0, primary(2048, 2048, 0x83, 0))
            .expect("first");
        let ext = store
            .insert_partition(0, primary(8192, 65536, 0x05, 2))
            .expect("extended");
        let free = store
            .insert_partition(0, primary(4096, 2048, 0x00, 1))
            .expect("free");
        let logical = store
            .insert_partition(
                0,
                NewPartition {
                    start_sector: 10240,
                    sector_count: 2048,
                    type_code: 0x83,
                    logical: true,
                    on_disk_index: 0,
                    ebr_sector: Some(8192),
                },
            )
            .expect("logical");

        let disk = store.disk(0).expect("disk");
        let numbers = disk
            .numbered_partitions()
            .map(|(number, part)| (number, part.id))
            .collect::<Vec<_>>();
        assert_eq!(numbers, vec![(1, first), (2, ext), (3, logical)]);
        assert_eq!(disk.display_number(free), None);
        assert_eq!(disk.partition_by_number(3).map(|part| part.id), Some(logical));
        assert_eq!(disk.extended().map(|part| part.id), Some(ext));
    }

    #[test]
    fn primary_filling_a_lower_slot_takes_its_slot_number() {
        let mut store = store_with_disk();
        let first = store
            .insert_partition(0, primary(2048, 2048, 0x83, 0))
            .expect("slot 1");
        let third = store
            .insert_partition(0, primary(8192, 2048, 0x83, 2))
            .expect("slot 3");
        let second = store
            .insert_partition(0, primary(4096, 2048, 0x07, 1))
            .expect("slot 2");

        let disk = store.disk(0).expect("disk");
        let slots = disk
            .primary()
            .iter()
            .map(|part| part.on_disk_index)
            .collect::<Vec<_>>();
        assert_eq!(slots, vec![0, 1, 2]);
        assert_eq!(disk.display_number(first), Some(1));
        assert_eq!(disk.display_number(second), Some(2));
        assert_eq!(disk.display_number(third), Some(3));
    }

    #[test]
    fn removing_extended_drops_logicals() {
        let mut store = store_with_disk();
        let ext = store
            .insert_partition(0, primary(2048, 65536, 0x0f, 0))
            .expect("extended");
        store
            .insert_partition(
                0,
                NewPartition {
                    start_sector: 4096,
                    sector_count: 2048,
                    type_code: 0x83,
                    logical: true,
                    on_disk_index: 0,
                    ebr_sector: Some(2048),
                },
            )
            .expect("logical");

        let removed = store.remove_partition(0, ext).expect("remove");
        assert_eq!(removed.len(), 2);
        let disk = store.disk(0).expect("disk");
        assert!(disk.extended().is_none());
        assert_eq!(disk.partitions().count(), 0);
    }

    #[test]
    fn remove_volume_keeps_order() {
        let mut store = store_with_disk();
        for number in 0..3 {
            store.add_volume(Volume::new(number, VolumeKind::Unknown));
        }
        assert!(store.remove_volume(1).is_some());
        assert!(store.remove_volume(1).is_none());
        let numbers = store
            .volumes()
            .iter()
            .map(|volume| volume.number)
            .collect::<Vec<_>>();
        assert_eq!(numbers, vec![0, 2]);
    }
}
