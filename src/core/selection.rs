//! Purpose: Track the current disk, partition and volume of a session.
//! Exports: `Selection`.
//! Role: Every transition is validated against the entity store it is given.
//! Invariants: Selecting a disk clears the current partition.
//! Invariants: Disk/partition and volume selections never affect each other.
//! Invariants: Failed transitions leave the selection unchanged.
use crate::core::error::{Error, ErrorKind};
use crate::core::model::{Disk, Partition, PartitionId, Volume};
use crate::core::store::EntityStore;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Selection {
    disk: Option<u32>,
    partition: Option<PartitionId>,
    volume: Option<u32>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disk(&self) -> Option<u32> {
        self.disk
    }

    pub fn partition(&self) -> Option<PartitionId> {
        self.partition
    }

    pub fn volume(&self) -> Option<u32> {
        self.volume
    }

    pub fn select_disk(&mut self, store: &EntityStore, number: u32) -> Result<(), Error> {
        if store.disk(number).is_none() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("Disk not found.")
                .with_disk(number));
        }
        self.disk = Some(number);
        self.partition = None;
        Ok(())
    }

    /// Selects the head of the disk list.
    pub fn select_system(&mut self, store: &EntityStore) -> Result<(), Error> {
        let first = store
            .disks()
            .first()
            .ok_or_else(|| Error::new(ErrorKind::NotFound).with_message("No disks found."))?;
        self.disk = Some(first.number);
        self.partition = None;
        Ok(())
    }

    /// Advances to the next disk in enumeration order.
    ///
    /// Walking past the last disk clears disk and partition and returns
    /// `ErrorKind::EndOfEnumeration`; with no current disk the walk has not
    /// started and `ErrorKind::NoSelection` is returned instead.
    pub fn select_next(&mut self, store: &EntityStore) -> Result<(), Error> {
        let Some(current) = self.disk else {
            return Err(Error::new(ErrorKind::NoSelection)
                .with_message("Disk enumeration has not been started."));
        };
        let disks = store.disks();
        let position = disks.iter().position(|disk| disk.number == current);
        let next = position.and_then(|index| disks.get(index + 1));
        match next {
            Some(disk) => {
                self.disk = Some(disk.number);
                self.partition = None;
                Ok(())
            }
            None => {
                self.disk = None;
                self.partition = None;
                Err(Error::new(ErrorKind::EndOfEnumeration)
                    .with_message("Disk enumeration finished."))
            }
        }
    }

    pub fn select_partition(&mut self, store: &EntityStore, number: u32) -> Result<(), Error> {
        let disk = self.current_disk(store)?;
        let partition = disk.partition_by_number(number).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("Partition not found.")
                .with_disk(disk.number)
        })?;
        self.partition = Some(partition.id);
        Ok(())
    }

    /// Makes `id` current; used after a create.
    pub fn set_partition(&mut self, id: PartitionId) {
        self.partition = Some(id);
    }

    pub fn select_volume(&mut self, store: &EntityStore, number: u32) -> Result<(), Error> {
        if store.volume(number).is_none() {
            return Err(Error::new(ErrorKind::NotFound).with_message("Volume not found."));
        }
        self.volume = Some(number);
        Ok(())
    }

    pub fn current_disk<'a>(&self, store: &'a EntityStore) -> Result<&'a Disk, Error> {
        self.disk
            .and_then(|number| store.disk(number))
            .ok_or_else(|| {
                Error::new(ErrorKind::NoSelection)
                    .with_message("No disk selected.")
                    .with_hint("Select a disk with \"select disk <N>\".")
            })
    }

    pub fn current_partition<'a>(&self, store: &'a EntityStore) -> Result<&'a Partition, Error> {
        let disk = self.current_disk(store)?;
        self.partition
            .and_then(|id| disk.partition(id))
            .ok_or_else(|| {
                Error::new(ErrorKind::NoSelection)
                    .with_message("No partition selected.")
                    .with_hint("Select a partition with \"select partition <N>\".")
                    .with_disk(disk.number)
            })
    }

    pub fn current_volume<'a>(&self, store: &'a EntityStore) -> Result<&'a Volume, Error> {
        self.volume
            .and_then(|number| store.volume(number))
            .ok_or_else(|| {
                Error::new(ErrorKind::NoSelection)
                    .with_message("No volume selected.")
                    .with_hint("Select a volume with \"select volume <N>\".")
            })
    }

    /// Drops the partition selection if it named one of `removed`.
    pub fn forget_partitions(&mut self, removed: &[Partition]) {
        if let Some(id) = self.partition {
            if removed.iter().any(|part| part.id == id) {
                self.partition = None;
            }
        }
    }

    pub fn forget_volume(&mut self, number: u32) {
        if self.volume == Some(number) {
            self.volume = None;
        }
    }

    pub fn clear_partition(&mut self) {
        self.partition = None;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
