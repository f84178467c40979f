//! Purpose: Define the Disk, Partition and Volume entities held by the entity store.
//! Exports: `Disk`, `Partition`, `PartitionId`, `Geometry`, `TableKind`, `Volume`,
//! `VolumeKind`, `Extent`.
//! Role: Plain data; relationships are expressed as disk numbers and partition ids.
//! Invariants: A Disk owns its partitions; a Partition only names its disk by number.
//! Invariants: Type code 0 marks unallocated space and never gets a display number.
use std::path::{Path, PathBuf};

use crate::core::mbr;

/// Stable identity of a partition inside one entity store.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PartitionId(pub(crate) u64);

impl PartitionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableKind {
    /// No recognizable partition table (blank or unreadable device).
    None,
    Mbr,
    Gpt,
}

impl TableKind {
    pub fn label(self) -> &'static str {
        match self {
            TableKind::None => "none",
            TableKind::Mbr => "MBR",
            TableKind::Gpt => "GPT",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sector_count: u64,
    pub cylinders: u64,
    pub tracks_per_cylinder: u32,
    pub sectors_per_track: u32,
}

impl Geometry {
    pub const HEADS: u32 = 255;
    pub const SECTORS_PER_TRACK: u32 = 63;

    /// Builds a geometry with the conventional 255/63 translation.
    pub fn from_sectors(bytes_per_sector: u32, sector_count: u64) -> Self {
        let per_cylinder = u64::from(Self::HEADS) * u64::from(Self::SECTORS_PER_TRACK);
        Self {
            bytes_per_sector,
            sector_count,
            cylinders: sector_count / per_cylinder,
            tracks_per_cylinder: Self::HEADS,
            sectors_per_track: Self::SECTORS_PER_TRACK,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.sector_count * u64::from(self.bytes_per_sector)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Partition {
    pub id: PartitionId,
    /// Number of the disk whose sequence owns this partition.
    pub disk: u32,
    pub start_sector: u64,
    pub sector_count: u64,
    pub type_code: u8,
    pub boot: bool,
    pub logical: bool,
    pub partitioned: bool,
    /// Slot index in sector 0 for primaries, chain position for logicals.
    pub on_disk_index: usize,
    /// Sector holding the EBR that describes a logical partition.
    pub ebr_sector: Option<u64>,
}

impl Partition {
    pub fn end_sector(&self) -> u64 {
        self.start_sector + self.sector_count.saturating_sub(1)
    }

    pub fn is_container(&self) -> bool {
        mbr::is_container_type(self.type_code)
    }

    /// Primary, non-container partition: the only kind that may carry the boot flag.
    pub fn is_normal(&self) -> bool {
        !self.logical && !self.is_container() && self.type_code != 0
    }

    pub fn kind_label(&self) -> &'static str {
        if self.logical {
            "Logical"
        } else if self.is_container() {
            "Extended"
        } else {
            "Primary"
        }
    }

    pub fn offset_bytes(&self, bytes_per_sector: u32) -> u64 {
        self.start_sector * u64::from(bytes_per_sector)
    }

    pub fn size_bytes(&self, bytes_per_sector: u32) -> u64 {
        self.sector_count * u64::from(bytes_per_sector)
    }
}

#[derive(Clone, Debug)]
pub struct Disk {
    pub number: u32,
    pub path: PathBuf,
    pub geometry: Geometry,
    pub table: TableKind,
    pub signature: u32,
    pub removable: bool,
    pub(crate) primary: Vec<Partition>,
    pub(crate) logical: Vec<Partition>,
    pub(crate) extended: Option<PartitionId>,
    dirty: bool,
}

impl Disk {
    pub fn new(number: u32, path: impl Into<PathBuf>, geometry: Geometry) -> Self {
        Self {
            number,
            path: path.into(),
            geometry,
            table: TableKind::None,
            signature: 0,
            removable: false,
            primary: Vec::new(),
            logical: Vec::new(),
            extended: None,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn primary(&self) -> &[Partition] {
        &self.primary
    }

    pub fn logical(&self) -> &[Partition] {
        &self.logical
    }

    pub fn extended(&self) -> Option<&Partition> {
        let id = self.extended?;
        self.primary.iter().find(|part| part.id == id)
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.primary.iter().chain(self.logical.iter())
    }

    pub fn partition(&self, id: PartitionId) -> Option<&Partition> {
        self.partitions().find(|part| part.id == id)
    }

    pub(crate) fn partition_mut(&mut self, id: PartitionId) -> Option<&mut Partition> {
        self.primary
            .iter_mut()
            .chain(self.logical.iter_mut())
            .find(|part| part.id == id)
    }

    /// Yields `(display_number, partition)` for every entry with a non-zero type,
    /// primaries first, then logicals, in collection order. Never cached.
    pub fn numbered_partitions(&self) -> impl Iterator<Item = (u32, &Partition)> {
        self.partitions()
            .filter(|part| part.type_code != 0)
            .zip(1u32..)
            .map(|(part, number)| (number, part))
    }

    pub fn partition_by_number(&self, number: u32) -> Option<&Partition> {
        self.numbered_partitions()
            .find(|(candidate, _)| *candidate == number)
            .map(|(_, part)| part)
    }

    pub fn display_number(&self, id: PartitionId) -> Option<u32> {
        self.numbered_partitions()
            .find(|(_, part)| part.id == id)
            .map(|(number, _)| number)
    }

    /// Primary slots in use, extended container included.
    pub fn used_slots(&self) -> usize {
        self.primary.iter().filter(|part| part.partitioned).count()
    }

    pub fn free_slot(&self) -> Option<usize> {
        (0..mbr::SLOT_COUNT).find(|slot| {
            !self
                .primary
                .iter()
                .any(|part| part.partitioned && part.on_disk_index == *slot)
        })
    }

    pub fn active_partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions().filter(|part| part.boot)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VolumeKind {
    Optical,
    Partition,
    Removable,
    Unknown,
}

impl VolumeKind {
    pub fn label(self) -> &'static str {
        match self {
            VolumeKind::Optical => "DVD",
            VolumeKind::Partition => "Partition",
            VolumeKind::Removable => "Removable",
            VolumeKind::Unknown => "Unknown",
        }
    }
}

/// A byte range of one disk backing (part of) a volume.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Extent {
    pub disk: u32,
    pub offset: u64,
    pub length: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Volume {
    pub number: u32,
    pub letter: Option<char>,
    pub label: String,
    pub filesystem: String,
    pub kind: VolumeKind,
    pub size: u64,
    pub extents: Vec<Extent>,
    pub device: Option<PathBuf>,
    pub mount_point: Option<PathBuf>,
}

impl Volume {
    pub fn new(number: u32, kind: VolumeKind) -> Self {
        Self {
            number,
            letter: None,
            label: String::new(),
            filesystem: String::new(),
            kind,
            size: 0,
            extents: Vec::new(),
            device: None,
            mount_point: None,
        }
    }
}
