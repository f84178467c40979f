// 512-byte MBR/EBR sector codec: boot code, four 16-byte entries, 0x55AA signature.
use crate::core::error::{Error, ErrorKind};

pub const SECTOR_SIZE: usize = 512;
pub const TABLE_OFFSET: usize = 446;
pub const ENTRY_SIZE: usize = 16;
pub const SLOT_COUNT: usize = 4;
pub const DISK_ID_OFFSET: usize = 440;
pub const SIGNATURE_OFFSET: usize = 510;
pub const SIGNATURE: [u8; 2] = [0x55, 0xAA];

pub const TYPE_EMPTY: u8 = 0x00;
pub const TYPE_EXTENDED: u8 = 0x05;
pub const TYPE_EXTENDED_LBA: u8 = 0x0F;
pub const TYPE_LINUX_EXTENDED: u8 = 0x85;
pub const TYPE_RESERVED: u8 = 0x42;
pub const TYPE_GPT_PROTECTIVE: u8 = 0xEE;
pub const TYPE_LINUX: u8 = 0x83;

const BOOT_ACTIVE: u8 = 0x80;
const CHS_SATURATED: [u8; 3] = [0xFE, 0xFF, 0xFF];

pub fn is_container_type(type_code: u8) -> bool {
    matches!(
        type_code,
        TYPE_EXTENDED | TYPE_EXTENDED_LBA | TYPE_LINUX_EXTENDED
    )
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MbrEntry {
    pub boot: bool,
    pub chs_start: [u8; 3],
    pub type_code: u8,
    pub chs_end: [u8; 3],
    pub lba_start: u32,
    pub sector_count: u32,
}

impl MbrEntry {
    /// Builds an entry for an LBA range, deriving CHS with 255 heads / 63 sectors.
    pub fn for_range(boot: bool, type_code: u8, lba_start: u64, sector_count: u64) -> Result<Self, Error> {
        let start = u32::try_from(lba_start).map_err(|_| out_of_range("start sector", lba_start))?;
        let count =
            u32::try_from(sector_count).map_err(|_| out_of_range("sector count", sector_count))?;
        let last = lba_start + sector_count.saturating_sub(1);
        Ok(Self {
            boot,
            chs_start: lba_to_chs(lba_start),
            type_code,
            chs_end: lba_to_chs(last),
            lba_start: start,
            sector_count: count,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.type_code == TYPE_EMPTY && self.sector_count == 0
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            boot: buf[0] & BOOT_ACTIVE != 0,
            chs_start: [buf[1], buf[2], buf[3]],
            type_code: buf[4],
            chs_end: [buf[5], buf[6], buf[7]],
            lba_start: u32::from_le_bytes(read_4(buf, 8)),
            sector_count: u32::from_le_bytes(read_4(buf, 12)),
        }
    }

    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[0] = if self.boot { BOOT_ACTIVE } else { 0 };
        buf[1..4].copy_from_slice(&self.chs_start);
        buf[4] = self.type_code;
        buf[5..8].copy_from_slice(&self.chs_end);
        buf[8..12].copy_from_slice(&self.lba_start.to_le_bytes());
        buf[12..16].copy_from_slice(&self.sector_count.to_le_bytes());
        buf
    }
}

/// One raw boot sector (MBR or EBR).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootSector {
    raw: [u8; SECTOR_SIZE],
}

impl BootSector {
    pub fn zeroed() -> Self {
        Self {
            raw: [0u8; SECTOR_SIZE],
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < SECTOR_SIZE {
            return Err(Error::new(ErrorKind::Corrupt).with_message("boot sector too small"));
        }
        let mut raw = [0u8; SECTOR_SIZE];
        raw.copy_from_slice(&buf[..SECTOR_SIZE]);
        Ok(Self { raw })
    }

    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        &self.raw
    }

    pub fn has_signature(&self) -> bool {
        self.raw[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2] == SIGNATURE
    }

    pub fn set_signature(&mut self) {
        self.raw[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2].copy_from_slice(&SIGNATURE);
    }

    pub fn disk_id(&self) -> u32 {
        u32::from_le_bytes(read_4(&self.raw, DISK_ID_OFFSET))
    }

    pub fn set_disk_id(&mut self, id: u32) {
        self.raw[DISK_ID_OFFSET..DISK_ID_OFFSET + 4].copy_from_slice(&id.to_le_bytes());
    }

    pub fn entry(&self, slot: usize) -> MbrEntry {
        let offset = entry_offset(slot);
        MbrEntry::decode(&self.raw[offset..offset + ENTRY_SIZE])
    }

    pub fn entries(&self) -> [MbrEntry; SLOT_COUNT] {
        [self.entry(0), self.entry(1), self.entry(2), self.entry(3)]
    }

    pub fn set_entry(&mut self, slot: usize, entry: &MbrEntry) {
        let offset = entry_offset(slot);
        self.raw[offset..offset + ENTRY_SIZE].copy_from_slice(&entry.encode());
    }

    /// Zero-fills the 16 bytes of one slot, leaving every other byte untouched.
    pub fn clear_entry(&mut self, slot: usize) {
        let offset = entry_offset(slot);
        self.raw[offset..offset + ENTRY_SIZE].fill(0);
    }

    pub fn clear_table(&mut self) {
        self.raw[TABLE_OFFSET..TABLE_OFFSET + SLOT_COUNT * ENTRY_SIZE].fill(0);
    }

    pub fn is_gpt_protective(&self) -> bool {
        self.entries()
            .iter()
            .any(|entry| entry.type_code == TYPE_GPT_PROTECTIVE)
    }
}

fn entry_offset(slot: usize) -> usize {
    assert!(slot < SLOT_COUNT, "mbr slot out of range");
    TABLE_OFFSET + slot * ENTRY_SIZE
}

/// CHS triple for an LBA using 255 heads and 63 sectors per track.
pub fn lba_to_chs(lba: u64) -> [u8; 3] {
    let heads = 255u64;
    let sectors = 63u64;
    let cylinder = lba / (heads * sectors);
    if cylinder > 1023 {
        return CHS_SATURATED;
    }
    let head = (lba / sectors) % heads;
    let sector = (lba % sectors) + 1;
    [
        head as u8,
        (sector as u8) | (((cylinder >> 2) & 0xC0) as u8),
        (cylinder & 0xFF) as u8,
    ]
}

fn read_4(buf: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    out
}

fn out_of_range(what: &str, value: u64) -> Error {
    Error::new(ErrorKind::InvalidArgument)
        .with_message(format!("{what} {value} exceeds MBR addressing"))
        .with_hint("MBR tables address at most 2^32 sectors.")
}
