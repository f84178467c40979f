//! Purpose: Build the entity store from the machine's block devices and mount table.
//! Exports: `DiscoveryConfig`, `DeviceInfo`, `DeviceSource`, `SysfsSource`, `ImageSource`,
//! `MountProvider`, `ProcMounts`, `scan`.
//! Role: Device source and volume/mount provider behind `rescan` and session start.
//! Invariants: Disk numbers follow enumeration order starting at 0.
//! Invariants: Devices that cannot be probed are skipped with a warning, never fatal.
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::device::{Access, DeviceOpener, probe_geometry};
use crate::core::error::{Error, ErrorKind};
use crate::core::model::{Disk, Extent, Volume, VolumeKind};
use crate::core::store::EntityStore;
use crate::core::table;

/// Sysfs reports partition start and size in 512-byte units whatever the sector size.
const SYSFS_UNIT: u64 = 512;
const SKIPPED_PREFIXES: [&str; 5] = ["loop", "ram", "zram", "sr", "fd"];

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveryConfig {
    /// Explicit devices or image files; when non-empty the sysfs scan is skipped.
    pub disk_paths: Vec<PathBuf>,
    pub sysfs_root: PathBuf,
    pub dev_root: PathBuf,
    pub mounts_path: PathBuf,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            disk_paths: Vec::new(),
            sysfs_root: PathBuf::from("/sys"),
            dev_root: PathBuf::from("/dev"),
            mounts_path: PathBuf::from("/proc/mounts"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub removable: bool,
}

pub trait DeviceSource {
    fn devices(&self) -> Result<Vec<DeviceInfo>, Error>;
}

/// Whole-disk block devices listed under `<sysfs>/block`.
pub struct SysfsSource {
    sysfs_root: PathBuf,
    dev_root: PathBuf,
}

impl SysfsSource {
    pub fn new(sysfs_root: impl Into<PathBuf>, dev_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            dev_root: dev_root.into(),
        }
    }
}

impl DeviceSource for SysfsSource {
    fn devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        let block_dir = self.sysfs_root.join("block");
        let entries = fs::read_dir(&block_dir).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to list block devices")
                .with_hint("Pass --disk <PATH> to name devices explicitly.")
                .with_path(&block_dir)
                .with_source(err)
        })?;

        let mut names = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !SKIPPED_PREFIXES.iter().any(|prefix| name.starts_with(prefix)))
            .collect::<Vec<_>>();
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| {
                let removable = read_sysfs_u64(&block_dir.join(&name).join("removable"))
                    .is_some_and(|value| value == 1);
                DeviceInfo {
                    path: self.dev_root.join(&name),
                    removable,
                }
            })
            .collect())
    }
}

/// A fixed list of devices or disk image files.
pub struct ImageSource {
    paths: Vec<PathBuf>,
}

impl ImageSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl DeviceSource for ImageSource {
    fn devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        Ok(self
            .paths
            .iter()
            .map(|path| DeviceInfo {
                path: path.clone(),
                removable: false,
            })
            .collect())
    }
}

/// Supplies volumes and performs unmounts.
pub trait MountProvider {
    fn volumes(&self, store: &EntityStore) -> Result<Vec<Volume>, Error>;
    fn dismount(&self, volume: &Volume) -> Result<(), Error>;
}

/// Volumes from a `/proc/mounts`-format file, mapped onto disks through sysfs.
pub struct ProcMounts {
    mounts_path: PathBuf,
    sysfs_root: PathBuf,
    dev_root: PathBuf,
}

impl ProcMounts {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            mounts_path: config.mounts_path.clone(),
            sysfs_root: config.sysfs_root.clone(),
            dev_root: config.dev_root.clone(),
        }
    }

    fn extent_for(&self, store: &EntityStore, device: &str) -> Option<(Extent, bool)> {
        for disk in store.disks() {
            let Some(disk_name) = disk.path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if disk_name == device {
                let extent = Extent {
                    disk: disk.number,
                    offset: 0,
                    length: disk.geometry.size_bytes(),
                };
                return Some((extent, disk.removable));
            }
            let part_dir = self.sysfs_root.join("block").join(disk_name).join(device);
            let (Some(start), Some(size)) = (
                read_sysfs_u64(&part_dir.join("start")),
                read_sysfs_u64(&part_dir.join("size")),
            ) else {
                continue;
            };
            let extent = Extent {
                disk: disk.number,
                offset: start * SYSFS_UNIT,
                length: size * SYSFS_UNIT,
            };
            return Some((extent, disk.removable));
        }
        None
    }

    fn label_for(&self, device: &Path) -> String {
        let by_label = self.dev_root.join("disk").join("by-label");
        let Ok(entries) = fs::read_dir(&by_label) else {
            return String::new();
        };
        let target = fs::canonicalize(device).unwrap_or_else(|_| device.to_path_buf());
        for entry in entries.filter_map(|entry| entry.ok()) {
            let Ok(resolved) = fs::canonicalize(entry.path()) else {
                continue;
            };
            if resolved == target {
                return decode_mount_field(&entry.file_name().to_string_lossy());
            }
        }
        String::new()
    }
}

impl MountProvider for ProcMounts {
    fn volumes(&self, store: &EntityStore) -> Result<Vec<Volume>, Error> {
        let contents = match fs::read_to_string(&self.mounts_path) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(path = %self.mounts_path.display(), error = %err, "mount table unreadable");
                return Ok(Vec::new());
            }
        };

        let mut volumes: Vec<Volume> = Vec::new();
        for line in contents.lines() {
            let mut fields = line.split_whitespace();
            let (Some(device), Some(mount_point), Some(filesystem)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            if !device.starts_with("/dev/") {
                continue;
            }
            let device = PathBuf::from(decode_mount_field(device));
            if volumes
                .iter()
                .any(|volume| volume.device.as_deref() == Some(device.as_path()))
            {
                continue;
            }
            let resolved = fs::canonicalize(&device).unwrap_or_else(|_| device.clone());
            let name = resolved
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();

            let number = volumes.len() as u32;
            let mut volume = if name.starts_with("sr") {
                Volume::new(number, VolumeKind::Optical)
            } else {
                match self.extent_for(store, &name) {
                    Some((extent, removable)) => {
                        let kind = if removable {
                            VolumeKind::Removable
                        } else {
                            VolumeKind::Partition
                        };
                        let mut volume = Volume::new(number, kind);
                        volume.size = extent.length;
                        volume.extents.push(extent);
                        volume
                    }
                    None => Volume::new(number, VolumeKind::Unknown),
                }
            };
            volume.filesystem = filesystem.to_string();
            volume.label = self.label_for(&device);
            volume.mount_point = Some(PathBuf::from(decode_mount_field(mount_point)));
            volume.device = Some(device);
            volumes.push(volume);
        }
        tracing::debug!(count = volumes.len(), "loaded volumes");
        Ok(volumes)
    }

    fn dismount(&self, volume: &Volume) -> Result<(), Error> {
        let Some(mount_point) = &volume.mount_point else {
            return Ok(());
        };
        unmount(mount_point)?;
        tracing::info!(volume = volume.number, mount_point = %mount_point.display(), "dismounted volume");
        Ok(())
    }
}

#[cfg(unix)]
fn unmount(mount_point: &Path) -> Result<(), Error> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let target = CString::new(mount_point.as_os_str().as_bytes()).map_err(|err| {
        Error::new(ErrorKind::InvalidArgument)
            .with_message("mount point contains a NUL byte")
            .with_path(mount_point)
            .with_source(err)
    })?;
    // SAFETY: `target` is a valid NUL-terminated path for the duration of the call.
    let rc = unsafe { libc::umount(target.as_ptr()) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    let kind = match err.raw_os_error() {
        Some(libc::EBUSY) => ErrorKind::Busy,
        Some(libc::EPERM) | Some(libc::EACCES) => ErrorKind::Permission,
        Some(libc::EINVAL) | Some(libc::ENOENT) => return Ok(()),
        _ => ErrorKind::Io,
    };
    Err(Error::new(kind)
        .with_message("Failed to unmount volume.")
        .with_path(mount_point)
        .with_source(err))
}

#[cfg(not(unix))]
fn unmount(mount_point: &Path) -> Result<(), Error> {
    Err(Error::new(ErrorKind::Unsupported)
        .with_message("unmount is not supported on this platform")
        .with_path(mount_point))
}

/// Scans devices and volumes into a fresh entity store.
pub fn scan(
    config: &DiscoveryConfig,
    opener: &dyn DeviceOpener,
    mounts: &dyn MountProvider,
) -> Result<EntityStore, Error> {
    let devices = if config.disk_paths.is_empty() {
        SysfsSource::new(&config.sysfs_root, &config.dev_root).devices()?
    } else {
        ImageSource::new(config.disk_paths.clone()).devices()?
    };

    let mut store = EntityStore::new();
    let mut number = 0u32;
    for info in devices {
        match load_disk(&mut store, opener, number, &info) {
            Ok(()) => number += 1,
            Err(err) if !config.disk_paths.is_empty() => return Err(err),
            Err(err) => {
                tracing::warn!(path = %info.path.display(), error = %err, "skipping device");
            }
        }
    }

    for volume in mounts.volumes(&store)? {
        store.add_volume(volume);
    }
    tracing::debug!(
        disks = store.disks().len(),
        volumes = store.volumes().len(),
        "scan complete"
    );
    Ok(store)
}

fn load_disk(
    store: &mut EntityStore,
    opener: &dyn DeviceOpener,
    number: u32,
    info: &DeviceInfo,
) -> Result<(), Error> {
    let geometry = probe_geometry(&info.path)?;
    let mut device = opener.open(&info.path, Access::Read)?;
    let mut next_id = || store.allocate_partition_id();
    let loaded = table::load_table(
        device.as_mut(),
        number,
        geometry.bytes_per_sector,
        &mut next_id,
    )
    .map_err(|err| err.with_path(&info.path))?;

    let mut disk = Disk::new(number, &info.path, geometry);
    disk.table = loaded.kind;
    disk.signature = loaded.signature;
    disk.removable = info.removable;
    store.add_disk(disk);
    store.replace_partitions(number, loaded.primary, loaded.logical)
}

fn read_sysfs_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Decodes the octal escapes (`\040` and friends) used by the mount table and udev links.
fn decode_mount_field(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'\\' {
            if let Some((value, used)) = decode_escape(&bytes[index + 1..]) {
                out.push(value);
                index += 1 + used;
                continue;
            }
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn decode_escape(rest: &[u8]) -> Option<(u8, usize)> {
    let digit = |byte: u8, radix: u32| char::from(byte).to_digit(radix);
    match rest {
        [b'x', high, low, ..] => {
            let value = digit(*high, 16)? * 16 + digit(*low, 16)?;
            Some((u8::try_from(value).ok()?, 3))
        }
        [a, b, c, ..] => {
            let value = digit(*a, 8)? * 64 + digit(*b, 8)? * 8 + digit(*c, 8)?;
            Some((u8::try_from(value).ok()?, 3))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{
        DeviceSource, DiscoveryConfig, MountProvider, ProcMounts, SysfsSource, decode_mount_field,
        scan,
    };
    use crate::core::device::FileOpener;
    use crate::core::model::{Disk, Geometry, TableKind, VolumeKind};
    use crate::core::store::EntityStore;

    #[test]
    fn sysfs_source_skips_virtual_devices_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let block = dir.path().join("sys").join("block");
        for name in ["sdb", "loop0", "sda", "sr0", "nvme0n1"] {
            fs::create_dir_all(block.join(name)).expect("mkdir");
        }
        fs::write(block.join("sdb").join("removable"), "1\n").expect("write");

        let source = SysfsSource::new(dir.path().join("sys"), "/dev");
        let devices = source.devices().expect("devices");
        let paths = devices
            .iter()
            .map(|info| info.path.display().to_string())
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["/dev/nvme0n1", "/dev/sda", "/dev/sdb"]);
        assert!(devices[2].removable);
        assert!(!devices[1].removable);
    }

    #[test]
    fn mounts_map_partitions_through_sysfs_extents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let part = dir.path().join("sys").join("block").join("sda").join("sda1");
        fs::create_dir_all(&part).expect("mkdir");
        fs::write(part.join("start"), "2048\n").expect("start");
        fs::write(part.join("size"), "4096\n").expect("size");
        let mounts = dir.path().join("mounts");
        fs::write(
            &mounts,
            "proc /proc proc rw 0 0\n\
             /dev/sda1 /mnt/my\\040data ext4 rw 0 0\n\
             /dev/sda1 /mnt/bind ext4 rw 0 0\n\
             /dev/sr0 /media/cd iso9660 ro 0 0\n\
             /dev/mapper/other /srv xfs rw 0 0\n",
        )
        .expect("mounts");

        let config = DiscoveryConfig {
            disk_paths: Vec::new(),
            sysfs_root: dir.path().join("sys"),
            dev_root: dir.path().join("dev"),
            mounts_path: mounts,
        };
        let mut store = EntityStore::new();
        store.add_disk(Disk::new(0, "/dev/sda", Geometry::from_sectors(512, 1 << 20)));

        let volumes = ProcMounts::new(&config).volumes(&store).expect("volumes");
        assert_eq!(volumes.len(), 3);
        assert_eq!(volumes[0].kind, VolumeKind::Partition);
        assert_eq!(volumes[0].filesystem, "ext4");
        assert_eq!(volumes[0].extents[0].offset, 2048 * 512);
        assert_eq!(volumes[0].extents[0].length, 4096 * 512);
        assert_eq!(
            volumes[0].mount_point.as_deref(),
            Some(std::path::Path::new("/mnt/my data"))
        );
        assert_eq!(volumes[1].kind, VolumeKind::Optical);
        assert_eq!(volumes[2].kind, VolumeKind::Unknown);
        assert!(volumes[2].extents.is_empty());
    }

    #[test]
    fn scan_loads_explicit_images_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut paths = Vec::new();
        for name in ["a.img", "b.img"] {
            let path = dir.path().join(name);
            fs::write(&path, vec![0u8; 4 * 1024 * 1024]).expect("image");
            paths.push(path);
        }
        let mounts = dir.path().join("mounts");
        fs::write(&mounts, "").expect("mounts");
        let config = DiscoveryConfig {
            disk_paths: paths.clone(),
            mounts_path: mounts,
            ..DiscoveryConfig::default()
        };

        let store = scan(&config, &FileOpener, &ProcMounts::new(&config)).expect("scan");
        assert_eq!(store.disks().len(), 2);
        assert_eq!(store.disks()[1].number, 1);
        assert_eq!(store.disks()[1].path, paths[1]);
        assert_eq!(store.disks()[0].table, TableKind::None);
        assert_eq!(store.disks()[0].geometry.sector_count, 8192);
        assert!(store.volumes().is_empty());
    }

    #[test]
    fn missing_explicit_image_fails_the_scan() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = DiscoveryConfig {
            disk_paths: vec![dir.path().join("missing.img")],
            mounts_path: dir.path().join("mounts"),
            ..DiscoveryConfig::default()
        };
        assert!(scan(&config, &FileOpener, &ProcMounts::new(&config)).is_err());
    }

    #[test]
    fn mount_fields_decode_octal_and_hex_escapes() {
        assert_eq!(decode_mount_field("/mnt/a\\040b"), "/mnt/a b");
        assert_eq!(decode_mount_field("My\\x20Disk"), "My Disk");
        assert_eq!(decode_mount_field("plain"), "plain");
    }
}
