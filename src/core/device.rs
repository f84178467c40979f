//! Purpose: Blocking sector I/O against block devices and disk image files.
//! Exports: `BlockDevice`, `DeviceOpener`, `Access`, `FileDevice`, `FileOpener`, `probe_geometry`.
//! Role: The only place that touches device file descriptors.
//! Invariants: A handle holds an fs2 advisory lock (exclusive for writes) until dropped.
//! Invariants: Write failures map to `ErrorKind::Write`, flush failures to `ErrorKind::Sync`.
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use libc::{EACCES, EPERM};

use crate::core::error::{Error, ErrorKind};
use crate::core::model::Geometry;

const DEFAULT_SECTOR_SIZE: u32 = 512;

#[cfg(target_os = "linux")]
mod ioctl {
    pub const BLKRRPART: u64 = 0x125F;
    pub const BLKSSZGET: u64 = 0x1268;
    pub const BLKGETSIZE64: u64 = 0x8008_1272;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    ReadWrite,
}

/// Positioned, blocking sector I/O on one opened device.
pub trait BlockDevice {
    fn path(&self) -> &Path;
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Error>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), Error>;
    fn sync(&mut self) -> Result<(), Error>;
    /// Asks the kernel to re-read the partition table. Best effort for callers.
    fn reread_partitions(&mut self) -> Result<(), Error>;
}

/// Opens devices by path; the seam tests use to inject failing devices.
pub trait DeviceOpener {
    fn open(&self, path: &Path, access: Access) -> Result<Box<dyn BlockDevice>, Error>;
}

pub struct FileDevice {
    path: PathBuf,
    file: File,
    is_block: bool,
}

impl FileDevice {
    pub fn open(path: impl AsRef<Path>, access: Access) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(access == Access::ReadWrite)
            .open(&path)
            .map_err(|err| {
                Error::new(open_error_kind(&err))
                    .with_message("failed to open device")
                    .with_path(&path)
                    .with_source(err)
            })?;

        let lock = match access {
            Access::Read => FileExt::lock_shared(&file),
            Access::ReadWrite => FileExt::lock_exclusive(&file),
        };
        lock.map_err(|err| {
            Error::new(open_error_kind(&err))
                .with_message("failed to lock device")
                .with_path(&path)
                .with_source(err)
        })?;

        let is_block = is_block_device(&file);
        tracing::debug!(path = %path.display(), ?access, is_block, "opened device");
        Ok(Self {
            path,
            file,
            is_block,
        })
    }
}

impl Drop for FileDevice {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl BlockDevice for FileDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(buf))
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read device")
                    .with_path(&self.path)
                    .with_offset(offset)
                    .with_source(err)
            })
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), Error> {
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(buf))
            .map_err(|err| {
                Error::new(ErrorKind::Write)
                    .with_message("failed to write partition table")
                    .with_path(&self.path)
                    .with_offset(offset)
                    .with_source(err)
            })
    }

    fn sync(&mut self) -> Result<(), Error> {
        self.file.sync_all().map_err(|err| {
            Error::new(ErrorKind::Sync)
                .with_message("failed to flush device")
                .with_hint("The table was written but may not be durable; retry the command.")
                .with_path(&self.path)
                .with_source(err)
        })
    }

    fn reread_partitions(&mut self) -> Result<(), Error> {
        if !self.is_block {
            return Ok(());
        }
        reread_partition_table(&self.file).map_err(|err| {
            Error::new(ErrorKind::Busy)
                .with_message("kernel did not re-read the partition table")
                .with_hint("The new table is on disk; reboot or run partprobe to load it.")
                .with_path(&self.path)
                .with_source(err)
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FileOpener;

impl DeviceOpener for FileOpener {
    fn open(&self, path: &Path, access: Access) -> Result<Box<dyn BlockDevice>, Error> {
        Ok(Box::new(FileDevice::open(path, access)?))
    }
}

/// Reads sector size and sector count of a block device or image file.
pub fn probe_geometry(path: &Path) -> Result<Geometry, Error> {
    let file = File::open(path).map_err(|err| {
        Error::new(open_error_kind(&err))
            .with_message("failed to open device")
            .with_path(path)
            .with_source(err)
    })?;
    let map_io = |err: io::Error| {
        Error::new(ErrorKind::Io)
            .with_message("failed to probe device geometry")
            .with_path(path)
            .with_source(err)
    };

    let (bytes_per_sector, size) = if is_block_device(&file) {
        block_device_size(&file).map_err(map_io)?
    } else {
        let len = file.metadata().map_err(map_io)?.len();
        (DEFAULT_SECTOR_SIZE, len)
    };
    if bytes_per_sector == 0 {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message("device reports zero sector size")
            .with_path(path));
    }
    Ok(Geometry::from_sectors(
        bytes_per_sector,
        size / u64::from(bytes_per_sector),
    ))
}

fn open_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

#[cfg(unix)]
fn is_block_device(file: &File) -> bool {
    use std::os::unix::fs::FileTypeExt;
    file.metadata()
        .map(|meta| meta.file_type().is_block_device())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_block_device(_file: &File) -> bool {
    false
}

#[cfg(target_os = "linux")]
fn block_device_size(file: &File) -> io::Result<(u32, u64)> {
    use std::os::fd::AsRawFd;

    let fd = file.as_raw_fd();
    let mut sector_size: libc::c_int = 0;
    let mut size: u64 = 0;
    // SAFETY: both requests write a single integer through the pointer we pass.
    unsafe {
        if libc::ioctl(fd, ioctl::BLKSSZGET as _, &mut sector_size) < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::ioctl(fd, ioctl::BLKGETSIZE64 as _, &mut size) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok((sector_size as u32, size))
}

#[cfg(not(target_os = "linux"))]
fn block_device_size(file: &File) -> io::Result<(u32, u64)> {
    let mut handle = file;
    let size = handle.seek(SeekFrom::End(0))?;
    Ok((DEFAULT_SECTOR_SIZE, size))
}

#[cfg(target_os = "linux")]
fn reread_partition_table(file: &File) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: BLKRRPART takes no argument.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), ioctl::BLKRRPART as _) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn reread_partition_table(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Access, BlockDevice, FileDevice, open_error_kind, probe_geometry};
    use crate::core::error::ErrorKind;

    #[test]
    fn image_file_geometry_uses_512_byte_sectors() {
        let file = tempfile::NamedTempFile::new().expect("temp");
        file.as_file().set_len(8 * 1024 * 1024).expect("len");
        let geometry = probe_geometry(file.path()).expect("geometry");
        assert_eq!(geometry.bytes_per_sector, 512);
        assert_eq!(geometry.sector_count, 16384);
    }

    #[test]
    fn write_then_read_roundtrips_and_reread_is_noop_for_images() {
        let file = tempfile::NamedTempFile::new().expect("temp");
        file.as_file().set_len(4096).expect("len");
        let mut device = FileDevice::open(file.path(), Access::ReadWrite).expect("open");
        device.write_at(1024, &[7u8; 512]).expect("write");
        device.sync().expect("sync");
        device.reread_partitions().expect("reread");

        let mut buf = [0u8; 512];
        device.read_at(1024, &mut buf).expect("read");
        assert!(buf.iter().all(|b| *b == 7));
    }

    #[test]
    fn short_read_is_io_error() {
        let file = tempfile::NamedTempFile::new().expect("temp");
        file.as_file().set_len(100).expect("len");
        let mut device = FileDevice::open(file.path(), Access::Read).expect("open");
        let mut buf = [0u8; 512];
        let err = device.read_at(0, &mut buf).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.offset(), Some(0));
    }

    #[test]
    fn open_errors_map_to_expected_kinds() {
        let err = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(open_error_kind(&err), ErrorKind::Permission);

        let err = std::io::Error::from_raw_os_error(libc::ENOENT);
        assert_eq!(open_error_kind(&err), ErrorKind::NotFound);

        let err = std::io::Error::from_raw_os_error(libc::EAGAIN);
        assert_eq!(open_error_kind(&err), ErrorKind::Busy);

        let err = std::io::Error::from_raw_os_error(libc::EIO);
        assert_eq!(open_error_kind(&err), ErrorKind::Io);
    }

    #[test]
    fn missing_device_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = FileDevice::open(dir.path().join("nope.img"), Access::Read)
            .err()
            .expect("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
