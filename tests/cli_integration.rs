// CLI integration tests: scripts run against disk image files.
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;
const SLOT_BASE: usize = 446;
const SLOT_SIZE: usize = 16;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_diskpart");
    Command::new(exe)
}

struct Images {
    dir: TempDir,
    disks: Vec<PathBuf>,
}

fn images(sizes_mb: &[u64]) -> Images {
    let dir = tempfile::tempdir().expect("tempdir");
    let disks = sizes_mb
        .iter()
        .enumerate()
        .map(|(index, size)| {
            let path = dir.path().join(format!("disk{index}.img"));
            let file = fs::File::create(&path).expect("create image");
            file.set_len(size * MIB).expect("size image");
            path
        })
        .collect();
    fs::write(dir.path().join("mounts"), "").expect("mounts");
    Images { dir, disks }
}

fn run_script(images: &Images, script: &str) -> Output {
    let script_path = images.dir.path().join("script.txt");
    fs::write(&script_path, script).expect("script");
    let mut command = cmd();
    for disk in &images.disks {
        command.arg("--disk").arg(disk);
    }
    command
        .arg("--mounts")
        .arg(images.dir.path().join("mounts"))
        .arg("--sysfs-root")
        .arg(images.dir.path())
        .arg("-s")
        .arg(&script_path)
        .output()
        .expect("run diskpart")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn sector_zero(path: &Path) -> Vec<u8> {
    let bytes = fs::read(path).expect("read image");
    bytes[..512].to_vec()
}

fn slot(sector: &[u8], index: usize) -> &[u8] {
    let start = SLOT_BASE + index * SLOT_SIZE;
    &sector[start..start + SLOT_SIZE]
}

fn le32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(bytes.try_into().expect("4 bytes"))
}

#[test]
fn create_primary_writes_aligned_slot() {
    let images = images(&[256]);
    let output = run_script(&images, "select disk 0\ncreate partition primary size=100\n");
    assert!(output.status.success(), "{}", stdout(&output));
    assert!(stdout(&output).contains("DiskPart succeeded in creating the specified partition."));

    let sector = sector_zero(&images.disks[0]);
    assert_eq!(&sector[510..512], &[0x55, 0xAA]);
    let entry = slot(&sector, 0);
    assert_eq!(entry[0], 0x00);
    assert_eq!(entry[4], 0x83);
    assert_eq!(le32(&entry[8..12]), 2048);
    assert_eq!(le32(&entry[12..16]), 204_800);
    assert!(slot(&sector, 1).iter().all(|b| *b == 0));
    assert_ne!(le32(&sector[440..444]), 0, "fresh disk signature");
}

#[test]
fn delete_slot_zero_fills_only_that_entry() {
    let images = images(&[128]);
    let output = run_script(
        &images,
        "select disk 0\n\
         create primary size=10\n\
         create primary size=10\n\
         create primary size=10\n",
    );
    assert!(output.status.success(), "{}", stdout(&output));
    let before = sector_zero(&images.disks[0]);

    let output = run_script(&images, "select disk 0\ndelete 2\nlist partition\n");
    assert!(output.status.success(), "{}", stdout(&output));
    let text = stdout(&output);
    assert!(text.contains("Partition 2 deleted successfully."));
    assert!(text.contains("Partition 1"));
    assert!(!text.contains("Partition 3"));

    let after = sector_zero(&images.disks[0]);
    assert!(slot(&after, 1).iter().all(|b| *b == 0));
    for (index, (old, new)) in before.iter().zip(&after).enumerate() {
        let in_slot_two = (SLOT_BASE + SLOT_SIZE..SLOT_BASE + 2 * SLOT_SIZE).contains(&index);
        if !in_slot_two {
            assert_eq!(old, new, "byte {index} changed");
        }
    }
}

#[test]
fn setid_and_active_update_the_table() {
    let images = images(&[64]);
    let output = run_script(
        &images,
        "select disk 0\n\
         create primary size=8\n\
         create primary size=8\n\
         select partition 1\n\
         active\n\
         select partition 2\n\
         active\n\
         setid id=7\n",
    );
    assert!(output.status.success(), "{}", stdout(&output));
    assert!(stdout(&output).contains("Partition ID set successfully."));

    let sector = sector_zero(&images.disks[0]);
    assert_eq!(slot(&sector, 0)[0], 0x00);
    assert_eq!(slot(&sector, 1)[0], 0x80);
    assert_eq!(slot(&sector, 0)[4], 0x83);
    assert_eq!(slot(&sector, 1)[4], 0x07);
}

#[test]
fn script_stops_at_first_failure_with_kind_exit_code() {
    let images = images(&[64]);
    let output = run_script(&images, "select disk 0\nsetid id=0\ncreate primary\n");
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).contains("Invalid partition type: 0 is not allowed."));
    assert!(sector_zero(&images.disks[0]).iter().all(|b| *b == 0));
}

#[test]
fn enumeration_ends_then_reports_not_started() {
    let images = images(&[16, 16]);
    let output = run_script(
        &images,
        "select disk system\n\
         select disk next\n\
         select disk next\n\
         select disk next\n",
    );
    let text = stdout(&output);
    assert!(text.contains("Disk 0 selected."));
    assert!(text.contains("Disk 1 selected."));
    assert!(text.contains("Disk enumeration finished."));
    assert!(text.contains("Disk enumeration has not been started."));
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn exit_and_comments_end_the_script_cleanly() {
    let images = images(&[16]);
    let output = run_script(&images, "rem nothing to do\nexit\nselect disk 9\n");
    assert!(output.status.success());
    assert!(!stdout(&output).contains("Disk not found."));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let output = cmd().arg("--bogus").output().expect("run");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    let value: Value = serde_json::from_str(stderr.lines().next().expect("line")).expect("json");
    assert_eq!(value["error"]["kind"], "InvalidArgument");
    assert!(value["error"]["hint"].as_str().is_some());
}

#[test]
fn missing_disk_image_fails_startup() {
    let images = images(&[]);
    let output = cmd()
        .arg("--disk")
        .arg(images.dir.path().join("absent.img"))
        .arg("--mounts")
        .arg(images.dir.path().join("mounts"))
        .arg("-s")
        .arg(images.dir.path().join("mounts"))
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    let value: Value = serde_json::from_str(stderr.lines().next().expect("line")).expect("json");
    assert_eq!(value["error"]["kind"], "NotFound");
}

#[test]
fn version_emits_json_when_piped() {
    let output = cmd().arg("version").output().expect("version");
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["name"], "diskpart");
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}
