// Session-level scenarios over disk image files.
use std::fs;
use std::path::PathBuf;

use diskpart::api::{
    DiscoveryConfig, ErrorKind, Flow, ScriptOutcome, Session, TableKind, system_engine,
};
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;

struct Fixture {
    _dir: TempDir,
    disks: Vec<PathBuf>,
    config: DiscoveryConfig,
}

fn fixture(sizes_mb: &[u64]) -> Fixture {
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
        .collect::<Vec<_>>();
    let mounts = dir.path().join("mounts");
    fs::write(&mounts, "").expect("mounts");
    let config = DiscoveryConfig {
        disk_paths: disks.clone(),
        sysfs_root: dir.path().to_path_buf(),
        dev_root: dir.path().to_path_buf(),
        mounts_path: mounts,
    };
    Fixture {
        _dir: dir,
        disks,
        config,
    }
}

fn session(fixture: &Fixture) -> Session<Vec<u8>> {
    let engine = system_engine(&fixture.config);
    Session::open(engine, fixture.config.clone(), Vec::new()).expect("open session")
}

fn run(session: &mut Session<Vec<u8>>, line: &str) {
    let flow = session.execute(line).expect(line);
    assert_eq!(flow, Flow::Continue, "{line}");
}

fn output(session: &Session<Vec<u8>>) -> String {
    String::from_utf8_lossy(session.output()).into_owned()
}

#[test]
fn unknown_command_prints_the_command_list() {
    let fixture = fixture(&[16]);
    let mut session = session(&fixture);
    run(&mut session, "frobnicate now");
    let text = output(&session);
    assert!(text.contains("DiskPart - Available commands:"));
    assert!(text.contains("SELECT"));
    assert!(!text.contains("Shift the focus to a disk."));
}

#[test]
fn help_only_entries_list_their_children() {
    let fixture = fixture(&[16]);
    let mut session = session(&fixture);
    run(&mut session, "SELECT");
    let text = output(&session);
    assert!(text.contains("Shift the focus to an object."));
    assert!(text.contains("DISK"));
    assert!(text.contains("PARTITION"));
    assert!(text.contains("VOLUME"));
    assert_eq!(session.selection().disk(), None);
}

#[test]
fn exit_and_rem_short_circuit() {
    let fixture = fixture(&[16]);
    let mut session = session(&fixture);
    assert_eq!(session.execute("rem select disk 0").expect("rem"), Flow::Continue);
    assert_eq!(session.execute("EXIT").expect("exit"), Flow::Exit);
    assert!(session.output().is_empty());
    assert_eq!(session.selection().disk(), None);
}

#[test]
fn select_without_argument_reports_current_selection() {
    let fixture = fixture(&[16, 16]);
    let mut session = session(&fixture);
    run(&mut session, "select disk");
    run(&mut session, "select disk 1");
    run(&mut session, "select disk");
    run(&mut session, "select volume");
    let text = output(&session);
    assert!(text.contains("No disk is currently selected."));
    assert!(text.contains("Disk 1 is currently selected."));
    assert!(text.contains("No volume is currently selected."));
    assert_eq!(session.selection().disk(), Some(1));
}

#[test]
fn failed_select_keeps_state_and_reports_not_found() {
    let fixture = fixture(&[16]);
    let mut session = session(&fixture);
    run(&mut session, "select disk 0");
    let err = session.execute("select disk 7").expect_err("missing disk");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(session.selection().disk(), Some(0));

    let err = session.execute("select disk bogus").expect_err("bad arg");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = session.execute("select disk 1 2").expect_err("too many");
    assert_eq!(err.message(), Some("Invalid number of arguments."));
}

#[test]
fn next_past_the_end_clears_selection_once() {
    let fixture = fixture(&[16, 16]);
    let mut session = session(&fixture);
    run(&mut session, "select disk 1");
    run(&mut session, "select disk next");
    assert_eq!(session.selection().disk(), None);
    assert!(output(&session).contains("Disk enumeration finished."));

    let err = session.execute("select disk next").expect_err("not started");
    assert_eq!(err.kind(), ErrorKind::NoSelection);
    assert_eq!(err.message(), Some("Disk enumeration has not been started."));
}

#[test]
fn deactivate_is_idempotent_and_leaves_disk_clean() {
    let fixture = fixture(&[64]);
    let mut session = session(&fixture);
    run(&mut session, "select disk 0");
    run(&mut session, "create primary size=8");
    run(&mut session, "inactive");
    run(&mut session, "inactive");
    let text = output(&session);
    assert_eq!(text.matches("Partition is already inactive.").count(), 2);
    let disk = session.store().disk(0).expect("disk");
    assert!(!disk.is_dirty());
}

#[test]
fn active_leaves_exactly_one_boot_partition() {
    let fixture = fixture(&[64]);
    let mut session = session(&fixture);
    run(&mut session, "select disk 0");
    run(&mut session, "create primary size=8");
    run(&mut session, "create primary size=8");
    run(&mut session, "create primary size=8");
    for number in 1..=3 {
        run(&mut session, &format!("select partition {number}"));
        run(&mut session, "active");
        let disk = session.store().disk(0).expect("disk");
        let active = disk.active_partitions().collect::<Vec<_>>();
        assert_eq!(active.len(), 1);
        assert_eq!(disk.display_number(active[0].id), Some(number));
    }
}

#[test]
fn setid_validates_value_before_selection() {
    let fixture = fixture(&[64]);
    let mut session = session(&fixture);
    let err = session.execute("setid id=0").expect_err("zero");
    assert_eq!(err.message(), Some("Invalid partition type: 0 is not allowed."));
    let err = session.execute("setid id=42").expect_err("reserved");
    assert_eq!(err.message(), Some("Partition type 0x42 is invalid."));
    let err = session.execute("setid id=123").expect_err("too long");
    assert_eq!(err.message(), Some("Invalid format: id= must be 1 or 2 hex digits."));
    let err = session.execute("setid id=7").expect_err("no disk");
    assert_eq!(err.kind(), ErrorKind::NoSelection);

    run(&mut session, "select disk 0");
    let err = session.execute("setid id=7").expect_err("no partition");
    assert_eq!(err.message(), Some("No partition selected."));
    run(&mut session, "create primary size=8");
    run(&mut session, "setid ID=7");
    let disk = session.store().disk(0).expect("disk");
    assert_eq!(disk.primary()[0].type_code, 0x07);
    assert!(!disk.is_dirty());
}

#[test]
fn extended_and_logical_survive_a_rescan() {
    let fixture = fixture(&[128]);
    let mut session = session(&fixture);
    run(&mut session, "select disk 0");
    run(&mut session, "create partition primary size=16");
    run(&mut session, "create partition extended size=64");
    run(&mut session, "create partition logical size=16");
    run(&mut session, "create logical size=16");
    run(&mut session, "rescan");
    assert_eq!(session.selection().disk(), None);

    run(&mut session, "select disk 0");
    run(&mut session, "list partition");
    let text = output(&session);
    assert!(text.contains("DiskPart has finished scanning your configuration."));
    assert!(text.contains("Extended"));
    assert!(text.contains("Logical"));

    let disk = session.store().disk(0).expect("disk");
    assert_eq!(disk.table, TableKind::Mbr);
    assert_eq!(disk.primary().len(), 2);
    assert_eq!(disk.logical().len(), 2);
    let container = disk.extended().expect("container");
    for logical in disk.logical() {
        assert!(logical.start_sector > container.start_sector);
        assert!(logical.end_sector() <= container.end_sector());
    }
}

#[test]
fn deleting_a_logical_renumbers_the_rest() {
    let fixture = fixture(&[128]);
    let mut session = session(&fixture);
    run(&mut session, "select disk 0");
    run(&mut session, "create extended size=64");
    run(&mut session, "create logical size=8");
    run(&mut session, "create logical size=8");
    run(&mut session, "select partition 2");
    run(&mut session, "delete partition");
    assert_eq!(session.selection().partition(), None);

    let disk = session.store().disk(0).expect("disk");
    assert_eq!(disk.logical().len(), 1);
    assert!(disk.partition_by_number(2).is_some());
    assert!(disk.partition_by_number(3).is_none());
}

#[test]
fn uniqueid_shows_and_sets_the_signature() {
    let fixture = fixture(&[16]);
    let mut session = session(&fixture);
    run(&mut session, "select disk 0");
    run(&mut session, "create primary");
    run(&mut session, "uniqueid disk id=DEADBEEF");
    run(&mut session, "uniqueid disk");
    let text = output(&session);
    assert!(text.contains("New Signature: 0xdeadbeef"));
    assert!(text.contains("Disk ID: deadbeef"));

    let bytes = fs::read(&fixture.disks[0]).expect("image");
    assert_eq!(&bytes[440..444], &[0xEF, 0xBE, 0xAD, 0xDE]);
    let err = session.execute("uniqueid disk id=1234").expect_err("short");
    assert_eq!(err.message(), Some("Invalid arguments."));
}

#[test]
fn clean_forgets_the_table_and_zeroes_sector_zero() {
    let fixture = fixture(&[16]);
    let mut session = session(&fixture);
    run(&mut session, "select disk 0");
    run(&mut session, "create primary size=4");
    run(&mut session, "clean");
    assert_eq!(session.selection().partition(), None);
    let disk = session.store().disk(0).expect("disk");
    assert_eq!(disk.table, TableKind::None);
    assert_eq!(disk.partitions().count(), 0);

    let bytes = fs::read(&fixture.disks[0]).expect("image");
    assert!(bytes[..512].iter().all(|b| *b == 0));
}

#[test]
fn dump_disk_shows_the_boot_signature() {
    let fixture = fixture(&[16]);
    let mut session = session(&fixture);
    run(&mut session, "select disk 0");
    run(&mut session, "create primary");
    run(&mut session, "dump disk 0");
    let text = output(&session);
    let last = text
        .lines()
        .find(|line| line.starts_with(" 01f0 "))
        .expect("last dump line");
    assert!(last.contains(" 55 aa"), "{last}");
}

#[test]
fn list_disk_marks_the_current_disk() {
    let fixture = fixture(&[16, 32]);
    let mut session = session(&fixture);
    run(&mut session, "select disk 1");
    run(&mut session, "list disk");
    let text = output(&session);
    assert!(text.contains("* Disk 1"));
    assert!(text.contains("  Disk 0"));
    assert!(text.contains("32 MB"));
}

#[test]
fn script_stops_at_the_first_failing_line() {
    let fixture = fixture(&[16]);
    let mut session = session(&fixture);
    let script = "select disk 0\nselect partition 1\ncreate primary\n";
    let outcome = session.run_script(script.as_bytes()).expect("readable script");
    match outcome {
        ScriptOutcome::Stopped(err) => assert_eq!(err.kind(), ErrorKind::NotFound),
        ScriptOutcome::Finished => panic!("expected the script to stop"),
    }
    assert!(output(&session).contains("Partition not found."));
    let disk = session.store().disk(0).expect("disk");
    assert_eq!(disk.partitions().count(), 0);
}
