//! MajelFS driver tests against formatted media on an emulated SD card.

use majel_core::bus::{slot_ports, Chassis, SlotPorts};
use majel_core::cards::SdCard;
use majel_core::ioseek::Ioseek;
use majel_core::mfs::layout::OFFSET_NXTBLK;
use majel_core::mfs::{compute_address, storage_ports, BLOCK_SIZE, MAX_BLOCK};
use majel_core::{ImageBuilder, Mfs, MfsError, MfsFlags, MfsState, OpenMode, OpenTarget};

const SLOT: u8 = 4;

fn three_entries() -> Vec<u8> {
    ImageBuilder::new("MAJEL BOOT")
        .directory("SYS")
        .file("SYS", "KERNEL", vec![0xC3; 700])
        .file("SYS", "SHELL", b"shell".to_vec())
        .file("SYS", "CONFIG", b"baud=9600\n".to_vec())
        .min_blocks(32)
        .build()
        .unwrap()
}

fn chassis_with(image: Vec<u8>) -> (Chassis, SlotPorts) {
    let mut chassis = Chassis::new();
    chassis.insert(SLOT, Box::new(SdCard::new(image)));
    (chassis, slot_ports(SLOT).unwrap())
}

fn mounted(image: Vec<u8>) -> (Chassis, Mfs) {
    let (mut chassis, ports) = chassis_with(image);
    let mut mfs = Mfs::new();
    mfs.connect(&mut chassis, ports).unwrap();
    (chassis, mfs)
}

fn medium(chassis: &Chassis) -> Vec<u8> {
    chassis.card(SLOT).and_then(|c| c.medium()).unwrap().to_vec()
}

#[test]
fn test_connect_via_scan() {
    let (mut chassis, _) = chassis_with(three_entries());
    let mut ioseek = Ioseek::new();
    ioseek.scan(&mut chassis);

    let ports = storage_ports(ioseek.table()).unwrap();
    assert_eq!(ports, slot_ports(SLOT).unwrap());

    let mut mfs = Mfs::new();
    mfs.connect(&mut chassis, ports).unwrap();
    assert_eq!(mfs.flags(), MfsFlags::CONNECTED | MfsFlags::IDLE);
    assert_eq!(mfs.label(), "MAJEL BOOT");
    assert_eq!(mfs.block_count(&mut chassis).unwrap(), 32);
}

#[test]
fn test_connect_failures_leave_state() {
    let fresh = MfsState::new();

    let mut image = three_entries();
    image[4] = 9;
    let (mut chassis, ports) = chassis_with(image);
    let mut mfs = Mfs::new();
    let err = mfs.connect(&mut chassis, ports).unwrap_err();
    assert_eq!(err, MfsError::BadVersion);
    assert_eq!(err.code(), 0xFC);
    assert!(!mfs.flags().contains(MfsFlags::CONNECTED));
    assert_eq!(*mfs.state(), fresh);

    let mut image = three_entries();
    image[..4].copy_from_slice(b"FAT1");
    let (mut chassis, ports) = chassis_with(image);
    assert_eq!(mfs.connect(&mut chassis, ports), Err(MfsError::NoFormat));
    assert_eq!(*mfs.state(), fresh);

    let mut chassis = Chassis::new();
    chassis.insert(SLOT, Box::new(SdCard::empty()));
    assert_eq!(mfs.connect(&mut chassis, ports), Err(MfsError::NoCard));

    let mut empty = Chassis::new();
    assert_eq!(mfs.connect(&mut empty, ports), Err(MfsError::NoCard));
    assert_eq!(*mfs.state(), fresh);
}

#[test]
fn test_connect_twice() {
    let (mut chassis, mut mfs) = mounted(three_entries());
    let before = *mfs.state();
    let ports = slot_ports(SLOT).unwrap();
    assert_eq!(mfs.connect(&mut chassis, ports), Err(MfsError::Connected));
    assert_eq!(*mfs.state(), before);

    mfs.disconnect();
    assert_eq!(*mfs.state(), MfsState::new());
    mfs.connect(&mut chassis, ports).unwrap();
}

#[test]
fn test_seek_inverts_compute_address() {
    let (mut chassis, mut mfs) = mounted(three_entries());
    for block in [0, 1, 7, 0x1234, 0xDEAD_BEEF, MAX_BLOCK] {
        for offset in [0u8, 1, 0x7F, 0xFF] {
            mfs.seek(&mut chassis, compute_address(block, offset))
                .unwrap();
            assert_eq!(mfs.tell(), (block, offset));
            assert_eq!(
                mfs.state().linear_alias(),
                compute_address(block, offset)
            );
        }
    }
}

#[test]
fn test_seek_requires_connection() {
    let (mut chassis, _) = chassis_with(three_entries());
    let mut mfs = Mfs::new();
    assert_eq!(mfs.seek(&mut chassis, 0), Err(MfsError::NoCard));
}

#[test]
fn test_walk_three_entry_chain() {
    let (mut chassis, mut mfs) = mounted(three_entries());
    mfs.seek(&mut chassis, compute_address(9, 0x20)).unwrap();

    let names: Vec<String> = (0..3)
        .map(|i| mfs.walk_directory(&mut chassis, i).unwrap().label)
        .collect();
    assert_eq!(names, ["KERNEL", "SHELL", "CONFIG"]);
    assert_eq!(
        mfs.walk_directory(&mut chassis, 3),
        Err(MfsError::NotFound)
    );
    assert_eq!(mfs.tell(), (9, 0x20));
}

#[test]
fn test_looping_chain_is_bounded() {
    let mut image = three_entries();
    let (mut chassis, mut mfs) = mounted(image.clone());
    let last = mfs.walk_directory(&mut chassis, 2).unwrap();
    let first = mfs.walk_directory(&mut chassis, 0).unwrap();

    // Point the last entry back at the first.
    let at = last.block as usize * BLOCK_SIZE + OFFSET_NXTBLK as usize;
    image[at..at + 8].copy_from_slice(&first.block.to_le_bytes());
    let (mut chassis, mut mfs) = mounted(image.clone());
    assert_eq!(
        mfs.walk_directory(&mut chassis, 1_000),
        Err(MfsError::NotFound)
    );
    assert_eq!(mfs.walk_directory(&mut chassis, 4).unwrap().label, "SHELL");

    // A pointer past the end of the medium ends the walk too.
    image[at..at + 8].copy_from_slice(&5000u64.to_le_bytes());
    let (mut chassis, mut mfs) = mounted(image);
    assert_eq!(
        mfs.walk_directory(&mut chassis, 3),
        Err(MfsError::NotFound)
    );
}

#[test]
fn test_open_while_open() {
    let (mut chassis, mut mfs) = mounted(three_entries());
    mfs.open(&mut chassis, OpenTarget::Path("SYS/SHELL"), OpenMode::Read)
        .unwrap();
    let before = *mfs.state();

    for target in [
        OpenTarget::Path("SYS/CONFIG"),
        OpenTarget::Directory(0),
        OpenTarget::Entry(0),
    ] {
        assert_eq!(
            mfs.open(&mut chassis, target, OpenMode::ReadWrite),
            Err(MfsError::Connected)
        );
        assert_eq!(*mfs.state(), before);
    }
    assert_eq!(mfs.select_directory(&mut chassis, 0), Err(MfsError::Connected));
}

#[test]
fn test_read_only_write_leaves_medium() {
    let (mut chassis, mut mfs) = mounted(three_entries());
    let before = medium(&chassis);
    mfs.open(&mut chassis, OpenTarget::Path("CONFIG"), OpenMode::Read)
        .unwrap();
    let state = *mfs.state();
    assert_eq!(mfs.write(&mut chassis, b"baud=300"), Err(MfsError::NotFound));
    assert_eq!(*mfs.state(), state);
    assert_eq!(medium(&chassis), before);
}

#[test]
fn test_write_then_read_back() {
    let (mut chassis, mut mfs) = mounted(three_entries());
    let patch: Vec<u8> = (0..400u32).map(|i| i as u8).collect();

    mfs.open(&mut chassis, OpenTarget::Path("sys/kernel"), OpenMode::ReadWrite)
        .unwrap();
    mfs.set_position(&mut chassis, 200).unwrap();
    assert_eq!(mfs.write(&mut chassis, &patch).unwrap(), 400);
    assert_eq!(mfs.position().unwrap(), 600);
    mfs.close();

    let handle = mfs
        .open(&mut chassis, OpenTarget::Entry(0), OpenMode::Read)
        .unwrap();
    assert_eq!(handle.length, 700);
    let mut data = vec![0u8; 1000];
    assert_eq!(mfs.read(&mut chassis, &mut data).unwrap(), 700);
    assert!(data[..200].iter().all(|&b| b == 0xC3));
    assert_eq!(&data[200..600], &patch[..]);
    assert!(data[600..700].iter().all(|&b| b == 0xC3));
}

#[test]
fn test_write_stops_at_file_end() {
    let (mut chassis, mut mfs) = mounted(three_entries());
    let before = medium(&chassis);
    mfs.open(&mut chassis, OpenTarget::Path("SHELL"), OpenMode::ReadWrite)
        .unwrap();
    assert_eq!(mfs.write(&mut chassis, b"SHELL+OVERFLOW").unwrap(), 5);

    let after = medium(&chassis);
    let changed: Vec<usize> = (0..before.len()).filter(|&i| before[i] != after[i]).collect();
    assert_eq!(changed.len(), 5);
}

#[test]
fn test_queries_keep_handle_position() {
    let (mut chassis, mut mfs) = mounted(three_entries());
    let header: Vec<u8> = medium(&chassis)[..BLOCK_SIZE].to_vec();
    mfs.open(&mut chassis, OpenTarget::Path("SYS/CONFIG"), OpenMode::ReadWrite)
        .unwrap();
    let at = mfs.tell();

    assert_eq!(mfs.directories(&mut chassis).unwrap().len(), 1);
    assert_eq!(mfs.block_count(&mut chassis).unwrap(), 32);
    mfs.walk_directory(&mut chassis, 0).unwrap();
    assert_eq!(mfs.tell(), at);
    assert_eq!(mfs.position().unwrap(), 0);

    let mut data = [0u8; 32];
    assert_eq!(mfs.read(&mut chassis, &mut data).unwrap(), 10);
    assert_eq!(&data[..10], b"baud=9600\n");

    mfs.block_count(&mut chassis).unwrap();
    assert_eq!(mfs.set_position(&mut chassis, 0).unwrap(), 0);
    mfs.directories(&mut chassis).unwrap();
    assert_eq!(mfs.write(&mut chassis, b"baud=4800\n").unwrap(), 10);
    assert_eq!(&medium(&chassis)[..BLOCK_SIZE], &header[..]);

    assert_eq!(mfs.set_position(&mut chassis, 0).unwrap(), 0);
    assert_eq!(mfs.read(&mut chassis, &mut data).unwrap(), 10);
    assert_eq!(&data[..10], b"baud=4800\n");
}

#[test]
fn test_seek_out_of_file_blocks_transfers() {
    let (mut chassis, mut mfs) = mounted(three_entries());
    let before = medium(&chassis);
    mfs.open(&mut chassis, OpenTarget::Path("SYS/SHELL"), OpenMode::ReadWrite)
        .unwrap();

    mfs.seek(&mut chassis, 0).unwrap();
    assert_eq!(mfs.write(&mut chassis, b"ZZZZ").unwrap(), 0);
    assert_eq!(mfs.position(), Err(MfsError::NotFound));

    // Just past the end of the file.
    let end = mfs.walk_directory(&mut chassis, 1).unwrap();
    mfs.seek(&mut chassis, compute_address(end.data_block, 5))
        .unwrap();
    assert_eq!(mfs.write(&mut chassis, b"ZZZZ").unwrap(), 0);
    assert_eq!(mfs.position().unwrap(), 5);

    assert_eq!(medium(&chassis), before);
    assert_eq!(&medium(&chassis)[..4], b"MJFS");
}

#[test]
fn test_directory_handle_lists_chain() {
    let image = ImageBuilder::new("TWO DIRS")
        .directory("A")
        .file("A", "ONE", b"1".to_vec())
        .directory("B")
        .file("B", "TWO", b"22".to_vec())
        .file("B", "THREE", b"333".to_vec())
        .build()
        .unwrap();
    let (mut chassis, mut mfs) = mounted(image);

    let dirs = mfs.directories(&mut chassis).unwrap();
    assert_eq!(dirs.len(), 2);
    assert_eq!(dirs[1].label, "B");

    mfs.open(&mut chassis, OpenTarget::Directory(1), OpenMode::Read)
        .unwrap();
    assert_eq!(mfs.label(), "B");
    let mut lengths = Vec::new();
    while let Some(entry) = mfs.next_entry(&mut chassis).unwrap() {
        lengths.push((entry.label, entry.length));
    }
    assert_eq!(lengths, [("TWO".to_string(), 2), ("THREE".to_string(), 3)]);
    mfs.close();

    assert_eq!(
        mfs.open(&mut chassis, OpenTarget::Directory(2), OpenMode::Read),
        Err(MfsError::NotFound)
    );
    assert_eq!(
        mfs.open(&mut chassis, OpenTarget::Path("A/TWO"), OpenMode::Read),
        Err(MfsError::NotFound)
    );
}
