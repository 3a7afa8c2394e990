// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

use super::{do_command_fail, do_command_in, ready_lun, MockMedium};
use crate::scsi::sense;

const READ_CAPACITY_10: &[u8] = &[
    0x25, // READ CAPACITY (10)
    0, 0, 0, 0, 0, 0, 0, 0, 0,
];

const READ_CAPACITY_16: &[u8] = &[
    0x9e, // SERVICE ACTION IN (16)
    0x10, // READ CAPACITY (16)
    0, 0, 0, 0, 0, 0, 0, 0, // obsolete
    0, 0, 0, 32, // alloc length
    0, 0,
];

fn capacity_16(last_lba: u64) -> Vec<u8> {
    let mut data = last_lba.to_be_bytes().to_vec();
    data.extend_from_slice(&2048_u32.to_be_bytes());
    data.resize(32, 0);
    data
}

#[test]
fn test_700_mib_medium() {
    let mut lun = ready_lun(MockMedium::with_size(700 * 1024 * 1024));
    assert_eq!(lun.total_sectors(), 358_400);

    do_command_in(
        &mut lun,
        READ_CAPACITY_10,
        &[
            0x00, 0x05, 0x77, 0xff, // last LBA: 358399
            0x00, 0x00, 0x08, 0x00, // block size: 2048
        ],
    );
    do_command_in(&mut lun, READ_CAPACITY_16, &capacity_16(358_399));
}

#[test]
fn test_capacity_beyond_32_bits() {
    let sectors = (1 << 32) + 5;
    let mut lun = ready_lun(MockMedium::with_sectors(sectors));

    do_command_in(
        &mut lun,
        READ_CAPACITY_10,
        &[0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x08, 0x00],
    );
    do_command_in(&mut lun, READ_CAPACITY_16, &capacity_16(sectors - 1));
}

#[test]
fn test_capacity_of_empty_medium() {
    // present, but too small to hold a single sector
    let mut lun = ready_lun(MockMedium::with_size(100));
    assert_eq!(lun.total_sectors(), 0);

    do_command_in(
        &mut lun,
        READ_CAPACITY_10,
        &[0, 0, 0, 0, 0x00, 0x00, 0x08, 0x00],
    );
    do_command_in(&mut lun, READ_CAPACITY_16, &capacity_16(0));
}

#[test]
fn test_capacity_follows_new_medium() {
    let medium = MockMedium::with_sectors(100);
    let mut lun = ready_lun(medium.clone());

    medium.load(200);
    lun.notifier().medium_inserted().unwrap();
    assert_eq!(lun.total_sectors(), 200);

    do_command_fail(&mut lun, READ_CAPACITY_10, sense::MEDIUM_MAY_HAVE_CHANGED);
    do_command_in(
        &mut lun,
        READ_CAPACITY_10,
        &[0, 0, 0, 199, 0x00, 0x00, 0x08, 0x00],
    );
}

#[test]
fn test_read_capacity_16_truncated() {
    let mut lun = ready_lun(MockMedium::with_sectors(100));

    do_command_in(
        &mut lun,
        &[0x9e, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 12, 0, 0],
        &capacity_16(99)[..12],
    );
}
