// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

//! The unit driving a real image file.

use std::{fs::File, io::Write, sync::Arc};

use tempfile::tempfile;

use super::{do_command, do_command_fail, do_command_in};
use crate::scsi::{
    emulation::{
        medium::{Completion, ImageMedium, Medium},
        mmc::{MmcConfig, MmcLun},
        LogicalUnit,
    },
    sense, CmdOutput, Disposition,
};

/// An image whose sector `n` is filled with the byte `n`.
fn test_image(sectors: u8) -> File {
    let mut f = tempfile().unwrap();
    for n in 0..sectors {
        f.write_all(&[n; 2048]).unwrap();
    }
    f
}

fn image_lun(medium: Arc<ImageMedium>) -> MmcLun<ImageMedium> {
    let mut lun = MmcLun::init(medium, MmcConfig::default()).unwrap();
    do_command_fail(&mut lun, &[0, 0, 0, 0, 0, 0], sense::MEDIUM_MAY_HAVE_CHANGED);
    lun
}

#[test]
fn test_read_from_image() {
    let medium = Arc::new(ImageMedium::new(test_image(16)));
    let mut lun = image_lun(medium.clone());
    assert_eq!(lun.total_sectors(), 16);

    let (res, data_in, _) = do_command(
        &mut lun,
        &[
            0x28, // READ (10)
            0, 0, 0, 0, 5, // LBA: 5
            0, 0, 2, // transfer length: 2
            0,
        ],
    );
    assert_eq!(res.unwrap(), Disposition::Enqueued);
    assert_eq!(&data_in[..2048], &[5; 2048][..]);
    assert_eq!(&data_in[2048..], &[6; 2048][..]);
    assert_eq!(
        medium.take_completions(),
        [Completion {
            id: 0,
            output: CmdOutput::ok()
        }]
    );
}

#[test]
fn test_eject_locked_image() {
    let medium = Arc::new(ImageMedium::new(test_image(4)));
    let mut lun = image_lun(medium.clone());

    do_command_in(&mut lun, &[0x1e, 0, 0, 0, 1, 0], &[]);
    assert!(medium.is_locked());
    do_command_fail(
        &mut lun,
        &[0x1b, 0, 0, 0, 0b10, 0],
        sense::MEDIUM_REMOVAL_PREVENTED,
    );
    assert!(medium.is_present());

    do_command_in(&mut lun, &[0x1e, 0, 0, 0, 0, 0], &[]);
    do_command_in(&mut lun, &[0x1b, 0, 0, 0, 0b10, 0], &[]);
    assert!(!medium.is_present());
    do_command_fail(&mut lun, &[0, 0, 0, 0, 0, 0], sense::MEDIUM_NOT_PRESENT);
}

#[test]
fn test_swap_image() {
    let medium = Arc::new(ImageMedium::empty());
    let mut lun = MmcLun::init(medium.clone(), MmcConfig::default()).unwrap();
    assert_eq!(lun.total_sectors(), 0);
    do_command_fail(&mut lun, &[0, 0, 0, 0, 0, 0], sense::MEDIUM_NOT_PRESENT);

    medium.insert(test_image(8));
    lun.medium_inserted().unwrap();
    assert_eq!(lun.total_sectors(), 8);
    do_command_fail(&mut lun, &[0, 0, 0, 0, 0, 0], sense::MEDIUM_MAY_HAVE_CHANGED);

    let (res, data_in, _) = do_command(&mut lun, &[0x28, 0, 0, 0, 0, 7, 0, 0, 1, 0]);
    assert_eq!(res.unwrap(), Disposition::Enqueued);
    assert_eq!(data_in, [7; 2048]);
}
