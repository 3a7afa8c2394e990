// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

mod capacity;
mod image_medium;

use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

use super::{
    medium::{Medium, Transfer},
    mmc::{MmcConfig, MmcLun},
    LogicalUnit,
};
use crate::scsi::{
    sense::{self, SenseTriple},
    CmdError, CmdOutput, Disposition, LunRequest,
};

struct MockState {
    size: u64,
    present: bool,
    locked: bool,
    fail_enqueue: bool,
    transfers: Vec<Transfer>,
}

/// A medium that records what the unit asks of it.
struct MockMedium(Mutex<MockState>);

impl MockMedium {
    fn with_sectors(sectors: u64) -> Arc<Self> {
        Self::with_size(sectors * 2048)
    }

    fn with_size(size: u64) -> Arc<Self> {
        Arc::new(Self(Mutex::new(MockState {
            size,
            present: size != 0,
            locked: false,
            fail_enqueue: false,
            transfers: Vec::new(),
        })))
    }

    fn empty() -> Arc<Self> {
        Self::with_size(0)
    }

    fn load(&self, sectors: u64) {
        let mut state = self.0.lock().unwrap();
        state.size = sectors * 2048;
        state.present = true;
    }

    fn unload(&self) {
        let mut state = self.0.lock().unwrap();
        state.size = 0;
        state.present = false;
    }

    fn fail_enqueue(&self) {
        self.0.lock().unwrap().fail_enqueue = true;
    }

    fn locked(&self) -> bool {
        self.0.lock().unwrap().locked
    }

    fn transfers(&self) -> Vec<Transfer> {
        self.0.lock().unwrap().transfers.clone()
    }
}

impl Medium for MockMedium {
    fn size(&self) -> io::Result<u64> {
        Ok(self.0.lock().unwrap().size)
    }

    fn is_present(&self) -> bool {
        self.0.lock().unwrap().present
    }

    fn eject(&self) -> io::Result<()> {
        let mut state = self.0.lock().unwrap();
        if state.locked {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
        }
        state.size = 0;
        state.present = false;
        Ok(())
    }

    fn set_lock(&self, locked: bool) {
        self.0.lock().unwrap().locked = locked;
    }

    fn enqueue_transfer(&self, transfer: Transfer, data_in: &mut dyn Write) -> io::Result<()> {
        let mut state = self.0.lock().unwrap();
        if state.fail_enqueue {
            return Err(io::Error::new(io::ErrorKind::Other, "queue full"));
        }
        data_in.write_all(&vec![0xcd; transfer.length])?;
        state.transfers.push(transfer);
        Ok(())
    }
}

/// A unit over `medium` that has already reported its initial unit attention.
fn ready_lun(medium: Arc<MockMedium>) -> MmcLun<MockMedium> {
    let mut lun = MmcLun::init(medium, MmcConfig::default()).unwrap();
    do_command_fail(&mut lun, &[0, 0, 0, 0, 0, 0], sense::MEDIUM_MAY_HAVE_CHANGED);
    lun
}

/// Run `cdb`, returning the result, the data in and the transfer size.
fn do_command(
    lun: &mut impl LogicalUnit,
    cdb: &[u8],
) -> (Result<Disposition, CmdError>, Vec<u8>, usize) {
    let mut data_in = Vec::new();
    let mut req = LunRequest::new(0, cdb, &mut data_in);
    let res = lun.process_request(&mut req);
    let xfer_size = req.xfer_size();
    (res, data_in, xfer_size)
}

fn do_command_in(lun: &mut impl LogicalUnit, cdb: &[u8], expected_data_in: &[u8]) {
    let (res, data_in, _) = do_command(lun, cdb);
    assert_eq!(res.unwrap(), Disposition::Complete(CmdOutput::ok()));
    assert_eq!(&data_in, expected_data_in);
}

fn do_command_fail(lun: &mut impl LogicalUnit, cdb: &[u8], expected_error: SenseTriple) {
    let (res, data_in, _) = do_command(lun, cdb);
    assert_eq!(
        res.unwrap(),
        Disposition::Complete(CmdOutput::check_condition(expected_error))
    );
    assert_eq!(&data_in, &[]);
}
