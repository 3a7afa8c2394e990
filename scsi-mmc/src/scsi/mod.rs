// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

pub mod emulation;
pub mod sense;

use std::io::{self, Write};

use thiserror::Error as ThisError;

use self::sense::SenseTriple;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CmdOutput {
    pub status: u8,
    pub status_qualifier: u16,
    pub sense: Vec<u8>,
}

impl CmdOutput {
    pub const fn ok() -> Self {
        Self {
            status: 0,
            status_qualifier: 0,
            sense: Vec::new(),
        }
    }

    pub fn check_condition(sense: SenseTriple) -> Self {
        Self {
            status: 2,
            status_qualifier: 0,
            sense: sense.to_fixed_sense(),
        }
    }

    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// What happened to a request once the logical unit is done with it.
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The request finished synchronously.
    Complete(CmdOutput),
    /// A sector transfer was handed to the medium, which reports completion
    /// on its own.
    Enqueued,
}

/// A single command as delivered by the LUN framework.
pub struct LunRequest<'a> {
    pub id: u64,
    pub cdb: &'a [u8],
    pub data_in: &'a mut dyn Write,
    xfer_size: usize,
}

impl<'a> LunRequest<'a> {
    pub fn new(id: u64, cdb: &'a [u8], data_in: &'a mut dyn Write) -> Self {
        Self {
            id,
            cdb,
            data_in,
            xfer_size: 0,
        }
    }

    /// Number of bytes the initiator should expect to move for this command,
    /// as set by the logical unit while processing it.
    pub const fn xfer_size(&self) -> usize {
        self.xfer_size
    }

    pub(crate) fn set_xfer_size(&mut self, xfer_size: usize) {
        self.xfer_size = xfer_size;
    }
}

/// A transport-level error encountered while processing a SCSI command.
///
/// This is only for transport-level errors; anything else should be handled by
/// returning a CHECK CONDITION status at the SCSI level.
#[derive(Debug, ThisError)]
pub enum CmdError {
    /// The provided CDB is too short for its operation code.
    #[error("CDB is too short for its operation code")]
    CdbTooShort,
    /// An error occurred while writing to the provided data in writer.
    #[error("Failed writing data in: {0}")]
    DataIn(io::Error),
}
