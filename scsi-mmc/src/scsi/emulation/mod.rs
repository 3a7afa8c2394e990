// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

mod command;
pub mod dvd_structure;
pub mod features;
pub mod media_event;
pub mod medium;
pub mod mmc;
pub mod mode_page;
pub mod response_data;
pub mod toc;

#[cfg(test)]
mod tests;

use self::mmc::LunError;
use super::{CmdError, Disposition, LunRequest};

/// A single logical unit, as seen by the LUN framework that owns it.
pub trait LogicalUnit: Send {
    /// Process a SCSI command sent to this logical unit.
    ///
    /// # Return value
    /// This function returns a Result, but it should return Err only in limited
    /// circumstances: when something goes wrong at the transport level, such
    /// as writes to `req.data_in` failing or `req.cdb` being too short.
    /// Any other errors, such as invalid SCSI commands or a medium that is not
    /// there, result in a `Disposition::Complete` carrying a CHECK CONDITION
    /// status and the appropriate sense data.
    fn process_request(&mut self, req: &mut LunRequest<'_>) -> Result<Disposition, CmdError>;

    /// The framework put a new medium in the drive.
    fn medium_inserted(&self) -> Result<(), LunError>;

    /// The framework took the medium out of the drive.
    fn medium_removed(&self);
}
