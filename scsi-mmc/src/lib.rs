// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

//! An emulated MMC (CD/DVD-ROM) SCSI logical unit.
//!
//! The logical unit sits behind a generic LUN framework: the framework hands
//! it CDBs through [`scsi::emulation::LogicalUnit::process_request`], and
//! provides the backing medium through the [`scsi::emulation::medium::Medium`]
//! trait.

pub mod scsi;
