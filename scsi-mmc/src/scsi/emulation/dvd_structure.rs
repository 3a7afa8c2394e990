// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

//! READ DVD STRUCTURE response data for a single-layer DVD-ROM.

use std::convert::TryFrom;

use num_enum::TryFromPrimitive;

use super::response_data::saturate_u32;
use crate::scsi::sense::{self, SenseTriple};

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum DvdStructureFormat {
    PhysicalFormat = 0x00,
    Copyright = 0x01,
    Bca = 0x03,
    Manufacturing = 0x04,
    CapabilityList = 0xff,
}

const DATA_LEN: usize = 2048;
// readable, not writable
const READABLE: u8 = 0x40;

fn with_header(payload_len: usize) -> Vec<u8> {
    let mut reply = vec![0; 4 + payload_len];
    // length excludes the length field itself; payloads are at most 2k
    let len = (payload_len + 2) as u16;
    reply[0..2].copy_from_slice(&len.to_be_bytes());
    reply
}

fn physical_format(layer: u8, total_sectors: u64) -> Result<Vec<u8>, SenseTriple> {
    if layer != 0 {
        return Err(sense::INVALID_FIELD_IN_CDB);
    }
    if total_sectors == 0 {
        return Err(sense::MEDIUM_NOT_PRESENT);
    }
    let last = saturate_u32(total_sectors - 1).to_be_bytes();

    let mut reply = with_header(DATA_LEN);
    reply[4] = 0x01; // DVD-ROM, part version 1
    reply[5] = 0x0f; // 120mm disc, maximum rate not specified
    reply[6] = 0x01; // one layer, read-only
    reply[7] = 0x00; // default densities
    reply[8..12].copy_from_slice(&0_u32.to_be_bytes()); // start sector
    reply[12..16].copy_from_slice(&last); // end sector
    reply[16..20].copy_from_slice(&last); // end sector in layer 0
    Ok(reply)
}

fn copyright() -> Vec<u8> {
    // no copy protection, no region restrictions
    with_header(4)
}

fn manufacturing() -> Vec<u8> {
    with_header(DATA_LEN)
}

fn capability_list() -> Vec<u8> {
    let formats: [(DvdStructureFormat, u16); 4] = [
        (DvdStructureFormat::PhysicalFormat, 2048 + 4),
        (DvdStructureFormat::Copyright, 4 + 4),
        (DvdStructureFormat::Bca, 188 + 4),
        (DvdStructureFormat::Manufacturing, 2048 + 4),
    ];
    let mut reply = with_header(0);
    for (format, len) in formats {
        reply.extend_from_slice(&[format as u8, READABLE]);
        reply.extend_from_slice(&len.to_be_bytes());
    }
    let len = (reply.len() - 2) as u16;
    reply[0..2].copy_from_slice(&len.to_be_bytes());
    reply
}

/// Build the structure for `format`. Errors carry the sense to report.
pub fn read_dvd_structure(
    format: u8,
    layer: u8,
    total_sectors: u64,
) -> Result<Vec<u8>, SenseTriple> {
    let format =
        DvdStructureFormat::try_from(format).map_err(|_| sense::INVALID_FIELD_IN_CDB)?;
    match format {
        DvdStructureFormat::PhysicalFormat => physical_format(layer, total_sectors),
        DvdStructureFormat::Copyright => Ok(copyright()),
        // no burst cutting area on an emulated disc
        DvdStructureFormat::Bca => Err(sense::INVALID_FIELD_IN_CDB),
        DvdStructureFormat::Manufacturing => Ok(manufacturing()),
        DvdStructureFormat::CapabilityList => Ok(capability_list()),
    }
}
