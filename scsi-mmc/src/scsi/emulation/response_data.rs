// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

//! Helpers for building response data. Each encoder returns the complete
//! reply; the caller cuts it down to the allocation length by writing it
//! through `SilentlyTruncate`.

use std::{cmp::min, io::Write};

use super::mmc::MmcConfig;

/// A wrapper around a `Write` that silently truncates its input after a given
/// number of bytes. This matches the semantics of SCSI's ALLOCATION LENGTH
/// field; anything beyond the allocation length is silently omitted.
pub struct SilentlyTruncate<W: Write>(W, usize);

impl<W: Write> SilentlyTruncate<W> {
    pub fn new(writer: W, len: usize) -> Self {
        Self(writer, len)
    }
}

impl<W: Write> Write for SilentlyTruncate<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.1 == 0 {
            // our goal is to silently fail, so once we've stopped actually
            // writing, just pretend all writes work
            return Ok(buf.len());
        }
        let len = min(buf.len(), self.1);
        let buf = &buf[..len];
        let written = self.0.write(buf)?;
        self.1 -= written;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

/// Clamp a value into a 32-bit field, saturating at 0xffff_ffff.
pub(crate) fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn pad_ascii(dst: &mut Vec<u8>, s: &str, len: usize) {
    let bytes = s.as_bytes();
    let used = min(bytes.len(), len);
    dst.extend_from_slice(&bytes[..used]);
    dst.resize(dst.len() + len - used, b' ');
}

/// Standard INQUIRY data for a removable CD/DVD device.
pub fn standard_inquiry_data(config: &MmcConfig) -> Vec<u8> {
    let mut reply = vec![
        0x05,        // peripheral qualifier: connected; device type: CD/DVD
        0b1000_0000, // removable
        0x05,        // version: SPC-3
        0x02,        // response data format
        31,          // additional length
        0,
        0,
        0b0010_0010, // 16-bit wide bus, command queueing
    ];
    pad_ascii(&mut reply, &config.vendor, 8);
    pad_ascii(&mut reply, &config.product, 16);
    pad_ascii(&mut reply, &config.revision, 4);
    reply
}

/// The Supported VPD Pages page; page 0x00 is the only one we have.
pub fn supported_vpd_pages() -> Vec<u8> {
    vec![0x05, 0x00, 0x00, 0x01, 0x00]
}

/// READ CAPACITY (10) parameter data.
pub fn read_capacity_10(total_sectors: u64, sector_size: u32) -> Vec<u8> {
    let last = saturate_u32(total_sectors.saturating_sub(1));
    let mut reply = Vec::with_capacity(8);
    reply.extend_from_slice(&last.to_be_bytes());
    reply.extend_from_slice(&sector_size.to_be_bytes());
    reply
}

/// READ CAPACITY (16) parameter data.
pub fn read_capacity_16(total_sectors: u64, sector_size: u32) -> Vec<u8> {
    let mut reply = Vec::with_capacity(32);
    reply.extend_from_slice(&total_sectors.saturating_sub(1).to_be_bytes());
    reply.extend_from_slice(&sector_size.to_be_bytes());
    // no protection, one logical block per physical block, LBA 0 aligned
    reply.resize(32, 0);
    reply
}

pub fn disc_information() -> Vec<u8> {
    let mut reply = vec![0; 34];
    reply[0..2].copy_from_slice(&32_u16.to_be_bytes());
    reply[2] = 0x0e; // last session complete, disc finalized
    reply[3] = 1; // first track on disc
    reply[4] = 1; // number of sessions
    reply[5] = 1; // first track in last session
    reply[6] = 1; // last track in last session
    reply[7] = 0x20; // unrestricted use
    reply[8] = 0; // CD-ROM / DVD-ROM disc type
    // last session lead-in and last possible lead-out start: not applicable
    reply[16..20].copy_from_slice(&0x00ff_ffff_u32.to_be_bytes());
    reply[20..24].copy_from_slice(&0x00ff_ffff_u32.to_be_bytes());
    reply
}

pub fn track_information(total_sectors: u64) -> Vec<u8> {
    let mut reply = vec![0; 36];
    reply[0..2].copy_from_slice(&34_u16.to_be_bytes());
    reply[2] = 1; // track number
    reply[3] = 1; // session number
    reply[5] = 0x04; // data track, recorded uninterrupted
    reply[6] = 0x01; // data mode 1
    reply[8..12].copy_from_slice(&0_u32.to_be_bytes()); // start address
    reply[24..28].copy_from_slice(&saturate_u32(total_sectors).to_be_bytes());
    reply
}

/// No changer, tray closed, idle.
pub fn mechanism_status() -> Vec<u8> {
    vec![0, 0, 0, 0, 0, 1, 0, 0]
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn truncate_at_allocation_length() {
        let mut out = Vec::new();
        let mut w = SilentlyTruncate::new(&mut out, 3);
        w.write_all(&[1, 2, 3, 4, 5]).unwrap();
        w.write_all(&[6]).unwrap();
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn inquiry_identity_is_padded() {
        let config = MmcConfig {
            vendor: "A".into(),
            product: "averyveryverylongproductname".into(),
            revision: "2".into(),
        };
        let data = standard_inquiry_data(&config);
        assert_eq!(data.len(), 36);
        assert_eq!(&data[8..16], b"A       ");
        assert_eq!(&data[16..32], b"averyveryverylon");
        assert_eq!(&data[32..36], b"2   ");
    }

    #[test]
    fn capacity_saturates() {
        let total = (1_u64 << 32) + 5;
        assert_eq!(read_capacity_10(total, 2048), [0xff, 0xff, 0xff, 0xff, 0, 0, 8, 0]);
        assert_eq!(
            &read_capacity_16(total, 2048)[..12],
            &[0, 0, 0, 1, 0, 0, 0, 4, 0, 0, 8, 0]
        );
    }

    #[test]
    fn capacity_of_empty_medium() {
        assert_eq!(read_capacity_10(0, 2048), [0, 0, 0, 0, 0, 0, 8, 0]);
        assert_eq!(&read_capacity_16(0, 2048)[..8], &[0; 8]);
    }
}
