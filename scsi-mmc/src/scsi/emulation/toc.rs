// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

//! READ TOC/PMA/ATIP response data for a single-session, single-track data
//! disc.

use num_enum::TryFromPrimitive;

use super::response_data::saturate_u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum TocFormat {
    Normal = 0x0,
    MultiSession = 0x1,
    Raw = 0x2,
}

/// ADR 1 (current position), control 4 (data track, copy prohibited)
const ADR_CONTROL: u8 = 0x14;
const LEAD_OUT: u8 = 0xaa;

/// The 2-second lead-in in front of LBA 0, in frames.
const LEAD_IN_FRAMES: u64 = 150;
const FRAMES_PER_SECOND: u64 = 75;

/// Convert an LBA to (minute, second, frame). Minutes saturate at 0xff.
pub fn lba_to_msf(lba: u64) -> [u8; 3] {
    let frames = lba.saturating_add(LEAD_IN_FRAMES);
    let seconds = frames / FRAMES_PER_SECOND;
    [
        u8::try_from(seconds / 60).unwrap_or(u8::MAX),
        // both < 75, so these fit
        (seconds % 60) as u8,
        (frames % FRAMES_PER_SECOND) as u8,
    ]
}

/// A 4-byte TOC address field: the LBA, or a reserved byte followed by MSF.
fn address(lba: u64, msf: bool) -> [u8; 4] {
    if msf {
        let [m, s, f] = lba_to_msf(lba);
        [0, m, s, f]
    } else {
        saturate_u32(lba).to_be_bytes()
    }
}

fn finish(mut reply: Vec<u8>) -> Vec<u8> {
    // the length field doesn't count itself; the reply is never near 64k
    let len = (reply.len() - 2) as u16;
    reply[0..2].copy_from_slice(&len.to_be_bytes());
    reply
}

/// Whether `track` is a valid starting track for a normal TOC.
pub const fn valid_start_track(track: u8) -> bool {
    track <= 1 || track == LEAD_OUT
}

/// Format 0000b: track descriptors starting at `track`, followed by the
/// lead-out.
pub fn normal(total_sectors: u64, msf: bool, track: u8) -> Vec<u8> {
    let mut reply = vec![0, 0, 1, 1];
    if track <= 1 {
        reply.extend_from_slice(&[0, ADR_CONTROL, 1, 0]);
        reply.extend_from_slice(&address(0, msf));
    }
    reply.extend_from_slice(&[0, ADR_CONTROL, LEAD_OUT, 0]);
    reply.extend_from_slice(&address(total_sectors, msf));
    finish(reply)
}

/// Format 0001b: the first track of the one and only session.
pub fn multi_session(msf: bool) -> Vec<u8> {
    let mut reply = vec![0, 0, 1, 1, 0, ADR_CONTROL, 1, 0];
    reply.extend_from_slice(&address(0, msf));
    finish(reply)
}

/// Format 0010b: the session's Q subchannel entries for points A0h, A1h, A2h
/// and track 1.
pub fn raw(total_sectors: u64, msf: bool) -> Vec<u8> {
    let mut reply = vec![0, 0, 1, 1];
    // session, ADR/control, TNO, point, min, sec, frame, zero, pmin, psec, pframe
    // first track number; disc type CD-DA or CD data
    reply.extend_from_slice(&[1, ADR_CONTROL, 0, 0xa0, 0, 0, 0, 0, 1, 0x00, 0]);
    // last track number
    reply.extend_from_slice(&[1, ADR_CONTROL, 0, 0xa1, 0, 0, 0, 0, 1, 0, 0]);
    // lead-out start
    reply.extend_from_slice(&[1, ADR_CONTROL, 0, 0xa2, 0, 0, 0]);
    reply.extend_from_slice(&address(total_sectors, msf));
    // track 1 start
    reply.extend_from_slice(&[1, ADR_CONTROL, 0, 1, 0, 0, 0]);
    reply.extend_from_slice(&address(0, msf));
    finish(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msf() {
        assert_eq!(lba_to_msf(0), [0, 2, 0]);
        assert_eq!(lba_to_msf(358_400), [79, 40, 50]);
        assert_eq!(lba_to_msf(u64::MAX), [0xff, 48, 15]);
    }

    #[test]
    fn raw_length() {
        let toc = raw(100, false);
        assert_eq!(toc.len(), 48);
        assert_eq!(&toc[..2], &[0, 46]);
    }
}
