// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

//! Feature descriptors for GET CONFIGURATION.

use std::io::{self, Write};

pub const PROFILE_NONE: u16 = 0x0000;
pub const PROFILE_CD_ROM: u16 = 0x0008;
pub const PROFILE_DVD_ROM: u16 = 0x0010;

const PERSISTENT: u8 = 0b10;
const CURRENT: u8 = 0b01;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Feature {
    ProfileList,
    Core,
    Morphing,
    RemovableMedium,
    RandomReadable,
    CdRead,
    PowerManagement,
    Timeout,
}

impl Feature {
    /// Every feature we report, in ascending feature code order.
    pub const ALL: &'static [Self] = &[
        Self::ProfileList,
        Self::Core,
        Self::Morphing,
        Self::RemovableMedium,
        Self::RandomReadable,
        Self::CdRead,
        Self::PowerManagement,
        Self::Timeout,
    ];

    pub const fn code(self) -> u16 {
        match self {
            Self::ProfileList => 0x0000,
            Self::Core => 0x0001,
            Self::Morphing => 0x0002,
            Self::RemovableMedium => 0x0003,
            Self::RandomReadable => 0x0010,
            Self::CdRead => 0x001e,
            Self::PowerManagement => 0x0100,
            Self::Timeout => 0x0105,
        }
    }

    const fn version(self) -> u8 {
        match self {
            Self::Core | Self::RemovableMedium | Self::CdRead => 2,
            Self::Morphing => 1,
            _ => 0,
        }
    }

    pub const fn additional_length(self) -> u8 {
        match self {
            Self::ProfileList | Self::Core | Self::RandomReadable => 8,
            Self::Morphing | Self::RemovableMedium | Self::CdRead | Self::Timeout => 4,
            Self::PowerManagement => 0,
        }
    }

    pub fn write(self, data_in: &mut impl Write, media_present: bool) -> io::Result<()> {
        data_in.write_all(&self.code().to_be_bytes())?;
        data_in.write_all(&[
            self.version() << 2 | PERSISTENT | CURRENT,
            self.additional_length(),
        ])?;

        match self {
            Self::ProfileList => {
                // DVD-ROM goes before CD-ROM; only the CD-ROM profile is ever current
                data_in.write_all(&PROFILE_DVD_ROM.to_be_bytes())?;
                data_in.write_all(&[0, 0])?;
                data_in.write_all(&PROFILE_CD_ROM.to_be_bytes())?;
                data_in.write_all(&[u8::from(media_present), 0])?;
            }
            Self::Core => {
                // physical interface standard: ATAPI
                data_in.write_all(&2_u32.to_be_bytes())?;
                // DBE
                data_in.write_all(&[0b0000_0001, 0, 0, 0])?;
            }
            Self::Morphing => {
                // OCEvent, no asynchronous notification
                data_in.write_all(&[0b0000_0010, 0, 0, 0])?;
            }
            Self::RemovableMedium => {
                // tray loading mechanism, load, eject, lock
                data_in.write_all(&[0b010 << 5 | 0b0001_1001, 0, 0, 0])?;
            }
            Self::RandomReadable => {
                data_in.write_all(&2048_u32.to_be_bytes())?; // logical block size
                data_in.write_all(&0x10_u16.to_be_bytes())?; // blocking
                data_in.write_all(&[0, 0])?; // no page present
            }
            Self::CdRead => {
                // no CD-Text, C2 error pointers or digital audio play
                data_in.write_all(&[0, 0, 0, 0])?;
            }
            Self::PowerManagement => (),
            Self::Timeout => {
                data_in.write_all(&[0, 0, 0, 0])?;
            }
        }

        Ok(())
    }
}

/// Complete GET CONFIGURATION response: header plus all features.
pub fn configuration(total_sectors: u64) -> Vec<u8> {
    let media_present = total_sectors != 0;
    let profile = if media_present {
        PROFILE_CD_ROM
    } else {
        PROFILE_NONE
    };

    let mut reply = vec![0, 0, 0, 0, 0, 0];
    reply.extend_from_slice(&profile.to_be_bytes());
    for feature in Feature::ALL {
        // writes into a Vec can't fail
        let _ = feature.write(&mut reply, media_present);
    }

    // data length doesn't count itself
    let len = (reply.len() - 4) as u32;
    reply[0..4].copy_from_slice(&len.to_be_bytes());
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_sizes_match_lengths() {
        for &feature in Feature::ALL {
            let mut out = Vec::new();
            feature.write(&mut out, true).unwrap();
            assert_eq!(
                out.len(),
                4 + usize::from(feature.additional_length()),
                "{feature:?}"
            );
        }
    }

    #[test]
    fn full_length() {
        let reply = configuration(1);
        assert_eq!(reply.len(), 80);
        assert_eq!(&reply[0..4], &[0, 0, 0, 76]);
    }
}
