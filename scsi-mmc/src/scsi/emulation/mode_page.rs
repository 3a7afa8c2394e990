// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

use std::io::{self, Write};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ModePage {
    ReadErrorRecovery,
    Caching,
    CdCapabilities,
}

/// Page code that selects every supported page.
pub const ALL_PAGES: u8 = 0x3f;

impl ModePage {
    pub const ALL: &'static [Self] = &[
        Self::ReadErrorRecovery,
        Self::Caching,
        Self::CdCapabilities,
    ];

    /// The pages selected by a MODE SENSE page code, or None if we don't
    /// have that page. Page code 0 selects no page at all.
    pub fn select(page_code: u8) -> Option<&'static [Self]> {
        match page_code {
            0x00 => Some(&Self::ALL[..0]),
            ALL_PAGES => Some(Self::ALL),
            code => Self::ALL
                .iter()
                .position(|page| page.page_code() == code)
                .map(|i| &Self::ALL[i..=i]),
        }
    }

    pub const fn page_code(self) -> u8 {
        match self {
            Self::ReadErrorRecovery => 0x01,
            Self::Caching => 0x08,
            Self::CdCapabilities => 0x2a,
        }
    }

    pub const fn page_length(self) -> u8 {
        match self {
            Self::ReadErrorRecovery => 0x06,
            Self::Caching => 0x12,
            Self::CdCapabilities => 30,
        }
    }

    /// `locked` is the medium removal lock, reported on the capabilities page.
    pub fn write(self, data_in: &mut impl Write, locked: bool) -> io::Result<()> {
        data_in.write_all(&[
            self.page_code(),   // top 2 bits: no subpage, saving not supported
            self.page_length(), // page length
        ])?;

        match self {
            Self::ReadErrorRecovery => {
                data_in.write_all(&[
                    0,    // no error recovery flags
                    0x05, // read retry count
                    0, 0, 0, 0,
                ])?;
            }
            Self::Caching => {
                data_in.write_all(&[
                    // Writeback Cache Enable, lots of bits zero
                    0b0000_0100,
                ])?;
                // various cache fine-tuning stuff we can't really control
                data_in.write_all(&[0; 0x11])?;
            }
            Self::CdCapabilities => {
                data_in.write_all(&[
                    0x08, // DVD-ROM read
                    0x00, // no write support
                    // Audio play isn't really there, but Linux disables most
                    // of its CD-ROM support unless it's claimed.
                    // multisession, mode 2 form 1 and 2, audio play
                    0x71,
                    0x00, // no subchannel reads
                    // tray loading mechanism, eject, lock
                    0b0010_1001 | if locked { 0b10 } else { 0 },
                    0x00, // no changer, no separate volume control
                ])?;
                data_in.write_all(&5632_u16.to_be_bytes())?; // max read speed, 32x
                data_in.write_all(&2_u16.to_be_bytes())?; // volume levels
                data_in.write_all(&128_u16.to_be_bytes())?; // buffer size in KiB
                data_in.write_all(&5632_u16.to_be_bytes())?; // current read speed
                // reserved, digital audio, write speeds, copy management revision
                data_in.write_all(&[0; 8])?;
                data_in.write_all(&[0, 0, 0])?; // reserved
                data_in.write_all(&[0x01])?; // rotation control: CAV
                data_in.write_all(&[0; 4])?; // current write speed, no descriptors
            }
        }

        Ok(())
    }
}

/// Mode parameter data for MODE SENSE (6) or, with `long`, MODE SENSE (10).
pub fn mode_sense_data(pages: &[ModePage], long: bool, medium_type: u8, locked: bool) -> Vec<u8> {
    let mut reply = if long {
        vec![0, 0, medium_type, 0, 0, 0, 0, 0]
    } else {
        vec![0, medium_type, 0x10, 0]
    };
    for page in pages {
        // writes into a Vec can't fail
        let _ = page.write(&mut reply, locked);
    }

    // mode data length doesn't count itself; all pages together are < 255 bytes
    if long {
        let len = (reply.len() - 2) as u16;
        reply[0..2].copy_from_slice(&len.to_be_bytes());
    } else {
        reply[0] = (reply.len() - 1) as u8;
    }
    reply
}
