// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

use std::{
    collections::VecDeque,
    fs::File,
    io::{self, Write},
    num::{NonZeroU32, NonZeroU64},
    ops::{Div, Mul},
    os::unix::prelude::*,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{debug, error};

use crate::scsi::{sense, CmdOutput};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
pub struct ByteOffset(u64);
impl From<u64> for ByteOffset {
    fn from(value: u64) -> Self {
        ByteOffset(value)
    }
}
impl From<ByteOffset> for u64 {
    fn from(value: ByteOffset) -> Self {
        value.0
    }
}
impl Div<SectorSize> for ByteOffset {
    type Output = SectorOffset;

    fn div(self, rhs: SectorSize) -> Self::Output {
        SectorOffset(self.0 / NonZeroU64::from(rhs.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
pub struct SectorSize(NonZeroU32);
impl From<SectorSize> for u32 {
    fn from(value: SectorSize) -> Self {
        u32::from(value.0)
    }
}

/// Every medium this unit emulates uses 2048-byte sectors.
pub const CD_SECTOR_SIZE: SectorSize = match NonZeroU32::new(2048) {
    Some(size) => SectorSize(size),
    None => unreachable!(),
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
pub struct SectorOffset(u64);
impl From<SectorOffset> for u64 {
    fn from(value: SectorOffset) -> Self {
        value.0
    }
}
impl From<u64> for SectorOffset {
    fn from(value: u64) -> Self {
        SectorOffset(value)
    }
}
impl Mul<SectorSize> for SectorOffset {
    type Output = ByteOffset;

    fn mul(self, rhs: SectorSize) -> Self::Output {
        ByteOffset(self.0 * u64::from(NonZeroU64::from(rhs.0)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    Read,
}

/// A sector transfer handed to the medium.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    /// Id of the request the transfer belongs to.
    pub id: u64,
    pub direction: TransferDirection,
    pub offset: ByteOffset,
    pub length: usize,
}

/// The storage behind the drive, provided by the LUN framework.
///
/// Everything here takes `&self`: the command path and the framework's
/// notification path may hold the medium at the same time.
pub trait Medium: Send + Sync {
    /// Size of the loaded medium in bytes. Zero if there is none.
    fn size(&self) -> io::Result<u64>;
    fn is_present(&self) -> bool;
    /// Unload the medium. Fails if the medium is locked in the drive.
    fn eject(&self) -> io::Result<()>;
    fn set_lock(&self, locked: bool);
    /// Start a transfer. The medium reports the request's completion itself;
    /// an error here means the transfer never started.
    fn enqueue_transfer(&self, transfer: Transfer, data_in: &mut dyn Write) -> io::Result<()>;
}

/// The final status of a transfer queued on an [`ImageMedium`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Completion {
    pub id: u64,
    pub output: CmdOutput,
}

struct ImageState {
    file: Option<File>,
    locked: bool,
}

/// A medium backed by an ISO image file.
///
/// Transfers are carried out as soon as they are enqueued; their completions
/// wait in a queue until the owner collects them with `take_completions`.
pub struct ImageMedium {
    state: Mutex<ImageState>,
    completions: Mutex<VecDeque<Completion>>,
}

// A panic while holding one of these locks can't leave the state half-updated,
// so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ImageMedium {
    /// A drive with no disc in it.
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(ImageState {
                file: None,
                locked: false,
            }),
            completions: Mutex::new(VecDeque::new()),
        }
    }

    pub fn new(file: File) -> Self {
        let medium = Self::empty();
        medium.insert(file);
        medium
    }

    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }

    /// Load `file` into the drive, replacing whatever was there.
    pub fn insert(&self, file: File) {
        lock(&self.state).file = Some(file);
    }

    /// Take the disc out regardless of the lock, as the user of a real drive
    /// might with a paperclip.
    pub fn remove(&self) -> Option<File> {
        lock(&self.state).file.take()
    }

    pub fn is_locked(&self) -> bool {
        lock(&self.state).locked
    }

    pub fn take_completions(&self) -> Vec<Completion> {
        lock(&self.completions).drain(..).collect()
    }

    fn complete(&self, id: u64, output: CmdOutput) {
        lock(&self.completions).push_back(Completion { id, output });
    }

    fn read_into(file: &File, transfer: Transfer, data_in: &mut dyn Write) -> io::Result<()> {
        let chunk_len = u32::from(CD_SECTOR_SIZE) as usize;
        let mut buf = vec![0; chunk_len];
        let mut offset = u64::from(transfer.offset);
        let mut remaining = transfer.length;
        while remaining > 0 {
            let len = remaining.min(chunk_len);
            let chunk = &mut buf[..len];
            file.read_exact_at(chunk, offset)?;
            data_in.write_all(chunk)?;
            offset += len as u64;
            remaining -= len;
        }
        Ok(())
    }
}

impl Medium for ImageMedium {
    fn size(&self) -> io::Result<u64> {
        match &lock(&self.state).file {
            Some(file) => Ok(file.metadata()?.len()),
            None => Ok(0),
        }
    }

    fn is_present(&self) -> bool {
        lock(&self.state).file.is_some()
    }

    fn eject(&self) -> io::Result<()> {
        let mut state = lock(&self.state);
        if state.locked {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "medium is locked in the drive",
            ));
        }
        state.file = None;
        debug!("Medium ejected");
        Ok(())
    }

    fn set_lock(&self, locked: bool) {
        lock(&self.state).locked = locked;
    }

    fn enqueue_transfer(&self, transfer: Transfer, data_in: &mut dyn Write) -> io::Result<()> {
        let state = lock(&self.state);
        let file = state
            .file
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no medium loaded"))?;

        let output = match Self::read_into(file, transfer, data_in) {
            Ok(()) => CmdOutput::ok(),
            Err(e) => {
                error!(
                    "Error reading {} bytes at offset {}: {}",
                    transfer.length,
                    u64::from(transfer.offset),
                    e
                );
                CmdOutput::check_condition(sense::UNRECOVERED_READ_ERROR)
            }
        };
        drop(state);
        self.complete(transfer.id, output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn sector_arithmetic() {
        let sectors = ByteOffset::from(700 * 1024 * 1024) / CD_SECTOR_SIZE;
        assert_eq!(u64::from(sectors), 358_400);
        assert_eq!(u64::from(SectorOffset::from(3) * CD_SECTOR_SIZE), 3 * 2048);
    }

    #[test]
    fn partial_trailing_sector_is_dropped() {
        let sectors = ByteOffset::from(2048 * 2 + 100) / CD_SECTOR_SIZE;
        assert_eq!(u64::from(sectors), 2);
    }

    fn image(sectors: u8) -> File {
        let mut file = tempfile::tempfile().unwrap();
        for i in 0..sectors {
            file.write_all(&[i; 2048]).unwrap();
        }
        file
    }

    #[test]
    fn empty_drive() {
        let medium = ImageMedium::empty();
        assert!(!medium.is_present());
        assert_eq!(medium.size().unwrap(), 0);
        let mut out = Vec::new();
        let transfer = Transfer {
            id: 1,
            direction: TransferDirection::Read,
            offset: ByteOffset::from(0),
            length: 2048,
        };
        assert_eq!(
            medium
                .enqueue_transfer(transfer, &mut out)
                .unwrap_err()
                .kind(),
            io::ErrorKind::NotFound
        );
        assert!(medium.take_completions().is_empty());
    }

    #[test]
    fn read_queues_completion() {
        let medium = ImageMedium::new(image(4));
        assert_eq!(medium.size().unwrap(), 4 * 2048);

        let mut out = Vec::new();
        let transfer = Transfer {
            id: 7,
            direction: TransferDirection::Read,
            offset: ByteOffset::from(2048),
            length: 2 * 2048,
        };
        medium.enqueue_transfer(transfer, &mut out).unwrap();
        assert_eq!(out.len(), 2 * 2048);
        assert!(out[..2048].iter().all(|&b| b == 1));
        assert!(out[2048..].iter().all(|&b| b == 2));

        assert_eq!(
            medium.take_completions(),
            [Completion {
                id: 7,
                output: CmdOutput::ok()
            }]
        );
        assert!(medium.take_completions().is_empty());
    }

    #[test]
    fn read_past_end_fails_asynchronously() {
        let medium = ImageMedium::new(image(1));
        let mut out = Vec::new();
        let transfer = Transfer {
            id: 3,
            direction: TransferDirection::Read,
            offset: ByteOffset::from(2048),
            length: 2048,
        };
        medium.enqueue_transfer(transfer, &mut out).unwrap();
        assert_eq!(
            medium.take_completions(),
            [Completion {
                id: 3,
                output: CmdOutput::check_condition(sense::UNRECOVERED_READ_ERROR)
            }]
        );
    }

    #[test]
    fn locked_medium_stays() {
        let medium = ImageMedium::new(image(1));
        medium.set_lock(true);
        assert!(medium.eject().is_err());
        assert!(medium.is_present());
        medium.set_lock(false);
        medium.eject().unwrap();
        assert!(!medium.is_present());
    }
}
