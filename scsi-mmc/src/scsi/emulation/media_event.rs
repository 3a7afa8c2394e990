// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

//! Media event reporting for GET EVENT STATUS NOTIFICATION.
//!
//! Medium insertion and removal are reported from outside the command path,
//! so the pending event lives in an atomic and is advanced with
//! compare-and-swap. Each poll reports the current event and moves the state
//! to the next one in a single atomic step.

use std::{
    convert::TryFrom,
    sync::atomic::{AtomicU32, Ordering},
};

use log::warn;
use num_enum::TryFromPrimitive;

/// The media event waiting to be reported to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum MediaEventStatus {
    Unchanged = 0,
    MediaNew,
    MediaRemoved,
    /// Removal followed by insertion, reported as two events in a row.
    MediaChanged,
    EjectRequested,
}

/// Track type reported in the mode parameter header's medium type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum MediaTrackType {
    Unknown = 0x00,
    NoDisc = 0x70,
}

// Media class event codes
const EVENT_NO_CHANGE: u8 = 0x00;
const EVENT_EJECT_REQUEST: u8 = 0x01;
const EVENT_NEW_MEDIA: u8 = 0x02;
const EVENT_MEDIA_REMOVAL: u8 = 0x03;

// Media status bits
const MEDIA_PRESENT: u8 = 0x02;

// notification class 4 (media)
const CLASS_MEDIA: u8 = 0x04;
// nothing pending; only the class field is set
const NO_EVENT_CLASS: u8 = 0x01;
// operational change, power management, external request, media, device busy
const SUPPORTED_CLASSES: u8 = 0x5e;

/// The outcome of reporting one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub reply: [u8; 8],
    pub next: MediaEventStatus,
    /// The unit becomes ready once the guest has seen the new medium.
    pub becomes_ready: bool,
}

const fn media_reply(event: u8, status: u8) -> [u8; 8] {
    [0, 6, CLASS_MEDIA, SUPPORTED_CLASSES, event, status, 0, 0]
}

/// Report `old` and compute the state that follows it.
pub const fn transition(old: MediaEventStatus) -> Transition {
    match old {
        MediaEventStatus::Unchanged => Transition {
            reply: [
                0,
                6,
                NO_EVENT_CLASS,
                SUPPORTED_CLASSES,
                EVENT_NO_CHANGE,
                0,
                0,
                0,
            ],
            next: MediaEventStatus::Unchanged,
            becomes_ready: false,
        },
        MediaEventStatus::MediaNew => Transition {
            reply: media_reply(EVENT_NEW_MEDIA, MEDIA_PRESENT),
            next: MediaEventStatus::Unchanged,
            becomes_ready: true,
        },
        MediaEventStatus::MediaRemoved => Transition {
            reply: media_reply(EVENT_MEDIA_REMOVAL, 0),
            next: MediaEventStatus::Unchanged,
            becomes_ready: false,
        },
        MediaEventStatus::MediaChanged => Transition {
            reply: media_reply(EVENT_MEDIA_REMOVAL, 0),
            next: MediaEventStatus::MediaNew,
            becomes_ready: false,
        },
        MediaEventStatus::EjectRequested => Transition {
            reply: media_reply(EVENT_EJECT_REQUEST, MEDIA_PRESENT),
            next: MediaEventStatus::Unchanged,
            becomes_ready: false,
        },
    }
}

/// The pending media event, shared between the command path and whoever
/// reports medium changes.
#[derive(Debug, Default)]
pub struct MediaEventState(AtomicU32);

impl MediaEventState {
    pub fn new(status: MediaEventStatus) -> Self {
        Self(AtomicU32::new(status as u32))
    }

    pub fn load(&self) -> MediaEventStatus {
        decode(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, status: MediaEventStatus) {
        self.0.store(status as u32, Ordering::Release);
    }

    /// Report the pending event and advance to its successor.
    ///
    /// Concurrent updates are never lost: if the state changes between
    /// reading it and writing the successor, the whole step is retried
    /// against the newer value.
    pub fn poll(&self) -> Transition {
        let mut seen = Transition {
            reply: [0; 8],
            next: MediaEventStatus::Unchanged,
            becomes_ready: false,
        };
        // The closure always returns Some, so fetch_update cannot fail.
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                seen = transition(decode(raw));
                Some(seen.next as u32)
            });
        seen
    }

    /// Record that a medium was inserted. A removal the guest has not yet
    /// seen turns into a change, so both halves get reported.
    pub fn medium_inserted(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                Some(match decode(raw) {
                    MediaEventStatus::MediaChanged | MediaEventStatus::MediaRemoved => {
                        MediaEventStatus::MediaChanged
                    }
                    _ => MediaEventStatus::MediaNew,
                } as u32)
            });
    }

    pub fn medium_removed(&self) {
        self.store(MediaEventStatus::MediaRemoved);
    }
}

fn decode(raw: u32) -> MediaEventStatus {
    MediaEventStatus::try_from(raw).unwrap_or_else(|_| {
        warn!("Unknown media event status {raw}, treating as unchanged");
        MediaEventStatus::Unchanged
    })
}
