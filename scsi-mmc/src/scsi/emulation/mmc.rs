// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
};

use log::{debug, error, warn};
use thiserror::Error as ThisError;

use super::{
    command::{runs_when_not_ready, Cdb, Command, ModeSensePageControl, ParseError, SenseFormat},
    dvd_structure::read_dvd_structure,
    features::configuration,
    media_event::{MediaEventState, MediaEventStatus, MediaTrackType},
    medium::{
        ByteOffset, Medium, SectorOffset, SectorSize, Transfer, TransferDirection, CD_SECTOR_SIZE,
    },
    mode_page::{mode_sense_data, ModePage},
    response_data::{
        disc_information, mechanism_status, read_capacity_10, read_capacity_16,
        standard_inquiry_data, supported_vpd_pages, track_information, SilentlyTruncate,
    },
    toc::{self, TocFormat},
    LogicalUnit,
};
use crate::scsi::{
    sense::{self, SenseTriple},
    CmdError, CmdOutput, Disposition, LunRequest,
};

/// Identity the unit reports in its INQUIRY data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmcConfig {
    pub vendor: String,
    pub product: String,
    pub revision: String,
}

impl Default for MmcConfig {
    fn default() -> Self {
        Self {
            vendor: "VBOX".into(),
            product: "CD-ROM".into(),
            revision: "1.0".into(),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum LunError {
    #[error("Failed to query medium size: {0}")]
    MediumQuery(io::Error),
}

/// Media state touched both by commands and by medium change notifications.
#[derive(Debug)]
struct MediaState {
    events: MediaEventState,
    track_type: AtomicU8,
    total_sectors: AtomicU64,
    ready: AtomicBool,
}

impl MediaState {
    fn total_sectors(&self) -> u64 {
        self.total_sectors.load(Ordering::Acquire)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    fn track_type(&self) -> MediaTrackType {
        MediaTrackType::try_from(self.track_type.load(Ordering::Acquire))
            .unwrap_or(MediaTrackType::Unknown)
    }

    fn set_track_type(&self, track_type: MediaTrackType) {
        self.track_type.store(track_type as u8, Ordering::Release);
    }
}

fn sectors_of(medium: &impl Medium, sector_size: SectorSize) -> Result<u64, LunError> {
    let size = medium.size().map_err(|e| {
        error!("Failed to query medium size: {e}");
        LunError::MediumQuery(e)
    })?;
    Ok(u64::from(ByteOffset::from(size) / sector_size))
}

fn medium_inserted(medium: &impl Medium, state: &MediaState) -> Result<(), LunError> {
    let sectors = sectors_of(medium, CD_SECTOR_SIZE)?;
    // the event is published last: a poll that sees it may set ready again
    state.set_ready(false);
    state.total_sectors.store(sectors, Ordering::Release);
    state.set_track_type(MediaTrackType::Unknown);
    state.events.medium_inserted();
    debug!("Medium inserted, {sectors} sectors");
    Ok(())
}

fn medium_removed(state: &MediaState) {
    state.set_ready(false);
    state.set_track_type(MediaTrackType::NoDisc);
    state.events.medium_removed();
    debug!("Medium removed");
}

/// Reports medium changes to an [`MmcLun`]. Can be cloned and used from any
/// thread, independently of the command path.
pub struct MediumNotifier<M: Medium> {
    medium: Arc<M>,
    state: Arc<MediaState>,
}

impl<M: Medium> Clone for MediumNotifier<M> {
    fn clone(&self) -> Self {
        Self {
            medium: Arc::clone(&self.medium),
            state: Arc::clone(&self.state),
        }
    }
}

impl<M: Medium> MediumNotifier<M> {
    /// A new medium was loaded. If querying its size fails, nothing changes.
    pub fn medium_inserted(&self) -> Result<(), LunError> {
        medium_inserted(&*self.medium, &self.state)
    }

    pub fn medium_removed(&self) {
        medium_removed(&self.state);
    }
}

/// An emulated CD/DVD-ROM drive.
pub struct MmcLun<M: Medium> {
    medium: Arc<M>,
    state: Arc<MediaState>,
    sector_size: SectorSize,
    locked: bool,
    config: MmcConfig,
}

impl<M: Medium> MmcLun<M> {
    /// Set up the unit around `medium`, which may be empty. The unit starts
    /// out not ready, so the first command reports the medium as changed.
    pub fn init(medium: Arc<M>, config: MmcConfig) -> Result<Self, LunError> {
        let sector_size = CD_SECTOR_SIZE;
        let total_sectors = sectors_of(&*medium, sector_size)?;
        debug!("Initializing MMC unit with {total_sectors} sectors");

        let state = MediaState {
            events: MediaEventState::new(MediaEventStatus::Unchanged),
            track_type: AtomicU8::new(MediaTrackType::Unknown as u8),
            total_sectors: AtomicU64::new(total_sectors),
            ready: AtomicBool::new(false),
        };

        Ok(Self {
            medium,
            state: Arc::new(state),
            sector_size,
            locked: false,
            config,
        })
    }

    /// Tear the unit down. The medium belongs to the framework and is left
    /// as it is.
    pub fn destroy(self) {
        debug!("Destroying MMC unit");
    }

    pub fn notifier(&self) -> MediumNotifier<M> {
        MediumNotifier {
            medium: Arc::clone(&self.medium),
            state: Arc::clone(&self.state),
        }
    }

    pub fn total_sectors(&self) -> u64 {
        self.state.total_sectors()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn media_event_status(&self) -> MediaEventStatus {
        self.state.events.load()
    }

    pub fn track_type(&self) -> MediaTrackType {
        self.state.track_type()
    }

    /// Answer a command that arrived while the unit is not ready. With a
    /// medium in the drive, this is where the guest learns it changed.
    fn not_ready(&self) -> CmdOutput {
        if self.medium.is_present() {
            debug!("Reporting medium change");
            self.state.set_ready(true);
            CmdOutput::check_condition(sense::MEDIUM_MAY_HAVE_CHANGED)
        } else {
            CmdOutput::check_condition(sense::MEDIUM_NOT_PRESENT)
        }
    }

    fn sector_bytes(&self) -> u64 {
        u64::from(u32::from(self.sector_size))
    }

    fn read(&self, req: &mut LunRequest<'_>, lba: u64, transfer_length: u32) -> Disposition {
        let bytes = u64::from(transfer_length) * self.sector_bytes();
        // usize is at least 64 bits wide on every target we build for
        let bytes = usize::try_from(bytes).unwrap_or(usize::MAX);
        req.set_xfer_size(bytes);

        let total = self.state.total_sectors();
        if !matches!(lba.checked_add(u64::from(transfer_length)), Some(end) if end <= total) {
            warn!(
                "Read of {transfer_length} sectors at LBA {lba} is past the end ({total} sectors)"
            );
            return Disposition::Complete(CmdOutput::check_condition(
                sense::LOGICAL_BLOCK_ADDRESS_OUT_OF_RANGE,
            ));
        }
        if transfer_length == 0 {
            return Disposition::Complete(CmdOutput::ok());
        }

        let transfer = Transfer {
            id: req.id,
            direction: TransferDirection::Read,
            offset: SectorOffset::from(lba) * self.sector_size,
            length: bytes,
        };
        match self.medium.enqueue_transfer(transfer, &mut *req.data_in) {
            Ok(()) => Disposition::Enqueued,
            Err(e) => {
                error!("Error starting read of {transfer_length} sectors at LBA {lba}: {e}");
                Disposition::Complete(CmdOutput::check_condition(sense::UNRECOVERED_READ_ERROR))
            }
        }
    }

    fn mode_sense(
        &self,
        pc: ModeSensePageControl,
        page_code: u8,
        long: bool,
    ) -> Result<Vec<u8>, SenseTriple> {
        match pc {
            ModeSensePageControl::Current => (),
            ModeSensePageControl::Changeable | ModeSensePageControl::Default => {
                warn!("Page control {pc:?} not supported");
                return Err(sense::INVALID_FIELD_IN_CDB);
            }
            ModeSensePageControl::Saved => return Err(sense::SAVING_PARAMETERS_NOT_SUPPORTED),
        }

        let pages = ModePage::select(page_code).ok_or_else(|| {
            warn!("Unsupported mode page {page_code:#x}");
            sense::INVALID_FIELD_IN_CDB
        })?;
        Ok(mode_sense_data(pages, long, self.state.track_type() as u8, self.locked))
    }

    fn start_stop_unit(&self, load_eject: bool, start: bool) -> Result<Vec<u8>, SenseTriple> {
        if load_eject && !start {
            if let Err(e) = self.medium.eject() {
                warn!("Eject failed: {e}");
                return Err(sense::MEDIUM_REMOVAL_PREVENTED);
            }
            medium_removed(&self.state);
        }
        Ok(Vec::new())
    }

    fn read_toc(&self, format: u8, msf: bool, track: u8) -> Result<Vec<u8>, SenseTriple> {
        let total = self.state.total_sectors();
        match TocFormat::try_from(format) {
            Ok(TocFormat::Normal) => {
                if !toc::valid_start_track(track) {
                    warn!("Invalid starting track {track} for READ TOC");
                    return Err(sense::INVALID_FIELD_IN_CDB);
                }
                Ok(toc::normal(total, msf, track))
            }
            Ok(TocFormat::MultiSession) => Ok(toc::multi_session(msf)),
            Ok(TocFormat::Raw) => Ok(toc::raw(total, msf)),
            Err(_) => {
                warn!("Unsupported READ TOC format {format}");
                Err(sense::INVALID_FIELD_IN_CDB)
            }
        }
    }

    /// Run a command that doesn't start a transfer. Returns the full response
    /// data, or the sense to report.
    fn execute(&mut self, command: Command) -> Result<Vec<u8>, SenseTriple> {
        let total = self.state.total_sectors();

        match command {
            // reads are dispatched before getting here
            Command::TestUnitReady | Command::Read { .. } => Ok(Vec::new()),
            Command::RequestSense(format) => match format {
                SenseFormat::Fixed => Ok(sense::NO_ADDITIONAL_SENSE_INFORMATION.to_fixed_sense()),
                SenseFormat::Descriptor => {
                    warn!("Descriptor format sense data not supported");
                    Err(sense::INVALID_FIELD_IN_CDB)
                }
            },
            Command::Inquiry { evpd, page_code } => match (evpd, page_code) {
                (false, 0) => Ok(standard_inquiry_data(&self.config)),
                (true, 0) => Ok(supported_vpd_pages()),
                _ => {
                    warn!("Unsupported INQUIRY page {page_code:#x} (EVPD {evpd})");
                    Err(sense::INVALID_FIELD_IN_CDB)
                }
            },
            // no changeable parameters, so anything sent is dropped
            Command::ModeSelect6 => Ok(Vec::new()),
            Command::ModeSense6 { pc, page_code } => self.mode_sense(pc, page_code, false),
            Command::ModeSense10 { pc, page_code } => self.mode_sense(pc, page_code, true),
            Command::StartStopUnit { load_eject, start } => self.start_stop_unit(load_eject, start),
            Command::PreventAllowMediumRemoval { prevent } => {
                debug!("Medium removal {}", if prevent { "prevented" } else { "allowed" });
                self.locked = prevent;
                self.medium.set_lock(prevent);
                Ok(Vec::new())
            }
            Command::ReadCapacity10 => Ok(read_capacity_10(total, u32::from(self.sector_size))),
            Command::ReadCapacity16 => Ok(read_capacity_16(total, u32::from(self.sector_size))),
            Command::Seek10 { lba } => {
                if u64::from(lba) > total {
                    return Err(sense::LOGICAL_BLOCK_ADDRESS_OUT_OF_RANGE);
                }
                Ok(Vec::new())
            }
            Command::Verify10 {
                lba,
                verification_length,
            } => {
                if u64::from(lba) + u64::from(verification_length) > total {
                    return Err(sense::LOGICAL_BLOCK_ADDRESS_OUT_OF_RANGE);
                }
                Ok(Vec::new())
            }
            Command::ReadBuffer { mode } => match mode {
                // descriptor: no buffer, no offset boundary
                0x0b => Ok(vec![0; 4]),
                0x00..=0x03 | 0x0a | 0x1a | 0x1c => Ok(Vec::new()),
                _ => {
                    warn!("Unsupported READ BUFFER mode {mode:#x}");
                    Err(sense::INVALID_FIELD_IN_CDB)
                }
            },
            Command::ReadToc { format, msf, track } => self.read_toc(format, msf, track),
            Command::GetConfiguration {
                rt,
                starting_feature,
            } => {
                if rt == 0b11 || starting_feature != 0 {
                    warn!(
                        "Unsupported GET CONFIGURATION (RT {rt}, starting at {starting_feature:#x})"
                    );
                    return Err(sense::INVALID_FIELD_IN_CDB);
                }
                Ok(configuration(total))
            }
            Command::GetEventStatusNotification {
                polled,
                class_request,
            } => {
                if !polled {
                    warn!("Asynchronous event notification not supported");
                    return Err(sense::INVALID_FIELD_IN_CDB);
                }
                let transition = self.state.events.poll();
                debug!(
                    "Event status poll (classes {class_request:#x}): now {:?}",
                    transition.next
                );
                if transition.becomes_ready {
                    self.state.set_ready(true);
                }
                Ok(transition.reply.to_vec())
            }
            Command::LogSense {
                page_code,
                subpage_code,
            } => {
                if page_code != 0 || subpage_code != 0 {
                    warn!("Unsupported log page {page_code:#x}/{subpage_code:#x}");
                    return Err(sense::INVALID_FIELD_IN_CDB);
                }
                // supported pages: none
                Ok(vec![0; 4])
            }
            Command::ReadDiscInformation => Ok(disc_information()),
            Command::ReadTrackInformation {
                address_type,
                address,
            } => {
                // only track number 1, addressed by track number
                if address_type != 1 || address != 1 {
                    warn!("Unsupported track {address} (address type {address_type})");
                    return Err(sense::INVALID_FIELD_IN_CDB);
                }
                Ok(track_information(total))
            }
            Command::ReadDvdStructure {
                media_type,
                layer,
                format,
            } => {
                if media_type != 0 {
                    warn!("Unsupported DVD structure media type {media_type}");
                    return Err(sense::INVALID_FIELD_IN_CDB);
                }
                read_dvd_structure(format, layer, total)
            }
            Command::MechanismStatus => Ok(mechanism_status()),
        }
    }
}

impl<M: Medium> LogicalUnit for MmcLun<M> {
    fn process_request(&mut self, req: &mut LunRequest<'_>) -> Result<Disposition, CmdError> {
        let opcode = *req.cdb.first().ok_or(CmdError::CdbTooShort)?;

        if !self.state.is_ready() && !runs_when_not_ready(opcode) {
            return Ok(Disposition::Complete(self.not_ready()));
        }

        let cdb = match Cdb::parse(req.cdb) {
            Ok(cdb) => cdb,
            Err(ParseError::InvalidCommand) => {
                warn!("Unknown opcode {opcode:#x}");
                return Ok(Disposition::Complete(CmdOutput::check_condition(
                    sense::INVALID_COMMAND_OPERATION_CODE,
                )));
            }
            Err(ParseError::InvalidField) => {
                warn!("Invalid field in CDB for opcode {opcode:#x}");
                return Ok(Disposition::Complete(CmdOutput::check_condition(
                    sense::INVALID_FIELD_IN_CDB,
                )));
            }
            Err(ParseError::TooSmall) => return Err(CmdError::CdbTooShort),
        };

        debug!("Incoming command {:?}", cdb.command);

        if let Command::Read {
            lba,
            transfer_length,
        } = cdb.command
        {
            return Ok(self.read(req, lba, transfer_length));
        }

        let allocation_length = cdb.allocation_length.map_or(0, |len| len as usize);
        req.set_xfer_size(allocation_length);

        let output = match self.execute(cdb.command) {
            Ok(data) => {
                let mut data_in = SilentlyTruncate::new(&mut *req.data_in, allocation_length);
                data_in.write_all(&data).map_err(|e| {
                    error!("Error writing response to data in: {e}");
                    CmdError::DataIn(e)
                })?;
                CmdOutput::ok()
            }
            Err(sense) => CmdOutput::check_condition(sense),
        };
        Ok(Disposition::Complete(output))
    }

    fn medium_inserted(&self) -> Result<(), LunError> {
        medium_inserted(&*self.medium, &self.state)
    }

    fn medium_removed(&self) {
        medium_removed(&self.state);
    }
}
