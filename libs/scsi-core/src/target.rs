//! Per-LUN state and command execution, grounded on
//! `usbd_scsi::scsi::commands::{inquiry, mode_sense, read, write}`'s
//! fixed-layout response building, composed with the `media` crate's
//! `ImageStore`/cue `Track` list/`PrefetchCache`/`TargetMedia` rather than
//! `usbd_scsi::block_device::BlockDevice`'s single fixed-size-block
//! abstraction, since a CD-ROM target's blocks vary by track.

use heapless::Vec;
use media::{cue::Track, manager::TargetMedia, ImageError, ImageStore, PrefetchCache};
use scsi_proto::error::Error as ScsiError;
use scsi_proto::AdditionalSenseCode;

use crate::command::{Command, ReadCd, ReadToc, ReadWrite, StartStopUnit};
use crate::sense::build_sense_data;

pub const MAX_RESPONSE: usize = 256;

/// What to do with the bytes a DATA OUT phase receives, as an explicit
/// discriminant rather than a stashed function pointer (the REDESIGN FLAG
/// on `TransferDescriptor`'s continuation hooks in spec.md §9): the
/// sequencer drains the phase regardless, then matches on this to decide
/// whether the bytes need interpreting afterward.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PostDataOut {
    None,
    /// FORMAT UNIT's defect-list header; spec.md §4.8 treats the whole
    /// defect list as a skip, so the sequencer discards these bytes too.
    FormatUnitHeader,
    FormatUnitPattern,
    ModeSelect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Good,
    CheckCondition(ScsiError),
    DataIn(Vec<u8, MAX_RESPONSE>),
    /// Block-granular read; the phase sequencer drives the actual SD/PIO
    /// transfer for `blocks` blocks starting at `lba` once this returns.
    BlockRead { lba: u32, blocks: u32 },
    /// READ CD: like `BlockRead`, but the sequencer Red-Book-formats each
    /// sector via `Target::format_cd_sector` instead of streaming raw
    /// image bytes, per spec.md §4.6.
    BlockReadCd { lba: u32, blocks: u32 },
    BlockWrite { lba: u32, blocks: u32 },
    /// A DATA OUT phase of `length` bytes follows; `continuation` says what
    /// (if anything) to do with them once received.
    DataOut { length: u16, continuation: PostDataOut },
}

fn data_in(bytes: &[u8]) -> Outcome {
    let mut v: Vec<u8, MAX_RESPONSE> = Vec::new();
    let _ = v.extend_from_slice(bytes);
    Outcome::DataIn(v)
}

fn image_error_to_scsi(e: ImageError) -> ScsiError {
    match e {
        ImageError::OutOfRange | ImageError::NotBlockAligned | ImageError::InvalidSpec => ScsiError::lba_out_of_range(),
        ImageError::ReadOnly => ScsiError::write_failed(),
        ImageError::Io => ScsiError::unrecovered_read_error(),
    }
}

pub struct Target {
    pub media: TargetMedia,
    pub image: ImageStore,
    pub tracks: Vec<Track, 99>,
    pub prefetch: PrefetchCache,
    pub block_size: u32,
    last_sense: Option<ScsiError>,
}

impl Target {
    pub fn new(media: TargetMedia, image: ImageStore, tracks: Vec<Track, 99>) -> Self {
        let block_size = image.block_size();
        Target { media, image, tracks, prefetch: PrefetchCache::new(), block_size, last_sense: None }
    }

    fn fail(&mut self, e: ScsiError) -> Outcome {
        log::debug!("target {}: check condition, sense {:?}/{:?}", self.media.target_id, e.sense_key, e.asc);
        self.last_sense = Some(e);
        Outcome::CheckCondition(e)
    }

    fn track_for_lba(&self, lba: u32) -> Option<&Track> {
        self.tracks.iter().rev().find(|t| t.data_start_lba <= lba)
    }

    fn last_lba(&self) -> u32 {
        let total_blocks = (self.image.size() / self.block_size.max(1) as u64) as u32;
        total_blocks.saturating_sub(1)
    }

    /// Checks readiness (ejected / pending UNIT ATTENTION) the way every
    /// command implicitly does before its own handling runs, per spec.md
    /// §4.7.
    fn check_ready(&mut self) -> Option<Outcome> {
        if self.media.unit_attention_pending {
            self.media.unit_attention_pending = false;
            return Some(self.fail(ScsiError::new(scsi_proto::SenseKey::UnitAttention, AdditionalSenseCode::MediumMayHaveChanged)));
        }
        if self.media.reports_not_ready() {
            return Some(self.fail(ScsiError::medium_not_present()));
        }
        None
    }

    pub fn dispatch(&mut self, cmd: &Command) -> Outcome {
        // INQUIRY and REQUEST SENSE must answer even while not ready; every
        // other command checks readiness first per spec.md §4.7.
        if !matches!(cmd, Command::Inquiry { .. } | Command::RequestSense { .. } | Command::GetEventStatusNotification { .. }) {
            if let Some(o) = self.check_ready() {
                return o;
            }
        }
        match *cmd {
            Command::TestUnitReady => Outcome::Good,
            Command::RequestSense { .. } => data_in(&build_sense_data(self.take_sense())),
            Command::Inquiry { .. } => data_in(&self.inquiry()),
            Command::ReadCapacity => data_in(&media::cdrom::build_read_capacity10(self.last_lba())),
            Command::Read(rw) => self.handle_read(rw),
            Command::Write(rw) => self.handle_write(rw),
            Command::SeekSix { lba } => {
                if lba > self.last_lba() {
                    self.fail(ScsiError::lba_out_of_range())
                } else {
                    Outcome::Good
                }
            }
            Command::ModeSense(ms) => data_in(&self.mode_sense(ms.page_code)),
            Command::ModeSelect { parameter_list_length } => {
                if parameter_list_length == 0 {
                    Outcome::Good
                } else {
                    Outcome::DataOut { length: parameter_list_length, continuation: PostDataOut::ModeSelect }
                }
            }
            Command::StartStopUnit(ssu) => self.handle_start_stop(ssu),
            Command::ReadFormatCapacities => data_in(&self.read_format_capacities()),
            Command::ReportLuns => data_in(&self.report_luns()),
            Command::PreventAllowMediumRemoval { .. } => Outcome::Good,
            Command::SynchronizeCache => Outcome::Good,
            Command::Verify => Outcome::Good,
            Command::Format { fmtdata } => {
                if fmtdata {
                    // Defect-list header only; spec.md §4.8 treats the whole
                    // list as a skip so its declared length is never read.
                    Outcome::DataOut { length: 4, continuation: PostDataOut::FormatUnitHeader }
                } else {
                    Outcome::Good
                }
            }
            Command::SendDiagnostic => Outcome::Good,
            Command::ReadToc(rt) => self.handle_read_toc(rt),
            Command::ReadCd(rc) => self.handle_read_cd(rc),
            Command::GetEventStatusNotification { .. } => data_in(&self.get_event_status()),
            Command::MechanismStatus => data_in(&media::cdrom::build_mechanism_status()),
            Command::ReadSubChannel { .. } => data_in(&self.read_subchannel()),
            Command::ReadHeader { lba, msf } => self.handle_read_header(lba, msf),
            Command::GetConfiguration { .. } => data_in(&media::cdrom::build_get_configuration(self.media.is_cdrom)),
            Command::ReadDiscInformation { .. } => data_in(&self.disc_information()),
            Command::ReadTrackInformation { track_number, .. } => self.handle_read_track_information(track_number),
            Command::SetCdSpeed => Outcome::Good,
        }
    }

    fn inquiry(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[0] = if self.media.is_cdrom { 0x05 } else { 0x00 }; // peripheral device type
        out[2] = 0x02; // SPC-2 version
        out[4] = 31; // additional length
        out[8..16].copy_from_slice(b"BSCSI-RS");
        out[16..32].copy_from_slice(b"Virtual Disk/CD-ROM     ");
        out[32..36].copy_from_slice(b"1.0 ");
        out
    }

    fn mode_sense(&self, _page_code: u8) -> [u8; 8] {
        // Mode parameter header (4 bytes) + block descriptor (8 bytes),
        // trimmed to the common 8-byte case; page data itself is omitted
        // since no target config needs writable mode pages today.
        let mut out = [0u8; 8];
        out[0] = 7; // mode data length
        out[3] = 8; // block descriptor length
        out[5..8].copy_from_slice(&self.block_size.to_be_bytes()[1..4]);
        out
    }

    fn read_format_capacities(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[3] = 8; // capacity list length
        out[4..8].copy_from_slice(&(self.last_lba() + 1).to_be_bytes());
        out[8] = 0x02; // formatted media
        out[9..12].copy_from_slice(&self.block_size.to_be_bytes()[1..4]);
        out
    }

    fn report_luns(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[3] = 8; // LUN list length
        out
    }

    fn handle_start_stop(&mut self, ssu: StartStopUnit) -> Outcome {
        if ssu.load_eject && !ssu.start {
            self.prefetch.invalidate();
        }
        Outcome::Good
    }

    fn handle_read(&mut self, rw: ReadWrite) -> Outcome {
        if rw.lba + rw.blocks > self.last_lba() + 1 {
            return self.fail(ScsiError::lba_out_of_range());
        }
        if self.media.is_cdrom {
            if let Some(track) = self.track_for_lba(rw.lba) {
                if track.mode == media::TrackMode::Audio {
                    return self.fail(ScsiError::illegal_mode_for_track());
                }
            }
        }
        Outcome::BlockRead { lba: rw.lba, blocks: rw.blocks }
    }

    fn handle_write(&mut self, rw: ReadWrite) -> Outcome {
        if !self.image.is_writable() {
            return self.fail(ScsiError::write_failed());
        }
        if rw.lba + rw.blocks > self.last_lba() + 1 {
            return self.fail(ScsiError::lba_out_of_range());
        }
        self.prefetch.invalidate();
        Outcome::BlockWrite { lba: rw.lba, blocks: rw.blocks }
    }

    fn handle_read_toc(&mut self, rt: ReadToc) -> Outcome {
        let toc = match rt.format {
            0 => media::cdrom::build_toc_format0(&self.tracks, self.image.size(), rt.msf),
            1 => {
                let small = media::cdrom::build_toc_format1(&self.tracks, rt.msf);
                let mut v: Vec<u8, MAX_RESPONSE> = Vec::new();
                let _ = v.extend_from_slice(&small);
                v
            }
            _ => return self.fail(ScsiError::invalid_field_in_cdb()),
        };
        let mut out: Vec<u8, MAX_RESPONSE> = Vec::new();
        let take = toc.len().min(rt.allocation_length as usize).min(MAX_RESPONSE);
        let _ = out.extend_from_slice(&toc[..take]);
        Outcome::DataIn(out)
    }

    fn handle_read_cd(&mut self, rc: ReadCd) -> Outcome {
        if rc.lba + rc.count > self.last_lba() + 1 {
            return self.fail(ScsiError::lba_out_of_range());
        }
        Outcome::BlockReadCd { lba: rc.lba, blocks: rc.count }
    }

    /// Reads one cooked sector at `lba` and Red-Book-formats it into a full
    /// 2352-byte frame via `media::cdrom::format_sector`, per spec.md §4.6.
    /// The sequencer owns the `MediaIo` backend, not `Target`, so it's
    /// threaded through as a parameter.
    ///
    /// Audio-track LBAs are rejected: this target addresses its backing
    /// image with one uniform `block_size` (see `handle_read`'s same
    /// restriction for plain READ), which never matches an audio track's
    /// raw 2352-byte-per-sector layout, so READ CD can only serve Mode 1
    /// data sectors under this Target's addressing model.
    pub fn format_cd_sector(
        &mut self,
        io: &mut impl media::MediaIo,
        lba: u32,
        out: &mut [u8; media::cdrom::SECTOR_SIZE_RAW],
    ) -> Result<(), ScsiError> {
        let track = match self.track_for_lba(lba) {
            Some(t) => *t,
            None => return Err(self.record_scsi_error(ScsiError::lba_out_of_range())),
        };
        if track.mode == media::TrackMode::Audio {
            return Err(self.record_scsi_error(ScsiError::illegal_mode_for_track()));
        }
        let block_size = self.block_size.max(1) as u64;
        let mut user = [0u8; media::cdrom::SECTOR_SIZE_COOKED];
        self.image.seek(lba as u64 * block_size).map_err(|e| self.record_io_error(e))?;
        self.image.read(io, &mut user).map_err(|e| self.record_io_error(e))?;
        media::cdrom::format_sector(&track, lba as i64, &user, out).map_err(|e| self.record_scsi_error(e))
    }

    fn get_event_status(&self) -> [u8; 6] {
        let (event_code, media_present) = if self.media.ejected {
            (0x03, false)
        } else if self.media.unit_attention_pending {
            (0x02, true)
        } else {
            (0x00, true)
        };
        media::cdrom::build_media_event(event_code, media_present)
    }

    fn read_subchannel(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        if let Some(track) = self.track_for_lba(0) {
            media::cdrom::format_q_subchannel(track, 0, &mut out);
        }
        out
    }

    fn handle_read_header(&mut self, lba: u32, msf: bool) -> Outcome {
        match self.track_for_lba(lba) {
            Some(track) => data_in(&media::cdrom::build_read_header(track, lba as i64, msf)),
            None => self.fail(ScsiError::lba_out_of_range()),
        }
    }

    fn disc_information(&self) -> [u8; 34] {
        let first = self.tracks.first().map(|t| t.number).unwrap_or(1);
        let last = self.tracks.last().map(|t| t.number).unwrap_or(1);
        media::cdrom::build_disc_information(first, last)
    }

    fn handle_read_track_information(&mut self, track_number: u8) -> Outcome {
        match self.tracks.iter().find(|t| t.number == track_number) {
            Some(track) => {
                let leadout = media::cdrom::leadout_lba(&self.tracks, self.image.size());
                data_in(&media::cdrom::build_track_information(track, leadout))
            }
            None => self.fail(ScsiError::invalid_field_in_cdb()),
        }
    }

    /// Called once a DATA OUT phase started by `Outcome::DataOut` has been
    /// fully drained. FORMAT UNIT's defect list and MODE SELECT's mode
    /// pages are both accepted and discarded rather than interpreted
    /// (no target config is writable at runtime today), so every
    /// continuation just reports success.
    pub fn complete_data_out(&mut self, _continuation: PostDataOut) -> Outcome { Outcome::Good }

    pub fn take_sense(&mut self) -> Option<ScsiError> { self.last_sense.take() }

    /// Peeks whether a sense triple is latched, without consuming it; used
    /// to pick the STATUS byte. REQUEST SENSE (`take_sense`) stays the only
    /// consumer, so the sense survives until the initiator actually asks
    /// for it, per spec.md §6.
    pub fn has_sense(&self) -> bool { self.last_sense.is_some() }

    /// Latches an I/O failure observed by the phase sequencer mid-transfer
    /// (the sequencer owns the `MediaIo` backend, not this struct).
    pub fn record_io_error(&mut self, e: ImageError) -> ScsiError {
        let mapped = image_error_to_scsi(e);
        self.last_sense = Some(mapped);
        mapped
    }

    fn record_scsi_error(&mut self, e: ScsiError) -> ScsiError {
        self.last_sense = Some(e);
        e
    }

    /// Latches a SCSI bus parity error observed by the phase sequencer
    /// during a DATA OUT phase; per spec.md §4.8 this ends the command in
    /// CHECK CONDITION with the sticky 0B/47/00 triple rather than
    /// aborting the whole command loop.
    pub fn record_parity_error(&mut self) {
        log::debug!("target {}: scsi parity error during data out", self.media.target_id);
        self.last_sense = Some(ScsiError::scsi_parity_error());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media::manager::TargetMedia;

    fn disk_target() -> Target {
        let image = ImageStore::open("disk.img", 512, 512 * 100, false).unwrap();
        Target::new(TargetMedia::new(0, false), image, Vec::new())
    }

    #[test]
    fn inquiry_reports_disk_peripheral_type() {
        let mut t = disk_target();
        let out = t.dispatch(&Command::Inquiry { allocation_length: 36 });
        let Outcome::DataIn(bytes) = out else { panic!("expected data-in") };
        assert_eq!(bytes[0], 0x00);
    }

    #[test]
    fn read_past_capacity_is_rejected() {
        let mut t = disk_target();
        let out = t.dispatch(&Command::Read(ReadWrite { lba: 99, blocks: 5 }));
        assert_eq!(out, Outcome::CheckCondition(ScsiError::lba_out_of_range()));
    }

    #[test]
    fn read_within_capacity_yields_block_read() {
        let mut t = disk_target();
        let out = t.dispatch(&Command::Read(ReadWrite { lba: 0, blocks: 1 }));
        assert_eq!(out, Outcome::BlockRead { lba: 0, blocks: 1 });
    }

    #[test]
    fn ejected_target_reports_not_ready_for_test_unit_ready() {
        let mut t = disk_target();
        t.media.ejected = true;
        let out = t.dispatch(&Command::TestUnitReady);
        assert_eq!(out, Outcome::CheckCondition(ScsiError::medium_not_present()));
    }

    #[test]
    fn format_unit_with_fmtdata_requests_a_data_out_phase() {
        let mut t = disk_target();
        let out = t.dispatch(&Command::Format { fmtdata: true });
        assert_eq!(out, Outcome::DataOut { length: 4, continuation: PostDataOut::FormatUnitHeader });
    }

    #[test]
    fn format_unit_without_fmtdata_completes_immediately() {
        let mut t = disk_target();
        let out = t.dispatch(&Command::Format { fmtdata: false });
        assert_eq!(out, Outcome::Good);
    }

    #[test]
    fn mode_select_with_parameters_requests_a_data_out_phase() {
        let mut t = disk_target();
        let out = t.dispatch(&Command::ModeSelect { parameter_list_length: 12 });
        assert_eq!(out, Outcome::DataOut { length: 12, continuation: PostDataOut::ModeSelect });
    }

    #[test]
    fn write_invalidates_prefetch_cache() {
        let mut t = disk_target();
        t.prefetch.fill(0, 0, &[[0xAB; 2048]]);
        let _ = t.dispatch(&Command::Write(ReadWrite { lba: 0, blocks: 1 }));
        assert!(t.prefetch.take(0, 0, 1).is_none());
    }

    #[test]
    fn read_cd_within_capacity_yields_block_read_cd() {
        let mut t = disk_target();
        let out = t.dispatch(&Command::ReadCd(ReadCd { lba: 0, count: 1 }));
        assert_eq!(out, Outcome::BlockReadCd { lba: 0, blocks: 1 });
    }

    #[test]
    fn get_event_status_reports_removal_when_ejected() {
        let mut t = disk_target();
        t.media.ejected = true;
        let out = t.dispatch(&Command::GetEventStatusNotification { allocation_length: 8 });
        let Outcome::DataIn(bytes) = out else { panic!("expected data-in") };
        assert_eq!(bytes[4], 0x03);
    }

    #[test]
    fn get_event_status_answers_even_while_ejected() {
        // Unlike most commands, GET EVENT STATUS NOTIFICATION must not be
        // rejected with NOT READY while ejected, per spec.md §4.7.
        let mut t = disk_target();
        t.media.ejected = true;
        let out = t.dispatch(&Command::GetEventStatusNotification { allocation_length: 8 });
        assert!(matches!(out, Outcome::DataIn(_)));
    }

    #[test]
    fn mechanism_status_reports_single_slot_no_changer() {
        let mut t = disk_target();
        let out = t.dispatch(&Command::MechanismStatus);
        let Outcome::DataIn(bytes) = out else { panic!("expected data-in") };
        assert_eq!(&bytes[..], &[0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn read_track_information_rejects_unknown_track() {
        let mut t = disk_target();
        let out = t.dispatch(&Command::ReadTrackInformation { track_number: 9, allocation_length: 36 });
        assert_eq!(out, Outcome::CheckCondition(ScsiError::invalid_field_in_cdb()));
    }
}
