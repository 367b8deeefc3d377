//! CD sector and TOC synthesis for CD-ROM targets, grounded on
//! `usbd_scsi::scsi::commands::inquiry`'s fixed-layout response building
//! (slice writes at documented byte offsets) generalized from one static
//! INQUIRY response to the family of READ/READ TOC/GET CONFIGURATION
//! responses a CD-ROM target must answer.

use crate::cue::{msf_to_lba, Track, TrackMode};
use scsi_proto::error::Error as ScsiError;

pub const SYNC_PATTERN: [u8; 12] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
pub const SECTOR_SIZE_RAW: usize = 2352;
pub const SECTOR_SIZE_COOKED: usize = 2048;

/// `mm:ss:ff`, BCD-encoded when written into TOC/subchannel fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Msf {
    pub m: u8,
    pub s: u8,
    pub f: u8,
}

fn bcd(v: u8) -> u8 { ((v / 10) << 4) | (v % 10) }

impl Msf {
    /// `lba` is absolute (lead-in already subtracted by the caller if the
    /// position came from an absolute MSF); this adds the 2-second lead-in
    /// offset back in per spec.md §4.6.
    pub fn from_lba(lba: i64) -> Msf {
        let abs = (lba + 150).max(0);
        let f = (abs % 75) as u8;
        let s = ((abs / 75) % 60) as u8;
        let m = (abs / 75 / 60) as u8;
        Msf { m, s, f }
    }

    pub fn to_lba(self) -> i64 { msf_to_lba(self.m as u32, self.s as u32, self.f as u32, true) }

    pub fn to_bcd_bytes(self) -> [u8; 3] { [bcd(self.m), bcd(self.s), bcd(self.f)] }
}

/// Synthesizes one 2352-byte raw sector from a 2048-byte user payload per
/// spec.md §4.6: 12-byte sync, 4-byte BCD-MSF + mode header, user data,
/// zero-filled ECC. Audio tracks are raw PCM end to end and carry no
/// sync/header/ECC framing, so they only accept exactly `SECTOR_SIZE_RAW`
/// bytes of caller-supplied audio and copy it through unchanged.
pub fn format_sector(track: &Track, lba: i64, user_data: &[u8], out: &mut [u8]) -> Result<(), ScsiError> {
    if out.len() != SECTOR_SIZE_RAW {
        return Err(ScsiError::invalid_field_in_cdb());
    }
    match track.mode {
        TrackMode::Audio => {
            if user_data.len() != SECTOR_SIZE_RAW {
                return Err(ScsiError::illegal_mode_for_track());
            }
            out.copy_from_slice(user_data);
        }
        TrackMode::Mode1_2048 | TrackMode::Mode1_2352 => {
            if user_data.len() != SECTOR_SIZE_COOKED {
                return Err(ScsiError::illegal_mode_for_track());
            }
            out[0..12].copy_from_slice(&SYNC_PATTERN);
            let msf = Msf::from_lba(lba).to_bcd_bytes();
            out[12..15].copy_from_slice(&msf);
            out[15] = 0x01; // mode 1
            out[16..16 + SECTOR_SIZE_COOKED].copy_from_slice(user_data);
            for b in out[16 + SECTOR_SIZE_COOKED..].iter_mut() {
                *b = 0;
            }
        }
    }
    Ok(())
}

/// Truncates a raw-mode sector down to the 2048 cooked bytes a plain
/// READ(10) on a data track expects, per spec.md §4.6's `READ(6/10/12)`
/// "implicit 2048-byte blocks" rule.
pub fn extract_cooked(mode: TrackMode, raw: &[u8]) -> Result<[u8; SECTOR_SIZE_COOKED], ScsiError> {
    match mode {
        TrackMode::Audio => Err(ScsiError::illegal_mode_for_track()),
        TrackMode::Mode1_2048 | TrackMode::Mode1_2352 => {
            let mut out = [0u8; SECTOR_SIZE_COOKED];
            out.copy_from_slice(&raw[16..16 + SECTOR_SIZE_COOKED]);
            Ok(out)
        }
    }
}

/// 16-byte Q-subchannel per spec.md §4.6: control/ADR, track, index,
/// relative MSF, absolute MSF, two (unchecked) CRC bytes, three pad bytes,
/// P-subchannel byte.
pub fn format_q_subchannel(track: &Track, absolute_lba: i64, out: &mut [u8; 16]) {
    let control_adr = if track.mode == TrackMode::Audio { 0x10 } else { 0x14 };
    let index = if (absolute_lba as i64) < track.data_start_lba as i64 { 0u8 } else { 1u8 };
    let relative_lba = absolute_lba - track.track_start_lba as i64;
    out[0] = control_adr;
    out[1] = track.number;
    out[2] = index;
    out[3..6].copy_from_slice(&Msf::from_lba(relative_lba).to_bcd_bytes());
    out[6] = 0;
    out[7..10].copy_from_slice(&Msf::from_lba(absolute_lba).to_bcd_bytes());
    out[10] = 0;
    out[11] = 0; // CRC hi, unchecked
    out[12] = 0; // CRC lo, unchecked
    out[13] = 0;
    out[14] = 0;
    out[15] = 0; // P-subchannel
}

pub fn leadout_lba(_tracks: &[Track], image_size_bytes: u64) -> u32 {
    // `doReadTOCSimple` quirk, preserved verbatim: the leadout start is
    // derived from the live image size in 2048-byte units regardless of
    // the first track's real sector size. See DESIGN.md.
    (image_size_bytes / SECTOR_SIZE_COOKED as u64) as u32
}

/// READ TOC format 0 ("simple"): one descriptor per track plus a leadout
/// descriptor (track number 0xAA), MSF or LBA addressing per `msf`.
pub fn build_toc_format0(tracks: &[Track], image_size_bytes: u64, msf: bool) -> heapless::Vec<u8, 256> {
    let mut v: heapless::Vec<u8, 256> = heapless::Vec::new();
    let first = tracks.first().map(|t| t.number).unwrap_or(1);
    let last = tracks.last().map(|t| t.number).unwrap_or(1);
    let _ = v.extend_from_slice(&[0, 0, first, last]); // length placeholder, len patched below
    for t in tracks {
        push_toc_descriptor(&mut v, t.number, t.mode, t.track_start_lba as i64, msf);
    }
    push_toc_descriptor(&mut v, 0xAA, TrackMode::Mode1_2048, leadout_lba(tracks, image_size_bytes) as i64, msf);
    patch_toc_len(&mut v);
    v
}

fn push_toc_descriptor(v: &mut heapless::Vec<u8, 256>, track_no: u8, mode: TrackMode, lba: i64, msf: bool) {
    let adr_control = if mode == TrackMode::Audio { 0x10 } else { 0x14 };
    let _ = v.extend_from_slice(&[0, adr_control, track_no, 0]);
    if msf {
        let m = Msf::from_lba(lba);
        let _ = v.extend_from_slice(&[0, m.m, m.s, m.f]);
    } else {
        let _ = v.extend_from_slice(&(lba as u32).to_be_bytes());
    }
}

fn patch_toc_len(v: &mut heapless::Vec<u8, 256>) {
    let data_len = (v.len() - 2) as u16;
    let bytes = data_len.to_be_bytes();
    v[0] = bytes[0];
    v[1] = bytes[1];
}

/// READ TOC format 1: session info only -- first/last session number (both
/// 1, multi-session images are out of scope) and the first track's
/// descriptor.
pub fn build_toc_format1(tracks: &[Track], msf: bool) -> heapless::Vec<u8, 32> {
    let mut v: heapless::Vec<u8, 32> = heapless::Vec::new();
    let _ = v.extend_from_slice(&[0, 0, 1, 1]);
    if let Some(first) = tracks.first() {
        let mut desc: heapless::Vec<u8, 256> = heapless::Vec::new();
        push_toc_descriptor(&mut desc, first.number, first.mode, first.track_start_lba as i64, msf);
        let _ = v.extend_from_slice(&desc);
    }
    let data_len = (v.len() - 2) as u16;
    let bytes = data_len.to_be_bytes();
    v[0] = bytes[0];
    v[1] = bytes[1];
    v
}

/// READ HEADER: mode byte plus the starting MSF/LBA of the addressed
/// logical block's track.
pub fn build_read_header(track: &Track, lba: i64, msf: bool) -> [u8; 8] {
    let mode_byte = if track.mode == TrackMode::Audio { 0x00 } else { 0x01 };
    let mut out = [0u8; 8];
    out[0] = mode_byte;
    if msf {
        let m = Msf::from_lba(lba);
        out[4..7].copy_from_slice(&[m.m, m.s, m.f]);
    } else {
        out[4..8].copy_from_slice(&(lba as u32).to_be_bytes());
    }
    out
}

/// READ CAPACITY(10): last valid LBA and block length, per spec.md's
/// `SECTOR_SIZE_COOKED`-granular host view of the medium.
pub fn build_read_capacity10(last_lba: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&last_lba.to_be_bytes());
    out[4..8].copy_from_slice(&(SECTOR_SIZE_COOKED as u32).to_be_bytes());
    out
}

/// GET EVENT STATUS NOTIFICATION, media event class only: event code 0x02
/// (new media) or 0x03 (media removal) per spec.md §4.7, plus the current
/// media-present/tray-open status byte.
pub fn build_media_event(event_code: u8, media_present: bool) -> [u8; 6] {
    let mut out = [0u8; 6];
    out[0] = 0;
    out[1] = 4; // event data length
    out[2] = 0x04; // NEA=0, notification class = media
    out[3] = 0x04; // supported event class bitmask: media
    out[4] = event_code;
    out[5] = if media_present { 0x02 } else { 0x00 };
    out
}

/// MECHANISM STATUS: fault/changer bits all zero (single-slot, no
/// changer), current slot 0, zero entries in the changer slot table.
pub fn build_mechanism_status() -> [u8; 8] {
    [0, 0, 0, 0, 0, 0, 0, 0]
}

/// GET CONFIGURATION, current-profile field only: no feature descriptors,
/// same minimal-mandatory-fields scope as `build_mechanism_status`. The
/// current profile mirrors the peripheral device type INQUIRY already
/// reports.
pub fn build_get_configuration(is_cdrom: bool) -> [u8; 8] {
    let mut out = [0u8; 8];
    let profile: u16 = if is_cdrom { 0x0008 } else { 0x0000 };
    out[0..4].copy_from_slice(&4u32.to_be_bytes()); // feature header data length
    out[6..8].copy_from_slice(&profile.to_be_bytes());
    out
}

/// READ DISC INFORMATION, mandatory header fields only: a finalized,
/// single-session disc spanning `first_track..=last_track`.
pub fn build_disc_information(first_track: u8, last_track: u8) -> [u8; 34] {
    let mut out = [0u8; 34];
    out[0..2].copy_from_slice(&32u16.to_be_bytes()); // disc information length
    out[2] = 0x0E; // finalized disc, last (only) session complete
    out[3] = first_track;
    out[4] = 1; // number of sessions (lsb)
    out[5] = first_track; // first track in last session (lsb)
    out[6] = last_track; // last track in last session (lsb)
    out
}

/// READ TRACK INFORMATION, mandatory header fields only: track number,
/// start address and size in logical blocks (`leadout_lba` as the track's
/// end, matching `build_toc_format0`'s leadout).
pub fn build_track_information(track: &Track, leadout_lba: u32) -> [u8; 36] {
    let mut out = [0u8; 36];
    out[0..2].copy_from_slice(&34u16.to_be_bytes());
    out[2] = track.number;
    out[3] = 1; // session number
    out[5] = if track.mode == TrackMode::Audio { 0x00 } else { 0x04 }; // data track bit
    out[8..12].copy_from_slice(&track.track_start_lba.to_be_bytes());
    let size = leadout_lba.saturating_sub(track.track_start_lba);
    out[24..28].copy_from_slice(&size.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::TrackMode;

    fn data_track() -> Track {
        Track { number: 1, mode: TrackMode::Mode1_2048, sector_length: 2048, track_start_lba: 0, data_start_lba: 0, file_offset: 0 }
    }

    fn audio_track() -> Track {
        Track { number: 1, mode: TrackMode::Audio, sector_length: 2352, track_start_lba: 0, data_start_lba: 0, file_offset: 0 }
    }

    #[test]
    fn msf_round_trips_through_lba() {
        let m = Msf::from_lba(1000);
        assert_eq!(m.to_lba(), 1000);
    }

    #[test]
    fn format_sector_writes_sync_and_header() {
        let t = data_track();
        let user = [0x42u8; 2048];
        let mut out = [0u8; 2352];
        format_sector(&t, 0, &user, &mut out).unwrap();
        assert_eq!(&out[0..12], &SYNC_PATTERN);
        assert_eq!(out[15], 0x01);
        assert_eq!(&out[16..16 + 2048], &user[..]);
        assert!(out[16 + 2048..].iter().all(|&b| b == 0));
    }

    #[test]
    fn format_sector_rejects_audio_request_on_data_track_payload_size() {
        let t = data_track();
        let user = [0u8; 2352];
        let mut out = [0u8; 2352];
        assert_eq!(format_sector(&t, 0, &user, &mut out), Err(ScsiError::illegal_mode_for_track()));
    }

    #[test]
    fn audio_track_passes_raw_bytes_through() {
        let t = audio_track();
        let user = [0x7Fu8; 2352];
        let mut out = [0u8; 2352];
        format_sector(&t, 0, &user, &mut out).unwrap();
        assert_eq!(out, user);
    }

    #[test]
    fn subchannel_marks_audio_tracks_with_control_0x10() {
        let t = audio_track();
        let mut out = [0u8; 16];
        format_q_subchannel(&t, 0, &mut out);
        assert_eq!(out[0], 0x10);
        assert_eq!(out[1], 1);
    }

    #[test]
    fn toc_format0_has_one_descriptor_per_track_plus_leadout() {
        let tracks = [data_track()];
        let toc = build_toc_format0(&tracks, 2048 * 1000, false);
        // 4-byte header + 1 track descriptor (8 bytes) + 1 leadout descriptor (8 bytes)
        assert_eq!(toc.len(), 4 + 8 + 8);
        assert_eq!(toc[14], 0xAA); // leadout descriptor's track-number field
    }

    #[test]
    fn read_capacity_reports_cooked_block_length() {
        let cap = build_read_capacity10(99);
        assert_eq!(u32::from_be_bytes(cap[4..8].try_into().unwrap()), SECTOR_SIZE_COOKED as u32);
    }

    #[test]
    fn media_event_reports_removal_code() {
        let ev = build_media_event(0x03, false);
        assert_eq!(ev[4], 0x03);
        assert_eq!(ev[5], 0x00);
    }

    #[test]
    fn get_configuration_reports_cdrom_profile() {
        let cfg = build_get_configuration(true);
        assert_eq!(u16::from_be_bytes([cfg[6], cfg[7]]), 0x0008);
    }

    #[test]
    fn disc_information_reports_track_range() {
        let info = build_disc_information(1, 3);
        assert_eq!(info[3], 1);
        assert_eq!(info[6], 3);
    }

    #[test]
    fn track_information_reports_size_up_to_leadout() {
        let t = data_track();
        let info = build_track_information(&t, 100);
        assert_eq!(info[2], t.number);
        assert_eq!(u32::from_be_bytes(info[24..28].try_into().unwrap()), 100);
    }
}
