//! Eject-button debouncing and per-target image cycling, grounded on
//! `usbd_scsi::commands::{start_stop_unit, prevent_allow_medium_removal}`'s
//! command-side vocabulary (the manager is the collaborator those commands
//! drive, generalized from "handle one command" to "own eject/insert state
//! across the bus-idle polling loop").

use heapless::String;
use heapless::Vec;

pub const MAX_TARGETS: usize = 8;
pub const MAX_IMAGE_NAME: usize = 64;
pub const MAX_LISTED_IMAGES: usize = 16;

/// Event to surface to the host the next time it asks (GET EVENT STATUS
/// NOTIFICATION) per spec.md §4.7.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    Removed,
    Inserted,
}

/// Where `switch_next_image` gets its candidate list from: a live directory
/// listing (lexical order) or a fixed configured list, per spec.md §4.7.
pub trait ImageSource {
    /// Returns the next image name after `current` (or the first image if
    /// `current` is `None`/not found), wrapping to the first on end. `None`
    /// if there are no images at all.
    fn next_after(&self, target_id: u8, current: Option<&str>) -> Option<String<MAX_IMAGE_NAME>>;
}

/// Fixed configured list shared by every target, iterated in list order.
pub struct FixedImageList {
    images: Vec<String<MAX_IMAGE_NAME>, MAX_LISTED_IMAGES>,
}

impl FixedImageList {
    pub fn new(images: Vec<String<MAX_IMAGE_NAME>, MAX_LISTED_IMAGES>) -> Self { FixedImageList { images } }
}

impl ImageSource for FixedImageList {
    fn next_after(&self, _target_id: u8, current: Option<&str>) -> Option<String<MAX_IMAGE_NAME>> {
        if self.images.is_empty() {
            return None;
        }
        let idx = match current {
            None => 0,
            Some(name) => match self.images.iter().position(|s| s.as_str() == name) {
                Some(i) => (i + 1) % self.images.len(),
                None => 0,
            },
        };
        Some(self.images[idx].clone())
    }
}

#[derive(Debug, Clone)]
pub struct TargetMedia {
    pub target_id: u8,
    pub is_cdrom: bool,
    pub ejected: bool,
    pub unit_attention_pending: bool,
    pub current_image: Option<String<MAX_IMAGE_NAME>>,
    /// Set on insert of a CD-ROM image; cleared the first time the host
    /// polls this target, per spec.md §4.7's "stays reported ejected until
    /// the host polls once" rule.
    await_poll_before_ready: bool,
}

impl TargetMedia {
    pub fn new(target_id: u8, is_cdrom: bool) -> Self {
        TargetMedia {
            target_id,
            is_cdrom,
            ejected: false,
            unit_attention_pending: false,
            current_image: None,
            await_poll_before_ready: false,
        }
    }

    /// Whether TEST UNIT READY (or any command that checks readiness)
    /// should report NOT READY right now.
    pub fn reports_not_ready(&self) -> bool { self.ejected || self.await_poll_before_ready }
}

pub struct MediaManager<S: ImageSource> {
    source: S,
    targets: Vec<TargetMedia, MAX_TARGETS>,
    prev_buttons: u8,
}

impl<S: ImageSource> MediaManager<S> {
    pub fn new(source: S, targets: Vec<TargetMedia, MAX_TARGETS>) -> Self {
        MediaManager { source, targets, prev_buttons: 0 }
    }

    pub fn target(&self, target_id: u8) -> Option<&TargetMedia> {
        self.targets.iter().find(|t| t.target_id == target_id)
    }

    /// Samples the button bitmask during bus-idle polling and latches
    /// 1->0 edges (button released after being held) into a pending set of
    /// target ids. Callers apply the pending set with `apply_eject` only
    /// after the current command completes, per spec.md §4.7.
    pub fn sample_buttons(&mut self, buttons: u8) -> Vec<u8, MAX_TARGETS> {
        let released = self.prev_buttons & !buttons;
        self.prev_buttons = buttons;
        let mut pending: Vec<u8, MAX_TARGETS> = Vec::new();
        for t in &self.targets {
            if t.target_id < 8 && released & (1 << t.target_id) != 0 {
                let _ = pending.push(t.target_id);
            }
        }
        pending
    }

    /// Executes a latched eject for one target: sets `ejected`, posts
    /// `MediaEvent::Removed`, and advances to the next image.
    pub fn apply_eject(&mut self, target_id: u8) -> Option<MediaEvent> {
        let current = self.targets.iter().find(|t| t.target_id == target_id)?.current_image.clone();
        let next = self.source.next_after(target_id, current.as_deref());
        let t = self.targets.iter_mut().find(|t| t.target_id == target_id)?;
        t.ejected = true;
        let event = MediaEvent::Removed;
        t.current_image = next;
        if t.is_cdrom {
            t.await_poll_before_ready = true;
        }
        log::info!("target {}: ejected, switched to {:?}", target_id, t.current_image.as_deref());
        Some(event)
    }

    /// Marks a target's media reinserted: clears `ejected`, posts
    /// `MediaEvent::Inserted`, and arms UNIT ATTENTION (ASC 0x28) so the
    /// next command surfaces the change.
    pub fn apply_insert(&mut self, target_id: u8) -> Option<MediaEvent> {
        let t = self.targets.iter_mut().find(|t| t.target_id == target_id)?;
        t.ejected = false;
        t.unit_attention_pending = true;
        log::info!("target {}: media inserted, unit attention armed", target_id);
        Some(MediaEvent::Inserted)
    }

    /// Consumes the pending UNIT ATTENTION flag, if any -- call once per
    /// command dispatch before the normal opcode handling runs.
    pub fn take_unit_attention(&mut self, target_id: u8) -> bool {
        match self.targets.iter_mut().find(|t| t.target_id == target_id) {
            Some(t) if t.unit_attention_pending => {
                t.unit_attention_pending = false;
                true
            }
            _ => false,
        }
    }

    /// Records that the host polled this target (e.g. issued TEST UNIT
    /// READY); clears the post-insert "stay ejected" latch.
    pub fn poll(&mut self, target_id: u8) {
        if let Some(t) = self.targets.iter_mut().find(|t| t.target_id == target_id) {
            t.await_poll_before_ready = false;
        }
    }
}
