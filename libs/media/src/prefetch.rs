//! Single-run read-ahead cache, grounded on `usbd_scsi::block_device`'s
//! block-granular addressing (reused here as the cache's key space) rather
//! than any particular teacher caching code -- the teacher has none, so
//! this is written fresh in its allocation-light, fixed-capacity style.

use heapless::Vec;

/// Upper bound on cached sectors; sized for a 16 KiB scratch at 2048 bytes
/// per cooked sector, matching the read path's double-buffer size in
/// spec.md §4.6.
pub const MAX_CACHED_SECTORS: usize = 8;
pub const SECTOR_BYTES: usize = 2048;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub target_id: u8,
    pub first_sector: u32,
}

pub struct PrefetchCache {
    key: Option<CacheKey>,
    sectors: Vec<[u8; SECTOR_BYTES], MAX_CACHED_SECTORS>,
}

impl PrefetchCache {
    pub fn new() -> Self { PrefetchCache { key: None, sectors: Vec::new() } }

    /// If `lba` falls inside the cached run for `target_id`, returns the
    /// cached sectors from `lba` onward and how many of the `count`
    /// requested sectors were actually served; the caller reads the
    /// remainder from SD.
    pub fn take(&mut self, target_id: u8, lba: u32, count: u32) -> Option<(&[[u8; SECTOR_BYTES]], u32)> {
        let key = self.key?;
        if key.target_id != target_id || lba < key.first_sector {
            return None;
        }
        let skip = (lba - key.first_sector) as usize;
        if skip >= self.sectors.len() {
            return None;
        }
        let available = (self.sectors.len() - skip) as u32;
        let served = available.min(count);
        Some((&self.sectors[skip..skip + served as usize], served))
    }

    /// Fills the cache opportunistically after a READ completes, per
    /// spec.md §4.9's "while the bus is idle" rule. Replaces any existing
    /// run.
    pub fn fill(&mut self, target_id: u8, first_sector: u32, sectors: &[[u8; SECTOR_BYTES]]) {
        self.sectors.clear();
        for s in sectors.iter().take(MAX_CACHED_SECTORS) {
            let _ = self.sectors.push(*s);
        }
        self.key = Some(CacheKey { target_id, first_sector });
    }

    /// Invalidates the cache: called on any WRITE or image switch per
    /// spec.md §4.9.
    pub fn invalidate(&mut self) {
        self.key = None;
        self.sectors.clear();
    }
}

impl Default for PrefetchCache {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(fill: u8) -> [u8; SECTOR_BYTES] { [fill; SECTOR_BYTES] }

    #[test]
    fn take_misses_on_empty_cache() {
        let mut c = PrefetchCache::new();
        assert!(c.take(0, 0, 1).is_none());
    }

    #[test]
    fn take_serves_from_middle_of_cached_run() {
        let mut c = PrefetchCache::new();
        c.fill(0, 100, &[sector(1), sector(2), sector(3)]);
        let (data, served) = c.take(0, 101, 2).unwrap();
        assert_eq!(served, 2);
        assert_eq!(data[0], sector(2));
        assert_eq!(data[1], sector(3));
    }

    #[test]
    fn take_misses_for_wrong_target() {
        let mut c = PrefetchCache::new();
        c.fill(0, 100, &[sector(1)]);
        assert!(c.take(1, 100, 1).is_none());
    }

    #[test]
    fn take_misses_before_cached_run_start() {
        let mut c = PrefetchCache::new();
        c.fill(0, 100, &[sector(1)]);
        assert!(c.take(0, 50, 1).is_none());
    }

    #[test]
    fn write_or_switch_invalidates_cache() {
        let mut c = PrefetchCache::new();
        c.fill(0, 100, &[sector(1)]);
        c.invalidate();
        assert!(c.take(0, 100, 1).is_none());
    }
}
