//! Uniform read/write over the three backing stores spec.md §4.4 allows for
//! a target's image: a file on the SD card's filesystem, a raw partition
//! owned outright, or a read-only image baked into MCU flash.
//!
//! Grounded on `usbd_scsi::block_device::BlockDevice`'s shape
//! (`read_block`/`write_block`/`max_lba`/`BLOCK_BYTES`), generalized from one
//! fixed-size block device to the three-backend sum type and byte-granular
//! `seek`/`read`/`write` spec.md requires.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageError {
    InvalidSpec,
    NotBlockAligned,
    OutOfRange,
    ReadOnly,
    Io,
}

/// Which backing store an opened image lives on, plus the address range it
/// owns there.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageBacking {
    /// A file on the SD card's filesystem, already resolved to an absolute
    /// byte range (this crate has no FAT driver; the directory lookup that
    /// produced `offset_bytes` is an external collaborator).
    File { offset_bytes: u64, size_bytes: u64, contiguous: bool },
    /// A partition the firmware owns outright, addressed by 512-byte SD LBA.
    RawRange { begin_sector: u32, end_sector: u32 },
    /// A read-only image in MCU internal flash.
    Rom { offset: u32, size: u32 },
}

/// Backend hook that actually moves bytes for one `ImageBacking` variant.
/// The hosted test fake backs this with a `Vec<u8>`; the real firmware
/// backs `File`/`RawRange` with `sdio::SdioDriver` block I/O and `Rom` with
/// a direct flash read.
pub trait MediaIo {
    fn read_exact(&mut self, byte_offset: u64, buf: &mut [u8]) -> Result<(), ImageError>;
    fn write_all(&mut self, byte_offset: u64, buf: &[u8]) -> Result<(), ImageError>;
}

#[derive(Debug, PartialEq, Eq)]
pub struct ImageStore {
    backing: ImageBacking,
    block_size: u32,
    read_only: bool,
    cursor: u64,
}

impl ImageStore {
    /// `spec` is a filename, `"RAW:<begin>:<end>"`, or `"ROM:"` per spec.md
    /// §4.4. `read_only` is decided by the caller (Rom and CD-ROM images are
    /// always read-only; that policy lives in `media::manager`, not here).
    pub fn open(spec: &str, block_size: u32, size_bytes: u64, read_only: bool) -> Result<Self, ImageError> {
        if block_size == 0 || size_bytes % block_size as u64 != 0 {
            return Err(ImageError::NotBlockAligned);
        }
        let backing = if let Some(rest) = spec.strip_prefix("RAW:") {
            let mut parts = rest.split(':');
            let begin: u32 = parts.next().and_then(|s| s.parse().ok()).ok_or(ImageError::InvalidSpec)?;
            let end: u32 = parts.next().and_then(|s| s.parse().ok()).ok_or(ImageError::InvalidSpec)?;
            if end <= begin {
                return Err(ImageError::InvalidSpec);
            }
            ImageBacking::RawRange { begin_sector: begin, end_sector: end }
        } else if spec.strip_prefix("ROM:").is_some() {
            ImageBacking::Rom { offset: 0, size: size_bytes as u32 }
        } else if !spec.is_empty() {
            ImageBacking::File { offset_bytes: 0, size_bytes, contiguous: true }
        } else {
            return Err(ImageError::InvalidSpec);
        };
        let read_only = read_only || matches!(backing, ImageBacking::Rom { .. });
        Ok(ImageStore { backing, block_size, read_only, cursor: 0 })
    }

    pub fn size(&self) -> u64 {
        match self.backing {
            ImageBacking::File { size_bytes, .. } => size_bytes,
            ImageBacking::RawRange { begin_sector, end_sector } => (end_sector - begin_sector) as u64 * 512,
            ImageBacking::Rom { size, .. } => size as u64,
        }
    }

    pub fn is_writable(&self) -> bool { !self.read_only }
    pub fn block_size(&self) -> u32 { self.block_size }
    pub fn backing(&self) -> ImageBacking { self.backing }

    pub fn seek(&mut self, pos: u64) -> Result<(), ImageError> {
        if pos > self.size() {
            return Err(ImageError::OutOfRange);
        }
        self.cursor = pos;
        Ok(())
    }

    fn absolute_base(&self) -> u64 {
        match self.backing {
            ImageBacking::File { offset_bytes, .. } => offset_bytes,
            ImageBacking::RawRange { begin_sector, .. } => begin_sector as u64 * 512,
            ImageBacking::Rom { offset, .. } => offset as u64,
        }
    }

    pub fn read(&mut self, io: &mut impl MediaIo, buf: &mut [u8]) -> Result<(), ImageError> {
        if self.cursor + buf.len() as u64 > self.size() {
            return Err(ImageError::OutOfRange);
        }
        io.read_exact(self.absolute_base() + self.cursor, buf)?;
        self.cursor += buf.len() as u64;
        Ok(())
    }

    pub fn write(&mut self, io: &mut impl MediaIo, buf: &[u8]) -> Result<(), ImageError> {
        if self.read_only {
            return Err(ImageError::ReadOnly);
        }
        if self.cursor + buf.len() as u64 > self.size() {
            return Err(ImageError::OutOfRange);
        }
        io.write_all(self.absolute_base() + self.cursor, buf)?;
        self.cursor += buf.len() as u64;
        Ok(())
    }

    /// For file-backed images whose on-card extent is one contiguous run,
    /// the backing SD LBA span -- callers use this to turn SCSI I/O into
    /// direct SDIO block I/O and skip filesystem overhead.
    pub fn contiguous_range(&self) -> Option<(u32, u32)> {
        match self.backing {
            ImageBacking::File { offset_bytes, size_bytes, contiguous: true } if offset_bytes % 512 == 0 => {
                let begin = (offset_bytes / 512) as u32;
                let end = begin + (size_bytes / 512) as u32;
                Some((begin, end))
            }
            ImageBacking::RawRange { begin_sector, end_sector } => Some((begin_sector, end_sector)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecIo(Vec<u8>);
    impl MediaIo for VecIo {
        fn read_exact(&mut self, byte_offset: u64, buf: &mut [u8]) -> Result<(), ImageError> {
            let start = byte_offset as usize;
            buf.copy_from_slice(self.0.get(start..start + buf.len()).ok_or(ImageError::OutOfRange)?);
            Ok(())
        }
        fn write_all(&mut self, byte_offset: u64, buf: &[u8]) -> Result<(), ImageError> {
            let start = byte_offset as usize;
            self.0.get_mut(start..start + buf.len()).ok_or(ImageError::OutOfRange)?.copy_from_slice(buf);
            Ok(())
        }
    }

    #[test]
    fn raw_spec_parses_begin_and_end_sector() {
        let img = ImageStore::open("RAW:100:200", 512, 100 * 512, false).unwrap();
        assert_eq!(img.contiguous_range(), Some((100, 200)));
        assert_eq!(img.size(), 51200);
    }

    #[test]
    fn rom_images_are_always_read_only() {
        let img = ImageStore::open("ROM:", 2048, 2048 * 4, false).unwrap();
        assert!(!img.is_writable());
    }

    #[test]
    fn misaligned_size_is_rejected() {
        assert_eq!(ImageStore::open("disk.img", 512, 513, false), Err(ImageError::NotBlockAligned));
    }

    #[test]
    fn read_write_round_trip_through_fake_backend() {
        let mut io = VecIo(vec![0u8; 4096]);
        let mut img = ImageStore::open("disk.img", 512, 4096, false).unwrap();
        img.seek(512).unwrap();
        img.write(&mut io, &[0xAB; 512]).unwrap();
        img.seek(512).unwrap();
        let mut buf = [0u8; 512];
        img.read(&mut io, &mut buf).unwrap();
        assert_eq!(buf, [0xAB; 512]);
    }

    #[test]
    fn write_past_end_is_rejected() {
        let mut io = VecIo(vec![0u8; 512]);
        let mut img = ImageStore::open("disk.img", 512, 512, false).unwrap();
        img.seek(256).unwrap();
        assert_eq!(img.write(&mut io, &[0u8; 512]), Err(ImageError::OutOfRange));
    }
}
