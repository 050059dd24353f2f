//! Bad block aware sequential loading from raw NAND.
//!
//! [ImageLoader] copies a byte range of the main data area into memory, reading
//! whole pages through any [RawNand] driver. Erase blocks whose first page carries
//! a bad block marker are skipped: every bad block met along the way shifts the
//! rest of the range forward by one erase block.
#![cfg_attr(not(test), no_std)]
// Must be first to share macros across crate
pub(crate) mod fmt;

pub mod image;

use raw_nand::{
    check_in_bounds, check_page_aligned, BlockIndex, BlockStatus, ByteAddress, ChipGeometry,
    ColumnAddress, Command, NandFlashError, NandFlashErrorKind, RawNand,
};
use thiserror::Error;

/// What happens when a page or a bad block marker cannot be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadMode {
    /// Log and count the failure, keep going. A block whose marker can't be read
    /// is treated as good and the destination bytes of a failed page are left untouched.
    #[default]
    Lenient,
    /// Stop at the first failure and return it
    Strict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoaderConfig {
    pub mode: LoadMode,
    /// Offset of the bad block marker in the spare area of a block's first page
    pub bad_block_marker: u16,
}

/// Summary of a finished load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadReport {
    /// Bytes written to the destination, including those of failed pages
    pub bytes_copied: usize,
    /// Page read commands issued
    pub pages_read: u32,
    /// Bad blocks stepped over
    pub blocks_skipped: u32,
    /// Page reads and marker reads that failed in lenient mode
    pub read_failures: u32,
    /// Physical offset just past the last byte loaded
    pub end_offset: u64,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.read_failures == 0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoaderError<E> {
    #[error("Flash")]
    Flash(E),
    #[error("Source offset not page aligned")]
    NotAligned,
    #[error("Load runs past the end of the flash")]
    OutOfBounds,
}

impl<E: NandFlashError> NandFlashError for LoaderError<E> {
    fn kind(&self) -> NandFlashErrorKind {
        match self {
            LoaderError::Flash(e) => e.kind(),
            LoaderError::NotAligned => NandFlashErrorKind::NotAligned,
            LoaderError::OutOfBounds => NandFlashErrorKind::OutOfBounds,
        }
    }
}

/// Sequential reader over a probed raw NAND chip
#[derive(Debug)]
pub struct ImageLoader<'a, N> {
    nand: &'a mut N,
    geometry: ChipGeometry,
    config: LoaderConfig,
}

impl<'a, N: RawNand> ImageLoader<'a, N> {
    pub fn new(nand: &'a mut N, geometry: ChipGeometry, config: LoaderConfig) -> Self {
        ImageLoader {
            nand,
            geometry,
            config,
        }
    }

    pub fn geometry(&self) -> &ChipGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Read the bad block marker of `block`
    pub fn block_status(&mut self, block: BlockIndex) -> Result<BlockStatus, LoaderError<N::Error>> {
        if block.as_u32() >= self.geometry.block_count() {
            return Err(LoaderError::OutOfBounds);
        }
        let page = self.geometry.first_page(block);
        self.nand
            .command(Command::ReadOob {
                column: ColumnAddress::new(0),
                page,
            })
            .map_err(LoaderError::Flash)?;
        for _ in 0..self.config.bad_block_marker {
            self.nand.read_byte().map_err(LoaderError::Flash)?;
        }
        let marker = self.nand.read_byte().map_err(LoaderError::Flash)?;
        Ok(BlockStatus::from_marker(marker))
    }

    /// Copy `destination.len()` bytes starting at the page aligned `offset`.
    ///
    /// Bad blocks produce no bytes, the data continues at the start of the next
    /// good block. Fails with [LoaderError::OutOfBounds] instead of reading past
    /// the last block.
    pub fn load(
        &mut self,
        offset: ByteAddress,
        destination: &mut [u8],
    ) -> Result<LoadReport, LoaderError<N::Error>> {
        check_page_aligned(&self.geometry, offset).map_err(|_| LoaderError::NotAligned)?;
        debug!(
            "Loading {} bytes from offset {}",
            destination.len(),
            offset.as_u32()
        );

        let mut report = LoadReport::default();
        let mut offset = offset;
        let mut copied = 0;
        let mut end = u64::from(offset.as_u32());
        while copied < destination.len() {
            check_in_bounds(&self.geometry, offset).map_err(|_| LoaderError::OutOfBounds)?;
            let block = self.geometry.block_of(offset);
            if self.test_block(block, &mut report)? == BlockStatus::Bad {
                warn!("Skipping bad block {}", block.as_u32());
                report.blocks_skipped += 1;
                offset = offset
                    .checked_add(self.geometry.block_size())
                    .ok_or(LoaderError::OutOfBounds)?;
                continue;
            }

            let len = (self.geometry.block_remaining(offset) as usize).min(destination.len() - copied);
            self.read_chunk(offset, &mut destination[copied..copied + len], &mut report)?;
            copied += len;
            end = u64::from(offset.as_u32()) + len as u64;
            // A load may end exactly at 4 GiB, only a further read has no address
            if copied < destination.len() {
                offset = offset
                    .checked_add(len as u32)
                    .ok_or(LoaderError::OutOfBounds)?;
            }
        }

        report.bytes_copied = copied;
        report.end_offset = end;
        info!(
            "Loaded {} bytes, {} bad blocks skipped, {} read failures",
            report.bytes_copied,
            report.blocks_skipped,
            report.read_failures
        );
        Ok(report)
    }

    fn test_block(
        &mut self,
        block: BlockIndex,
        report: &mut LoadReport,
    ) -> Result<BlockStatus, LoaderError<N::Error>> {
        match self.block_status(block) {
            Ok(status) => Ok(status),
            Err(LoaderError::Flash(e)) if self.config.mode == LoadMode::Lenient => {
                warn!("Marker read of block {} failed: {:?}", block.as_u32(), e.kind());
                report.read_failures += 1;
                Ok(BlockStatus::Good)
            }
            Err(e) => Err(e),
        }
    }

    /// Read the pages covering `chunk`, which lies within one erase block
    fn read_chunk(
        &mut self,
        offset: ByteAddress,
        chunk: &mut [u8],
        report: &mut LoadReport,
    ) -> Result<(), LoaderError<N::Error>> {
        let page_size = self.geometry.page_size() as usize;
        let mut page = self.geometry.page_of(offset);
        for part in chunk.chunks_mut(page_size) {
            report.pages_read += 1;
            let result = self
                .nand
                .command(Command::ReadPage {
                    column: ColumnAddress::new(0),
                    page,
                })
                .and_then(|()| self.nand.read_buf(part));
            if let Err(e) = result {
                if self.config.mode == LoadMode::Strict {
                    error!("Read of page {} failed: {:?}", page.as_u32(), e.kind());
                    return Err(LoaderError::Flash(e));
                }
                warn!("Read of page {} failed: {:?}", page.as_u32(), e.kind());
                report.read_failures += 1;
            }
            page.inc();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_nand::{EccMode, ErrorType};

    // Adds logging to the test automatically
    // control with RUST_LOG="LEVEL"
    // requires --features log passed to cargo test
    use test_log::test;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct FakeError;

    impl NandFlashError for FakeError {
        fn kind(&self) -> NandFlashErrorKind {
            NandFlashErrorKind::EccUncorrectable
        }
    }

    /// Flash of 1 KiB pages, 4 pages per block, where every byte holds its page number
    struct FakeNand {
        bad_blocks: Vec<u32>,
        failing_pages: Vec<u32>,
        failing_markers: Vec<u32>,
        data: Vec<u8>,
        pos: usize,
        commands: Vec<Command>,
    }

    impl FakeNand {
        fn new() -> Self {
            FakeNand {
                bad_blocks: Vec::new(),
                failing_pages: Vec::new(),
                failing_markers: Vec::new(),
                data: Vec::new(),
                pos: 0,
                commands: Vec::new(),
            }
        }
    }

    impl ErrorType for FakeNand {
        type Error = FakeError;
    }

    impl RawNand for FakeNand {
        fn select_chip(&mut self, _chip: u8) -> Result<(), FakeError> {
            Ok(())
        }

        fn is_ready(&mut self) -> bool {
            true
        }

        fn command(&mut self, command: Command) -> Result<(), FakeError> {
            self.commands.push(command);
            self.pos = 0;
            match command {
                Command::ReadOob { page, .. } => {
                    let block = page.as_u32() / 4;
                    if self.failing_markers.contains(&block) {
                        return Err(FakeError);
                    }
                    let mut spare = vec![0xFF; 16];
                    if self.bad_blocks.contains(&block) {
                        spare[2] = 0x00;
                    }
                    self.data = spare;
                }
                Command::ReadPage { page, .. } => {
                    if self.failing_pages.contains(&page.as_u32()) {
                        return Err(FakeError);
                    }
                    self.data = vec![page.as_u32() as u8; 1024];
                }
                _ => self.data.clear(),
            }
            Ok(())
        }

        fn read_byte(&mut self) -> Result<u8, FakeError> {
            let byte = self.data.get(self.pos).copied().ok_or(FakeError)?;
            self.pos += 1;
            Ok(byte)
        }

        fn read_buf(&mut self, buf: &mut [u8]) -> Result<(), FakeError> {
            let src = self.data.get(self.pos..self.pos + buf.len()).ok_or(FakeError)?;
            buf.copy_from_slice(src);
            self.pos += buf.len();
            Ok(())
        }

        fn write_buf(&mut self, _buf: &[u8]) -> Result<(), FakeError> {
            Err(FakeError)
        }

        fn wait_and_get_status(&mut self) -> Result<u8, FakeError> {
            Ok(0xE0)
        }
    }

    fn geometry() -> ChipGeometry {
        ChipGeometry::new(10, 4, 16, 8, EccMode::BCH16, 5).unwrap()
    }

    const MARKER_AT_2: LoaderConfig = LoaderConfig {
        mode: LoadMode::Lenient,
        bad_block_marker: 2,
    };

    #[test]
    fn marker_offset_is_configurable() {
        let mut nand = FakeNand::new();
        nand.bad_blocks.push(1);
        let mut loader = ImageLoader::new(&mut nand, geometry(), MARKER_AT_2);
        assert_eq!(loader.block_status(BlockIndex::new(0)), Ok(BlockStatus::Good));
        assert_eq!(loader.block_status(BlockIndex::new(1)), Ok(BlockStatus::Bad));
        assert_eq!(
            loader.block_status(BlockIndex::new(8)),
            Err(LoaderError::OutOfBounds)
        );

        // Marker at offset 0 is never written by the fake
        let mut loader = ImageLoader::new(&mut nand, geometry(), LoaderConfig::default());
        assert_eq!(loader.block_status(BlockIndex::new(1)), Ok(BlockStatus::Good));
    }

    #[test]
    fn unaligned_offset_touches_no_flash() {
        let mut nand = FakeNand::new();
        let mut dst = [0; 16];
        let mut loader = ImageLoader::new(&mut nand, geometry(), MARKER_AT_2);
        assert_eq!(
            loader.load(ByteAddress::new(100), &mut dst),
            Err(LoaderError::NotAligned)
        );
        assert_eq!(LoaderError::<FakeError>::NotAligned.kind(), NandFlashErrorKind::NotAligned);
        assert!(nand.commands.is_empty());
    }

    #[test]
    fn empty_load() {
        let mut nand = FakeNand::new();
        let mut loader = ImageLoader::new(&mut nand, geometry(), MARKER_AT_2);
        let report = loader.load(ByteAddress::new(1024), &mut []).unwrap();
        assert_eq!(report.bytes_copied, 0);
        assert_eq!(report.end_offset, 1024);
        assert!(nand.commands.is_empty());
    }

    #[test]
    fn chunks_stop_at_block_ends() {
        let mut nand = FakeNand::new();
        let mut dst = vec![0; 5 * 1024 + 100];
        let mut loader = ImageLoader::new(&mut nand, geometry(), MARKER_AT_2);
        let report = loader.load(ByteAddress::new(2048), &mut dst).unwrap();

        let expected: Vec<u8> = [2u8, 3, 4, 5, 6, 7]
            .iter()
            .flat_map(|page| core::iter::repeat(*page).take(1024))
            .take(dst.len())
            .collect();
        assert_eq!(dst, expected);
        assert_eq!(report.pages_read, 5);
        assert_eq!(report.end_offset, 2048 + 5 * 1024 + 100);
        assert!(report.is_clean());
        // Marker checks for block 0 and block 1 only
        let oob_reads = nand
            .commands
            .iter()
            .filter(|c| matches!(c, Command::ReadOob { .. }))
            .count();
        assert_eq!(oob_reads, 2);
    }

    #[test]
    fn bad_block_shifts_the_rest() {
        let mut nand = FakeNand::new();
        nand.bad_blocks.extend([1, 2]);
        let mut dst = vec![0; 6 * 1024];
        let mut loader = ImageLoader::new(&mut nand, geometry(), MARKER_AT_2);
        let report = loader.load(ByteAddress::new(0), &mut dst).unwrap();

        assert_eq!(report.blocks_skipped, 2);
        assert_eq!(report.end_offset, 14 * 1024);
        for (i, page) in dst.chunks(1024).enumerate() {
            let expected = if i < 4 { i } else { i + 8 };
            assert!(page.iter().all(|b| *b as usize == expected));
        }
    }

    #[test]
    fn running_off_the_end_fails() {
        let mut nand = FakeNand::new();
        nand.bad_blocks.push(7);
        let mut dst = vec![0; 5 * 1024];
        let mut loader = ImageLoader::new(&mut nand, geometry(), MARKER_AT_2);
        assert_eq!(
            loader.load(ByteAddress::new(24 * 1024), &mut dst),
            Err(LoaderError::OutOfBounds)
        );
        assert_eq!(
            loader.load(ByteAddress::new(32 * 1024), &mut dst),
            Err(LoaderError::OutOfBounds)
        );
    }

    /// 4 KiB blocks filling the whole 32 bit address space
    fn four_gib() -> ChipGeometry {
        ChipGeometry::new(10, 4, 16, 1 << 20, EccMode::BCH16, 5).unwrap()
    }

    const LAST_BLOCK: u32 = u32::MAX - 4095;

    #[test]
    fn load_ending_at_4_gib() {
        let mut nand = FakeNand::new();
        let mut dst = vec![0; 4096];
        let mut loader = ImageLoader::new(&mut nand, four_gib(), MARKER_AT_2);
        let report = loader.load(ByteAddress::new(LAST_BLOCK), &mut dst).unwrap();

        assert_eq!(report.end_offset, 1 << 32);
        assert_eq!(report.pages_read, 4);
        // Page numbers 0x3F_FFFC..=0x3F_FFFF, truncated to a byte
        assert!(dst[..1024].iter().all(|b| *b == 0xFC));
        assert!(dst[3072..].iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn load_past_4_gib_never_wraps() {
        for mode in [LoadMode::Lenient, LoadMode::Strict] {
            let config = LoaderConfig {
                mode,
                ..MARKER_AT_2
            };
            let mut nand = FakeNand::new();
            let mut dst = vec![0xAA; 8192];
            let mut loader = ImageLoader::new(&mut nand, four_gib(), config);
            assert_eq!(
                loader.load(ByteAddress::new(LAST_BLOCK), &mut dst),
                Err(LoaderError::OutOfBounds)
            );
            // Block 0 is never touched, the tail stays as it was
            assert!(dst[4096..].iter().all(|b| *b == 0xAA));
            assert!(!nand.commands.iter().any(|c| matches!(
                c,
                Command::ReadPage { page, .. } | Command::ReadOob { page, .. } if page.as_u32() < 4
            )));
        }
    }

    #[test]
    fn bad_last_block_past_4_gib_fails() {
        for mode in [LoadMode::Lenient, LoadMode::Strict] {
            let config = LoaderConfig {
                mode,
                ..MARKER_AT_2
            };
            let mut nand = FakeNand::new();
            nand.bad_blocks.push((1 << 20) - 1);
            let mut dst = vec![0; 1024];
            let mut loader = ImageLoader::new(&mut nand, four_gib(), config);
            // Starts mid block, so the skip would land past the address space
            assert_eq!(
                loader.load(ByteAddress::new(LAST_BLOCK + 1024), &mut dst),
                Err(LoaderError::OutOfBounds)
            );
            assert!(!nand
                .commands
                .iter()
                .any(|c| matches!(c, Command::ReadPage { .. })));
        }
    }

    #[test]
    fn lenient_mode_counts_failures() {
        let mut nand = FakeNand::new();
        nand.failing_pages.push(1);
        nand.failing_markers.push(1);
        let mut dst = vec![0xAA; 8 * 1024];
        let mut loader = ImageLoader::new(&mut nand, geometry(), MARKER_AT_2);
        let report = loader.load(ByteAddress::new(0), &mut dst).unwrap();

        assert_eq!(report.read_failures, 2);
        assert_eq!(report.bytes_copied, 8 * 1024);
        assert!(!report.is_clean());
        // Failed page left as it was, unreadable marker taken as good
        assert!(dst[1024..2048].iter().all(|b| *b == 0xAA));
        assert!(dst[4096..5120].iter().all(|b| *b == 4));
    }

    #[test]
    fn strict_mode_stops_at_first_failure() {
        let strict = LoaderConfig {
            mode: LoadMode::Strict,
            ..MARKER_AT_2
        };
        let mut nand = FakeNand::new();
        nand.failing_pages.push(5);
        let mut dst = vec![0; 8 * 1024];
        let mut loader = ImageLoader::new(&mut nand, geometry(), strict);
        let err = loader.load(ByteAddress::new(0), &mut dst).unwrap_err();
        assert_eq!(err, LoaderError::Flash(FakeError));
        assert_eq!(err.kind(), NandFlashErrorKind::EccUncorrectable);

        let mut nand = FakeNand::new();
        nand.failing_markers.push(0);
        let mut loader = ImageLoader::new(&mut nand, geometry(), strict);
        assert_eq!(
            loader.load(ByteAddress::new(0), &mut dst),
            Err(LoaderError::Flash(FakeError))
        );
    }
}
