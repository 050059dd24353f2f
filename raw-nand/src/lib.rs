#![cfg_attr(not(test), no_std)]
// Must be first to share macros across crate
pub(crate) mod fmt;

mod address;
mod command;
mod geometry;
pub mod poll;

pub use address::{BlockIndex, ByteAddress, ColumnAddress, PageIndex};
pub use command::{opcode, Command};
pub use geometry::{ChipGeometry, EccMode, OobLayout, PAGE_SHIFT_RANGE, SECTOR_SIZE};
pub use poll::{poll_until, PollOutcome, DEFAULT_POLL_BUDGET};

pub trait NandFlashError: core::fmt::Debug {
    /// Convert a specific NAND flash error into a generic error kind
    fn kind(&self) -> NandFlashErrorKind;
}

/// A trait that raw NAND drivers can use to share an error type.
pub trait ErrorType {
    /// Errors returned by this NAND driver.
    type Error: NandFlashError;
}

/// Raw NAND error kinds.
///
/// Driver and loader errors map onto these through the [`NandFlashError`] trait so
/// that upper layers can react without knowing the concrete controller.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum NandFlashErrorKind {
    /// The arguments are not properly aligned.
    NotAligned,

    /// The arguments are out of bounds.
    OutOfBounds,

    /// A bounded wait on the hardware ran out of retries.
    Timeout,

    /// The probed ID did not resolve to a supported chip.
    UnknownChip,

    /// Program requested at a column the controller cannot write from.
    UnsupportedColumn,

    /// Page data failed the ECC check and could not be corrected.
    EccUncorrectable,

    /// A DMA transfer did not complete.
    DmaFailure,

    /// The operation needs chip geometry, but no chip has been probed.
    NotProbed,

    /// A commit was issued without a matching begin-write.
    InvalidSequence,

    /// A buffer access ran past the staging buffer.
    BufferOverrun,

    /// Error specific to the implementation.
    Other,
}

/// State of an erase block according to its bad block marker
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockStatus {
    /// Marker reads 0xFF
    Good,
    /// Marker holds anything else
    Bad,
}

impl BlockStatus {
    /// Value of an unmarked (erased) marker byte
    pub const GOOD_MARKER: u8 = 0xFF;

    /// Classify a bad block marker byte
    pub fn from_marker(marker: u8) -> Self {
        if marker == Self::GOOD_MARKER {
            BlockStatus::Good
        } else {
            BlockStatus::Bad
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, BlockStatus::Good)
    }
}

/// Chip-level driver contract for a raw (parallel) NAND controller.
///
/// This is the only surface a higher level NAND subsystem needs. A command is issued
/// with [`RawNand::command`], any data it produced is pulled out of the driver's
/// staging buffer with [`RawNand::read_byte`] / [`RawNand::read_buf`], and data for a
/// program is pushed in with [`RawNand::write_buf`] between [`Command::SeqIn`] and
/// [`Command::PageProgram`].
///
/// Implementations are strictly synchronous: every call returns only once the
/// hardware has finished, or a bounded wait has given up.
pub trait RawNand: ErrorType {
    /// Select the chip enable line used by following commands
    fn select_chip(&mut self, chip: u8) -> Result<(), Self::Error>;

    /// Sample the ready/busy line of the selected chip
    fn is_ready(&mut self) -> bool;

    /// Run a single command to completion
    fn command(&mut self, command: Command) -> Result<(), Self::Error>;

    /// Read the next byte from the staging buffer
    fn read_byte(&mut self) -> Result<u8, Self::Error>;

    /// Fill `buf` from the staging buffer, advancing the read cursor
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Append `buf` to the staging buffer, advancing the write cursor
    fn write_buf(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Wait for the chip to become ready and return its status byte
    fn wait_and_get_status(&mut self) -> Result<u8, Self::Error>;
}

/// Return whether a byte offset is aligned to a page of `geometry`.
pub fn check_page_aligned(
    geometry: &ChipGeometry,
    offset: ByteAddress,
) -> Result<(), NandFlashErrorKind> {
    if !geometry.is_page_aligned(offset) {
        return Err(NandFlashErrorKind::NotAligned);
    }
    Ok(())
}

/// Return whether a byte offset lies inside the device described by `geometry`.
pub fn check_in_bounds(
    geometry: &ChipGeometry,
    offset: ByteAddress,
) -> Result<(), NandFlashErrorKind> {
    if offset.as_u32() as u64 >= geometry.capacity() {
        return Err(NandFlashErrorKind::OutOfBounds);
    }
    Ok(())
}
