use core::ops::RangeInclusive;

use crate::{BlockIndex, ByteAddress, ColumnAddress, PageIndex};

/// Size of one ECC sector. Pages are handled by the controller in units of this size.
pub const SECTOR_SIZE: usize = 1024;

/// Supported page size exponents (1 KiB to 16 KiB pages)
pub const PAGE_SHIFT_RANGE: RangeInclusive<u8> = 10..=14;

/// Hardware ECC strength selector.
///
/// The ordinal is what the controller's ECC mode field takes, each mode corrects
/// up to [`EccMode::max_correctable`] bit flips per 1 KiB sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EccMode(u8);

impl EccMode {
    /// Correctable bits per sector, indexed by mode ordinal
    pub const STRENGTHS: [u8; 9] = [16, 24, 28, 32, 40, 48, 56, 60, 64];

    pub const BCH16: EccMode = EccMode(0);
    pub const BCH24: EccMode = EccMode(1);
    pub const BCH28: EccMode = EccMode(2);
    pub const BCH32: EccMode = EccMode(3);
    pub const BCH40: EccMode = EccMode(4);
    pub const BCH48: EccMode = EccMode(5);
    pub const BCH56: EccMode = EccMode(6);
    pub const BCH60: EccMode = EccMode(7);
    pub const BCH64: EccMode = EccMode(8);

    /// Create from a mode ordinal, [None] if the controller has no such mode
    pub const fn new(ordinal: u8) -> Option<Self> {
        if (ordinal as usize) < Self::STRENGTHS.len() {
            Some(EccMode(ordinal))
        } else {
            None
        }
    }

    pub const fn ordinal(&self) -> u8 {
        self.0
    }

    /// Maximum number of bit flips per sector this mode can correct
    pub const fn max_correctable(&self) -> u8 {
        Self::STRENGTHS[self.0 as usize]
    }
}

/// Part of the spare area left free for the user once the controller has placed
/// its ECC data and the bad block marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OobLayout {
    pub free_offset: u16,
    pub free_length: u16,
}

/// Layout of a probed chip.
///
/// Page and block sizes are both powers of two. Immutable once derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChipGeometry {
    page_shift: u8,
    pages_per_block: u32,
    oob_size: u16,
    block_count: u32,
    ecc_mode: EccMode,
    address_cycles: u8,
}

impl ChipGeometry {
    /// Build a geometry, returning [None] if the page size is unsupported, the
    /// pages per block is not a power of two, or the address cycle count is not 1..=5.
    pub fn new(
        page_shift: u8,
        pages_per_block: u32,
        oob_size: u16,
        block_count: u32,
        ecc_mode: EccMode,
        address_cycles: u8,
    ) -> Option<Self> {
        if !PAGE_SHIFT_RANGE.contains(&page_shift)
            || !pages_per_block.is_power_of_two()
            || block_count == 0
            || !(1..=5).contains(&address_cycles)
        {
            return None;
        }
        Some(ChipGeometry {
            page_shift,
            pages_per_block,
            oob_size,
            block_count,
            ecc_mode,
            address_cycles,
        })
    }

    pub const fn page_shift(&self) -> u8 {
        self.page_shift
    }

    /// Size of the main data area of a page in bytes
    pub const fn page_size(&self) -> u32 {
        1 << self.page_shift
    }

    pub const fn pages_per_block(&self) -> u32 {
        self.pages_per_block
    }

    /// Size of an erase block in bytes
    pub const fn block_size(&self) -> u32 {
        self.page_size() * self.pages_per_block
    }

    pub const fn oob_size(&self) -> u16 {
        self.oob_size
    }

    pub const fn block_count(&self) -> u32 {
        self.block_count
    }

    pub const fn ecc_mode(&self) -> EccMode {
        self.ecc_mode
    }

    pub const fn address_cycles(&self) -> u8 {
        self.address_cycles
    }

    /// Number of ECC sectors in a page
    pub const fn sectors_per_page(&self) -> u32 {
        self.page_size() / SECTOR_SIZE as u32
    }

    /// Size of the main data area of the whole device
    pub const fn capacity(&self) -> u64 {
        self.block_size() as u64 * self.block_count as u64
    }

    /// Column addressing the first spare byte of a page
    pub const fn spare_column(&self) -> ColumnAddress {
        ColumnAddress(self.page_size() as u16)
    }

    /// Free spare bytes: each sector stores a 4 byte user word, the first byte holds
    /// the bad block marker and the last is reserved.
    pub const fn oob_layout(&self) -> OobLayout {
        OobLayout {
            free_offset: 1,
            free_length: (self.sectors_per_page() * 4 - 2) as u16,
        }
    }

    pub const fn page_of(&self, address: ByteAddress) -> PageIndex {
        PageIndex(address.0 >> self.page_shift)
    }

    pub const fn block_of(&self, address: ByteAddress) -> BlockIndex {
        BlockIndex(address.0 / self.block_size())
    }

    pub const fn first_page(&self, block: BlockIndex) -> PageIndex {
        PageIndex(block.0 * self.pages_per_block)
    }

    /// Round an address down to the start of its erase block
    pub const fn block_start(&self, address: ByteAddress) -> ByteAddress {
        ByteAddress(address.0 & !(self.block_size() - 1))
    }

    /// Number of bytes from `address` to the end of its erase block
    pub const fn block_remaining(&self, address: ByteAddress) -> u32 {
        self.block_size() - (address.0 & (self.block_size() - 1))
    }

    pub const fn is_page_aligned(&self, address: ByteAddress) -> bool {
        address.0 & (self.page_size() - 1) == 0
    }

    pub const fn is_block_aligned(&self, address: ByteAddress) -> bool {
        address.0 & (self.block_size() - 1) == 0
    }
}
