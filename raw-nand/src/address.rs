use core::{
    fmt::Display,
    ops::{Add, AddAssign},
};

/// Index of a page in the flash device, the "row" of a NAND address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageIndex(pub(crate) u32);

impl PageIndex {
    pub const fn new(index: u32) -> Self {
        PageIndex(index)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn inc(&mut self) {
        self.0 += 1;
    }
}

impl From<PageIndex> for u32 {
    fn from(page: PageIndex) -> Self {
        page.0
    }
}

impl Add<u32> for PageIndex {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        PageIndex(self.0 + rhs)
    }
}

impl Display for PageIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Index of an erase block in the flash device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockIndex(pub(crate) u32);

impl BlockIndex {
    pub const fn new(index: u32) -> Self {
        BlockIndex(index)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<BlockIndex> for u32 {
    fn from(block: BlockIndex) -> Self {
        block.0
    }
}

impl Add<u32> for BlockIndex {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        BlockIndex(self.0 + rhs)
    }
}

impl AddAssign<u32> for BlockIndex {
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

impl Display for BlockIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Linear byte offset into the main data area of the device.
///
/// Spare bytes are not part of this address space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ByteAddress(pub(crate) u32);

impl ByteAddress {
    pub const fn new(address: u32) -> Self {
        ByteAddress(address)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Advance by `rhs` bytes, [None] once the end of the 32 bit address space is passed
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(address) => Some(ByteAddress(address)),
            None => None,
        }
    }
}

impl From<u32> for ByteAddress {
    fn from(address: u32) -> Self {
        ByteAddress(address)
    }
}

impl From<ByteAddress> for u32 {
    fn from(address: ByteAddress) -> Self {
        address.0
    }
}

impl Display for ByteAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Byte offset within a page. Columns at or past the page size address the spare area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnAddress(pub(crate) u16);

impl ColumnAddress {
    pub const fn new(address: u16) -> Self {
        ColumnAddress(address)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<ColumnAddress> for u32 {
    fn from(column: ColumnAddress) -> Self {
        column.0 as u32
    }
}

impl Display for ColumnAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Adds logging to the test automatically
    // control with RUST_LOG="LEVEL"
    // requires --features log passed to cargo test
    use test_log::test;

    #[test]
    fn byte_address_checked_add() {
        let a = ByteAddress::new(0xFFFF_F000);
        assert_eq!(a.checked_add(0xFFF), Some(ByteAddress::new(u32::MAX)));
        assert_eq!(a.checked_add(0x1000), None);
        assert_eq!(ByteAddress::new(u32::MAX).checked_add(0), Some(ByteAddress::new(u32::MAX)));
        assert_eq!(ByteAddress::new(0).checked_add(4096), Some(ByteAddress::new(4096)));
    }

    #[test]
    fn block_index_arithmetic() {
        let mut block = BlockIndex::new(3) + 2;
        block += 1;
        assert_eq!(block, BlockIndex::new(6));
        assert_eq!(u32::from(block), 6);
    }
}
