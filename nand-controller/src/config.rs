use raw_nand::DEFAULT_POLL_BUDGET;

/// Board level settings that the chip catalog does not provide.
///
/// The catalog only knows the page size, ECC mode and clock of a chip, the rest of
/// the layout is fixed by the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NandConfig {
    /// Pages in an erase block, power of two
    pub pages_per_block: u32,
    /// Spare bytes per page
    pub oob_size: u16,
    /// Erase blocks on the chip
    pub block_count: u32,
    /// Address cycles for page commands
    pub address_cycles: u8,
    /// Interface clock used while probing
    pub initial_clock_hz: u32,
    /// Upper bound for the interface clock, whatever the catalog suggests
    pub max_clock_hz: u32,
    /// Samples taken by every bounded wait
    pub poll_budget: u32,
}

impl NandConfig {
    pub const DEFAULT: NandConfig = NandConfig {
        pages_per_block: 64,
        oob_size: 64,
        block_count: 4096,
        address_cycles: 5,
        initial_clock_hz: 10_000_000,
        max_clock_hz: 30_000_000,
        poll_budget: DEFAULT_POLL_BUDGET,
    };
}

impl Default for NandConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
