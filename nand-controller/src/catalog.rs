//! Catalog of supported NAND chips.
//!
//! The probed 8 byte ID is matched against [CHIP_TABLE]. The first entry whose
//! leading `id_len` bytes equal the probed ID wins, so more specific entries must
//! come before less specific ones.

use raw_nand::EccMode;

/// ID bytes returned by the read ID command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChipId {
    bytes: [u8; 8],
}

impl ChipId {
    pub const fn new(bytes: [u8; 8]) -> Self {
        ChipId { bytes }
    }

    pub const fn bytes(&self) -> &[u8; 8] {
        &self.bytes
    }

    /// JEDEC manufacturer code
    pub const fn manufacturer(&self) -> u8 {
        self.bytes[0]
    }

    pub const fn device(&self) -> u8 {
        self.bytes[1]
    }
}

/// One catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipParams {
    /// Leading ID bytes, unused tail is 0xFF
    pub id: [u8; 8],
    /// Number of significant bytes in `id`. 0 marks the end of the table
    pub id_len: u8,
    /// Page size exponent
    pub page_shift: u8,
    /// Highest interface clock the chip supports, in MHz
    pub clock_mhz: u8,
    /// Ordinal of the ECC mode the chip needs
    pub ecc_mode: u8,
    /// Part number
    pub name: &'static str,
}

impl ChipParams {
    const fn entry(
        id: [u8; 4],
        page_shift: u8,
        clock_mhz: u8,
        ecc_mode: u8,
        name: &'static str,
    ) -> Self {
        ChipParams {
            id: [id[0], id[1], id[2], id[3], 0xFF, 0xFF, 0xFF, 0xFF],
            id_len: 4,
            page_shift,
            clock_mhz,
            ecc_mode,
            name,
        }
    }

    /// Terminating entry, never matches
    pub const SENTINEL: ChipParams = ChipParams {
        id: [0xFF; 8],
        id_len: 0,
        page_shift: 0,
        clock_mhz: 0,
        ecc_mode: 0,
        name: "",
    };

    /// Whether the significant bytes of this entry equal the leading bytes of `id`
    pub fn matches(&self, id: &ChipId) -> bool {
        let len = (self.id_len as usize).min(self.id.len());
        self.id_len != 0 && self.id[..len] == id.bytes[..len]
    }

    pub fn ecc_mode(&self) -> Option<EccMode> {
        EccMode::new(self.ecc_mode)
    }

    /// Interface clock for this chip, limited to `cap_hz`
    pub fn clock_hz(&self, cap_hz: u32) -> u32 {
        (self.clock_mhz as u32 * 1_000_000).min(cap_hz)
    }
}

/// Known chips, terminated by [ChipParams::SENTINEL]
pub static CHIP_TABLE: &[ChipParams] = &[
    // Samsung SLC
    ChipParams::entry([0xEC, 0xF1, 0xFF, 0x15], 11, 15, 0, "K9F1G08"),
    ChipParams::entry([0xEC, 0xF1, 0x00, 0x95], 11, 15, 0, "K9F1G08"),
    ChipParams::entry([0xEC, 0xDA, 0xFF, 0x15], 11, 15, 0, "K9K2G08"),
    ChipParams::entry([0xEC, 0xDA, 0x10, 0x95], 11, 15, 0, "K9F2G08"),
    ChipParams::entry([0xEC, 0xDC, 0xC1, 0x15], 11, 15, 0, "K9K4G08"),
    ChipParams::entry([0xEC, 0xDC, 0x10, 0x95], 11, 15, 0, "K9F4G08"),
    ChipParams::entry([0xEC, 0xD3, 0x51, 0x95], 11, 30, 0, "K9K8G08"),
    ChipParams::entry([0xEC, 0xD3, 0x50, 0xA6], 11, 30, 0, "K9F8G08"),
    ChipParams::entry([0xEC, 0xD5, 0x51, 0xA6], 11, 30, 0, "K9KAG08"),
    // Samsung MLC
    ChipParams::entry([0xEC, 0xDC, 0x14, 0x25], 11, 20, 0, "K9G4G08"),
    ChipParams::entry([0xEC, 0xDC, 0x14, 0xA5], 11, 30, 0, "K9G4G08"),
    ChipParams::entry([0xEC, 0xD3, 0x55, 0x25], 11, 20, 0, "K9L8G08"),
    ChipParams::entry([0xEC, 0xD3, 0x55, 0xA5], 11, 30, 0, "K9L8G08"),
    ChipParams::entry([0xEC, 0xD3, 0x14, 0x25], 11, 20, 0, "K9G8G08"),
    ChipParams::entry([0xEC, 0xD3, 0x14, 0xA5], 11, 30, 0, "K9G8G08"),
    ChipParams::entry([0xEC, 0xD5, 0x55, 0x25], 11, 30, 0, "K9LAG08"),
    ChipParams::entry([0xEC, 0xD5, 0x55, 0xA5], 11, 30, 0, "K9LAG08"),
    ChipParams::entry([0xEC, 0xD5, 0x14, 0xB6], 12, 30, 0, "K9GAG08"),
    ChipParams::entry([0xEC, 0xD7, 0x55, 0xB6], 12, 30, 0, "K9LBG08"),
    ChipParams::entry([0xEC, 0xD7, 0xD5, 0x29], 12, 30, 0, "K9LBG08"),
    ChipParams::entry([0xEC, 0xD7, 0x94, 0x72], 13, 30, 2, "K9GBG08"),
    ChipParams::entry([0xEC, 0xD5, 0x98, 0x71], 12, 30, 3, "K9AAG08"),
    ChipParams::entry([0xEC, 0xD5, 0x94, 0x29], 12, 30, 0, "K9GAG08U0D"),
    ChipParams::entry([0xEC, 0xD5, 0x84, 0x72], 13, 24, 2, "K9GAG08U0E"),
    ChipParams::entry([0xEC, 0xD3, 0x84, 0x72], 13, 24, 2, "K9G8G08U0C"),
    ChipParams::entry([0xEC, 0xD7, 0x94, 0x76], 13, 30, 3, "K9GBG08U0A"),
    ChipParams::entry([0xEC, 0xD7, 0x94, 0x7A], 13, 30, 3, "K9GBG08U0A"),
    ChipParams::SENTINEL,
];

/// Find the first entry of `table` matching `id`. Scanning stops at the sentinel.
pub fn lookup<'a>(table: &'a [ChipParams], id: &ChipId) -> Option<&'a ChipParams> {
    table
        .iter()
        .take_while(|params| params.id_len != 0)
        .find(|params| params.matches(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Adds logging to the test automatically
    // control with RUST_LOG="LEVEL"
    // requires --features log passed to cargo test
    use test_log::test;

    fn id(prefix: [u8; 4]) -> ChipId {
        ChipId::new([prefix[0], prefix[1], prefix[2], prefix[3], 0x00, 0x11, 0x22, 0x33])
    }

    #[test]
    fn finds_known_chip() {
        let params = lookup(CHIP_TABLE, &id([0xEC, 0xD3, 0x51, 0x95])).unwrap();
        assert_eq!(params.name, "K9K8G08");
        assert_eq!(params.page_shift, 11);
        assert_eq!(params.clock_mhz, 30);
        assert_eq!(params.ecc_mode(), Some(EccMode::BCH16));
    }

    #[test]
    fn bytes_past_id_len_are_ignored() {
        let a = lookup(CHIP_TABLE, &id([0xEC, 0xD7, 0x94, 0x72])).unwrap();
        let b = lookup(
            CHIP_TABLE,
            &ChipId::new([0xEC, 0xD7, 0x94, 0x72, 0xFF, 0xFF, 0xFF, 0xFF]),
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.page_shift, 13);
        assert_eq!(a.ecc_mode(), Some(EccMode::BCH28));
    }

    #[test]
    fn first_match_wins() {
        let table = [
            ChipParams {
                id_len: 2,
                name: "short",
                ..ChipParams::entry([0xEC, 0xD3, 0x00, 0x00], 11, 20, 0, "")
            },
            ChipParams::entry([0xEC, 0xD3, 0x51, 0x95], 12, 30, 1, "long"),
            ChipParams::SENTINEL,
        ];
        let found = lookup(&table, &id([0xEC, 0xD3, 0x51, 0x95])).unwrap();
        assert_eq!(found.name, "short");
    }

    #[test]
    fn unknown_id_is_unresolved() {
        assert!(lookup(CHIP_TABLE, &id([0x98, 0xD3, 0x51, 0x95])).is_none());
        assert!(lookup(CHIP_TABLE, &ChipId::new([0xFF; 8])).is_none());
    }

    #[test]
    fn sentinel_never_matches() {
        assert!(!ChipParams::SENTINEL.matches(&ChipId::new([0xFF; 8])));
        // Entries after the sentinel are never reached
        let table = [
            ChipParams::SENTINEL,
            ChipParams::entry([0xEC, 0xD3, 0x51, 0x95], 11, 30, 0, "hidden"),
        ];
        assert!(lookup(&table, &id([0xEC, 0xD3, 0x51, 0x95])).is_none());
    }

    #[test]
    fn clock_is_capped() {
        let params = lookup(CHIP_TABLE, &id([0xEC, 0xF1, 0x00, 0x95])).unwrap();
        assert_eq!(params.clock_hz(30_000_000), 15_000_000);
        let fast = ChipParams::entry([0, 0, 0, 0], 11, 40, 0, "fast");
        assert_eq!(fast.clock_hz(30_000_000), 30_000_000);
    }

    #[test]
    fn table_is_terminated() {
        assert_eq!(CHIP_TABLE.last().map(|p| p.id_len), Some(0));
    }
}
