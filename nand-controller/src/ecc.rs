//! Classification of the hardware ECC result of a page read.

use crate::error::NfcError;
use raw_nand::EccMode;

/// Margin below the mode's strength at which a sector is reported as near the limit
pub const NEAR_LIMIT_MARGIN: u8 = 4;

/// Outcome of an ECC checked read that did not fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EccReport {
    /// Highest corrected bit count of any sector
    pub max_bitflips: u8,
    /// Sectors whose corrected bit count came within the margin of the limit, one bit per sector
    pub near_limit: u16,
}

impl EccReport {
    pub const fn is_near_limit(&self) -> bool {
        self.near_limit != 0
    }
}

/// Corrected bit count of `sector` from the packed counter registers
pub const fn sector_bitflips(counters: &[u32; 4], sector: usize) -> u8 {
    (counters[(sector / 4) % 4] >> (8 * (sector % 4))) as u8
}

/// Check the ECC status of the first `sectors` sectors.
///
/// A set bit in the uncorrectable mask fails the read whatever the counters say.
/// Sectors within [NEAR_LIMIT_MARGIN] bits of the mode's strength are only warned about.
pub fn check(
    status: u32,
    counters: &[u32; 4],
    sectors: u32,
    mode: EccMode,
) -> Result<EccReport, NfcError> {
    let sectors = sectors.min(16) as usize;
    let uncorrectable = status & crate::regs::ECC_ST_ERR_MASK;
    if let Some(sector) = (0..sectors).find(|s| uncorrectable & (1 << s) != 0) {
        error!("Uncorrectable ECC error in sector {}", sector);
        return Err(NfcError::EccUncorrectable {
            sector: sector as u8,
        });
    }

    let limit = mode.max_correctable();
    let threshold = limit.saturating_sub(NEAR_LIMIT_MARGIN);
    let mut report = EccReport::default();
    for sector in 0..sectors {
        let bitflips = sector_bitflips(counters, sector);
        report.max_bitflips = report.max_bitflips.max(bitflips);
        if bitflips >= threshold {
            warn!("ECC near limit in sector {}: {}/{}", sector, bitflips, limit);
            report.near_limit |= 1 << sector;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Adds logging to the test automatically
    // control with RUST_LOG="LEVEL"
    // requires --features log passed to cargo test
    use test_log::test;

    #[test]
    fn clean_read() {
        let report = check(0, &[0; 4], 2, EccMode::BCH16).unwrap();
        assert_eq!(report, EccReport::default());
        assert!(!report.is_near_limit());
    }

    #[test]
    fn counters_are_packed_bytes() {
        let counters = [0x0403_0201, 0x0807_0605, 0, 0x4000_0000];
        assert_eq!(sector_bitflips(&counters, 0), 1);
        assert_eq!(sector_bitflips(&counters, 3), 4);
        assert_eq!(sector_bitflips(&counters, 6), 7);
        assert_eq!(sector_bitflips(&counters, 15), 0x40);
    }

    #[test]
    fn corrected_flips_are_reported() {
        let report = check(0, &[0x0000_0305, 0, 0, 0], 2, EccMode::BCH16).unwrap();
        assert_eq!(report.max_bitflips, 5);
        assert!(!report.is_near_limit());
    }

    #[test]
    fn near_limit_is_a_warning() {
        // 12 >= 16 - 4
        let report = check(0, &[0x0000_0C00, 0, 0, 0], 2, EccMode::BCH16).unwrap();
        assert_eq!(report.near_limit, 0b10);
        assert_eq!(report.max_bitflips, 12);
        // 11 stays below the threshold
        let report = check(0, &[0x0000_0B00, 0, 0, 0], 2, EccMode::BCH16).unwrap();
        assert!(!report.is_near_limit());
    }

    #[test]
    fn threshold_follows_mode() {
        let counters = [0x0000_0014, 0, 0, 0];
        assert!(check(0, &counters, 1, EccMode::BCH24).unwrap().is_near_limit());
        assert!(!check(0, &counters, 1, EccMode::BCH28).unwrap().is_near_limit());
    }

    #[test]
    fn uncorrectable_regardless_of_count() {
        assert_eq!(
            check(0b100, &[0; 4], 4, EccMode::BCH64),
            Err(NfcError::EccUncorrectable { sector: 2 })
        );
    }

    #[test]
    fn only_active_sectors_are_checked() {
        // Sector 5 flag and counter lie outside a two sector page
        assert!(check(1 << 5, &[0, 0x0000_FF00, 0, 0], 2, EccMode::BCH16).is_ok());
        // Status bits above the mask are ignored
        assert!(check(0xFFFF_0000, &[0; 4], 16, EccMode::BCH16).is_ok());
    }
}
