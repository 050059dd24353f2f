//! Module clock divider.
//!
//! The controller's module clock is `source / 2^n / (m + 1)` and runs at twice the
//! interface clock of the flash bus.

/// Pre-divider exponent `n` and divider `m`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockDivider {
    /// Pre-divider exponent, at most [ClockDivider::MAX_N]
    pub n: u8,
    /// Divider minus one, at most [ClockDivider::MAX_M]
    pub m: u8,
}

impl ClockDivider {
    pub const MAX_N: u8 = 2;
    pub const MAX_M: u8 = 15;

    /// Smallest divider that keeps the interface clock at or below `target_hz`.
    ///
    /// The ratio `d = ceil(source / (2 * target))` is halved (rounding up to even
    /// first) into the pre-divider while it exceeds 16 and `n` allows it. If it still
    /// does not fit, `m` saturates at 15 and the clock ends up faster than requested.
    pub fn for_target(source_hz: u32, target_hz: u32) -> Self {
        let module_hz = target_hz.saturating_mul(2).max(1);
        let mut d = source_hz.div_ceil(module_hz);
        let mut n = 0;
        while d > 16 && n < Self::MAX_N {
            if d % 2 != 0 {
                d += 1;
            }
            d >>= 1;
            n += 1;
        }
        let m = d.saturating_sub(1).min(Self::MAX_M as u32) as u8;
        ClockDivider { n, m }
    }

    /// Module clock produced from `source_hz`
    pub const fn module_clock(&self, source_hz: u32) -> u32 {
        (source_hz >> self.n) / (self.m as u32 + 1)
    }

    /// Interface clock on the flash bus
    pub const fn interface_clock(&self, source_hz: u32) -> u32 {
        self.module_clock(source_hz) / 2
    }
}

/// Clock tree access needed by the controller
pub trait ClockControl {
    /// Frequency of the clock feeding the controller's divider
    fn source_clock_hz(&self) -> u32;

    /// Program the divider, select the source and open the controller and DMA clock gates
    fn set_nand_divider(&mut self, divider: ClockDivider);

    /// Route the NAND pins to the controller. Boards that do this elsewhere keep the default.
    fn configure_pins(&mut self) {}
}

/// Program `clock` for an interface clock of at most `target_hz`
pub fn set_interface_clock<C: ClockControl>(clock: &mut C, target_hz: u32) -> ClockDivider {
    let source_hz = clock.source_clock_hz();
    let divider = ClockDivider::for_target(source_hz, target_hz);
    clock.set_nand_divider(divider);
    debug!(
        "NAND clock: source {} Hz, n={} m={}, module {} Hz (target {} Hz)",
        source_hz,
        divider.n,
        divider.m,
        divider.module_clock(source_hz),
        target_hz
    );
    divider
}

#[cfg(test)]
mod tests {
    use super::*;

    // Adds logging to the test automatically
    // control with RUST_LOG="LEVEL"
    // requires --features log passed to cargo test
    use test_log::test;

    const PLL5: u32 = 384_000_000;

    #[test]
    fn probe_clock() {
        // ceil(384 / 20) = 20 -> halved once
        let divider = ClockDivider::for_target(PLL5, 10_000_000);
        assert_eq!(divider, ClockDivider { n: 1, m: 9 });
        assert_eq!(divider.module_clock(PLL5), 19_200_000);
    }

    #[test]
    fn operating_clock() {
        // ceil(384 / 60) = 7 fits without a pre-divider
        let divider = ClockDivider::for_target(PLL5, 30_000_000);
        assert_eq!(divider, ClockDivider { n: 0, m: 6 });
    }

    #[test]
    fn odd_ratio_rounds_up_before_halving() {
        // ceil(1000 / 30) = 34 -> 17 -> 18 -> 9
        let divider = ClockDivider::for_target(1_000_000_000, 15_000_000);
        assert_eq!(divider, ClockDivider { n: 2, m: 8 });
        assert!(divider.interface_clock(1_000_000_000) <= 15_000_000);
    }

    #[test]
    fn overflow_saturates() {
        let divider = ClockDivider::for_target(u32::MAX, 1_000);
        assert_eq!(divider.n, ClockDivider::MAX_N);
        assert_eq!(divider.m, ClockDivider::MAX_M);
    }

    #[test]
    fn interface_clock_never_exceeds_target() {
        for source_hz in [24_000_000u32, 297_000_000, 384_000_000, 600_000_000, 912_000_000] {
            for target_mhz in [5, 10, 15, 20, 24, 30] {
                let target_hz = target_mhz * 1_000_000;
                // Ratios beyond 4 * 16 saturate
                if source_hz.div_ceil(2 * target_hz) > 64 {
                    continue;
                }
                let divider = ClockDivider::for_target(source_hz, target_hz);
                assert!(divider.n <= ClockDivider::MAX_N, "n={} for {} / {}", divider.n, source_hz, target_hz);
                assert!(divider.m <= ClockDivider::MAX_M);
                assert!(
                    divider.interface_clock(source_hz) <= target_hz,
                    "{} / {} gave {:?}",
                    source_hz,
                    target_hz,
                    divider
                );
                // One step less division would overshoot
                if divider.n == 0 && divider.m > 0 {
                    let faster = ClockDivider {
                        n: 0,
                        m: divider.m - 1,
                    };
                    assert!(faster.module_clock(source_hz) as u64 > 2 * target_hz as u64);
                }
            }
        }
    }

    struct RecordingClock {
        set: Option<ClockDivider>,
    }

    impl ClockControl for RecordingClock {
        fn source_clock_hz(&self) -> u32 {
            PLL5
        }

        fn set_nand_divider(&mut self, divider: ClockDivider) {
            self.set = Some(divider);
        }
    }

    #[test]
    fn programs_divider() {
        let mut clock = RecordingClock { set: None };
        let divider = set_interface_clock(&mut clock, 30_000_000);
        assert_eq!(clock.set, Some(divider));
    }
}
