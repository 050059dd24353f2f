//! Controller register block.

/// Physical base address of the controller register block
pub const NFC_BASE: usize = 0x01C0_3000;

/// Offset of the controller's internal 1 KiB data RAM window
pub const RAM0_OFFSET: usize = 0x400;

/// Size of the internal data RAM window
pub const RAM0_SIZE: usize = 1024;

/// Number of per-sector user data registers
pub const USER_DATA_COUNT: u8 = 16;

/// 32-bit registers of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    Ctl,
    St,
    Int,
    TimingCtl,
    TimingCfg,
    AddrLow,
    AddrHigh,
    SectorNum,
    Cnt,
    Cmd,
    RcmdSet,
    WcmdSet,
    IoData,
    EccCtl,
    EccSt,
    Debug,
    /// Corrected bit counters, four sectors per register, one byte each
    EccCnt(u8),
    /// Spare area word of one sector
    UserData(u8),
    SpareArea,
}

impl Reg {
    /// Byte offset from the start of the register block
    pub const fn offset(self) -> usize {
        match self {
            Reg::Ctl => 0x00,
            Reg::St => 0x04,
            Reg::Int => 0x08,
            Reg::TimingCtl => 0x0C,
            Reg::TimingCfg => 0x10,
            Reg::AddrLow => 0x14,
            Reg::AddrHigh => 0x18,
            Reg::SectorNum => 0x1C,
            Reg::Cnt => 0x20,
            Reg::Cmd => 0x24,
            Reg::RcmdSet => 0x28,
            Reg::WcmdSet => 0x2C,
            Reg::IoData => 0x30,
            Reg::EccCtl => 0x34,
            Reg::EccSt => 0x38,
            Reg::Debug => 0x3C,
            Reg::EccCnt(i) => 0x40 + 4 * (i as usize & 0x3),
            Reg::UserData(i) => 0x50 + 4 * (i as usize & 0xF),
            Reg::SpareArea => 0xA0,
        }
    }
}

/// Bits of [Reg::Ctl]
pub mod ctl {
    pub const EN: u32 = 1 << 0;
    pub const RESET: u32 = 1 << 1;
    pub const BUS_WIDTH: u32 = 1 << 2;
    pub const RB_SEL: u32 = 1 << 3;
    pub const CE_CTL: u32 = 1 << 6;
    pub const CE_CTL1: u32 = 1 << 7;
    pub const PAGE_SIZE_SHIFT: u32 = 8;
    pub const PAGE_SIZE: u32 = 0xF << PAGE_SIZE_SHIFT;
    pub const SAM: u32 = 1 << 12;
    /// Data RAM is accessed over the DMA bus instead of AHB
    pub const RAM_METHOD: u32 = 1 << 14;
    pub const CE_SEL_SHIFT: u32 = 24;
    pub const CE_SEL: u32 = 0x7 << CE_SEL_SHIFT;
    pub const DEBUG: u32 = 1 << 31;
}

/// Bits of [Reg::St]. Flags are write-one-to-clear.
pub mod st {
    pub const RB_B2R: u32 = 1 << 0;
    pub const CMD_INT_FLAG: u32 = 1 << 1;
    pub const DMA_INT_FLAG: u32 = 1 << 2;
    pub const CMD_FIFO_STATUS: u32 = 1 << 3;
    pub const STA: u32 = 1 << 4;
    pub const NATCH_INT_FLAG: u32 = 1 << 5;
    /// Ready/busy state of channel 0, channels 1..3 follow
    pub const RB_STATE0: u32 = 1 << 8;
}

/// Bits of [Reg::Int]
pub mod int {
    pub const B2R_ENABLE: u32 = 1 << 0;
    pub const CMD_ENABLE: u32 = 1 << 1;
    pub const DMA_ENABLE: u32 = 1 << 2;
}

/// Bits of [Reg::Cmd]
pub mod cmd {
    pub const LOW_BYTE: u32 = 0xFF;
    pub const ADR_NUM_SHIFT: u32 = 16;
    pub const ADR_NUM: u32 = 0x7 << ADR_NUM_SHIFT;
    pub const SEND_ADR: u32 = 1 << 19;
    /// Data flows towards the flash
    pub const ACCESS_DIR: u32 = 1 << 20;
    pub const DATA_TRANS: u32 = 1 << 21;
    pub const SEND_CMD1: u32 = 1 << 22;
    pub const WAIT_FLAG: u32 = 1 << 23;
    pub const SEND_CMD2: u32 = 1 << 24;
    pub const SEQ: u32 = 1 << 25;
    pub const DATA_SWAP_METHOD: u32 = 1 << 26;
    pub const ROW_AUTO_INC: u32 = 1 << 27;
    pub const SEND_CMD3: u32 = 1 << 28;
    pub const SEND_CMD4: u32 = 1 << 29;
    pub const TYPE_SHIFT: u32 = 30;
    pub const TYPE: u32 = 0x3 << TYPE_SHIFT;
    /// Page command: the controller moves whole sectors through its data RAM
    pub const TYPE_PAGE: u32 = 2 << TYPE_SHIFT;
}

/// Bits of [Reg::EccCtl]
pub mod ecc_ctl {
    pub const EN: u32 = 1 << 0;
    pub const PIPELINE: u32 = 1 << 3;
    pub const EXCEPTION: u32 = 1 << 4;
    pub const BLOCK_SIZE: u32 = 1 << 5;
    pub const RANDOM_EN: u32 = 1 << 9;
    pub const RANDOM_DIRECTION: u32 = 1 << 10;
    pub const MODE_SHIFT: u32 = 12;
    pub const MODE: u32 = 0xF << MODE_SHIFT;
}

/// Uncorrectable sector flags in [Reg::EccSt], one bit per sector
pub const ECC_ST_ERR_MASK: u32 = 0xFFFF;

/// Serial access mode for [Reg::TimingCtl]
pub const TIMING_CTL_SERIAL_ACCESS: u32 = 1 << 8;

/// Timing configuration used for all supported chips
pub const TIMING_CFG_DEFAULT: u32 = 0xFF;

/// Second command cycles for a page read: read start (0x30) plus random
/// data output (0x05, 0xE0)
pub const RCMD_SET_PAGE_READ: u32 = 0x00E0_0530;

/// Second command cycles for a page program: program (0x10) plus random data input (0x85)
pub const WCMD_SET_PAGE_PROGRAM: u32 = 0x0000_8510;

/// Second command cycle for random data output
pub const RCMD_SET_RANDOM_OUT: u32 = 0xE0;

/// Access to the controller register block.
///
/// The engine never touches memory directly, so the same code drives the real
/// controller through [Mmio] or a model of it in tests.
pub trait Registers {
    /// Read a 32-bit register
    fn read(&mut self, reg: Reg) -> u32;

    /// Write a 32-bit register
    fn write(&mut self, reg: Reg, value: u32);

    /// Read one byte of the internal data RAM window
    fn read_ram(&mut self, offset: usize) -> u8;

    /// Bus address of the data port, used as the controller side of DMA transfers
    fn data_port(&self) -> usize;

    /// Read-modify-write a register
    fn modify(&mut self, reg: Reg, f: impl FnOnce(u32) -> u32) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }
}

/// Volatile access to the memory mapped register block
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// Create register access for the block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the address of the controller register block, mapped as
    /// device memory, and nothing else may access the controller while this
    /// instance exists.
    pub const unsafe fn new(base: usize) -> Self {
        Mmio { base }
    }

    /// Register block at the default [NFC_BASE].
    ///
    /// # Safety
    ///
    /// See [Mmio::new].
    pub const unsafe fn default_base() -> Self {
        Mmio { base: NFC_BASE }
    }
}

impl Registers for Mmio {
    fn read(&mut self, reg: Reg) -> u32 {
        // SAFETY: the address lies in the register block handed to `new`
        unsafe { core::ptr::read_volatile((self.base + reg.offset()) as *const u32) }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        // SAFETY: the address lies in the register block handed to `new`
        unsafe { core::ptr::write_volatile((self.base + reg.offset()) as *mut u32, value) }
    }

    fn read_ram(&mut self, offset: usize) -> u8 {
        let offset = offset % RAM0_SIZE;
        // SAFETY: offset is wrapped into the 1 KiB RAM window
        unsafe { core::ptr::read_volatile((self.base + RAM0_OFFSET + offset) as *const u8) }
    }

    fn data_port(&self) -> usize {
        self.base + Reg::IoData.offset()
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
    fn register_offsets() {
        assert_eq!(Reg::Cmd.offset(), 0x24);
        assert_eq!(Reg::EccSt.offset(), 0x38);
        assert_eq!(Reg::EccCnt(0).offset(), 0x40);
        assert_eq!(Reg::EccCnt(3).offset(), 0x4C);
        assert_eq!(Reg::UserData(0).offset(), 0x50);
        assert_eq!(Reg::UserData(15).offset(), 0x8C);
        assert_eq!(Reg::SpareArea.offset(), 0xA0);
    }

    #[test]
    fn data_port_address() {
        let regs = unsafe { Mmio::default_base() };
        assert_eq!(regs.data_port(), 0x01C0_3030);
    }
}
