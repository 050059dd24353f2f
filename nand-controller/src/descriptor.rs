//! Register level description of one controller transaction.
//!
//! Each logical [raw_nand::Command] maps to exactly one [CommandDescriptor],
//! which the engine replays onto the register block. Building a descriptor is
//! pure, so the protocol can be checked without any hardware.

use crate::{
    dma::Direction,
    error::NfcError,
    regs::{cmd, RCMD_SET_PAGE_READ, RCMD_SET_RANDOM_OUT, WCMD_SET_PAGE_PROGRAM},
};
use raw_nand::{opcode, ChipGeometry, SECTOR_SIZE};

/// Operation a descriptor was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    Reset,
    ReadId,
    ReadParam,
    RandomDataOut,
    ReadPage,
    ReadOob,
    EraseSetup,
    EraseConfirm,
    PageProgram,
    Status,
}

/// Value for the second cycle command set registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuxCommand {
    /// Written to [crate::regs::Reg::RcmdSet]
    Read(u32),
    /// Written to [crate::regs::Reg::WcmdSet]
    Write(u32),
}

/// DMA transfer between the staging buffer and the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer {
    pub direction: Direction,
    pub len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandDescriptor {
    pub op: Operation,
    /// First command cycle
    pub opcode: u8,
    /// Byte offset within the page
    pub column: u32,
    /// Page index
    pub row: u32,
    pub address_cycles: u8,
    /// Bytes moved through the controller's data RAM, 0 for none
    pub byte_count: u32,
    /// ECC sectors of a page command, 0 for other commands
    pub sector_count: u32,
    /// Hardware ECC is enabled for the transaction
    pub ecc: bool,
    /// Completion waits for the chip's ready/busy line
    pub wait_rb: bool,
    pub dma: Option<Transfer>,
    pub aux: Option<AuxCommand>,
    /// Extra bits ORed into the command register
    pub flags: u32,
}

impl CommandDescriptor {
    const fn bare(op: Operation, opcode: u8) -> Self {
        CommandDescriptor {
            op,
            opcode,
            column: 0,
            row: 0,
            address_cycles: 0,
            byte_count: 0,
            sector_count: 0,
            ecc: false,
            wait_rb: false,
            dma: None,
            aux: None,
            flags: 0,
        }
    }

    pub const fn reset() -> Self {
        Self::bare(Operation::Reset, opcode::RESET)
    }

    /// 8 ID bytes, one address cycle
    pub const fn read_id() -> Self {
        CommandDescriptor {
            address_cycles: 1,
            byte_count: 8,
            ..Self::bare(Operation::ReadId, opcode::READ_ID)
        }
    }

    /// 1 KiB parameter page
    pub const fn read_param() -> Self {
        CommandDescriptor {
            address_cycles: 1,
            byte_count: 1024,
            wait_rb: true,
            ..Self::bare(Operation::ReadParam, opcode::READ_PARAM)
        }
    }

    /// Move the output column and read `oob_size` bytes from it
    pub const fn random_data_out(column: u32, oob_size: u16) -> Self {
        CommandDescriptor {
            column,
            address_cycles: 2,
            byte_count: oob_size as u32,
            wait_rb: true,
            aux: Some(AuxCommand::Read(RCMD_SET_RANDOM_OUT)),
            flags: cmd::SEQ | cmd::SEND_CMD2,
            ..Self::bare(Operation::RandomDataOut, opcode::RANDOM_DATA_OUT)
        }
    }

    /// ECC checked read of a whole page into the staging buffer
    pub const fn read_page(column: u32, row: u32, geometry: &ChipGeometry) -> Self {
        CommandDescriptor {
            column,
            row,
            address_cycles: geometry.address_cycles(),
            byte_count: SECTOR_SIZE as u32,
            sector_count: geometry.sectors_per_page(),
            ecc: true,
            wait_rb: true,
            dma: Some(Transfer {
                direction: Direction::ControllerToMemory,
                len: geometry.page_size() as usize,
            }),
            aux: Some(AuxCommand::Read(RCMD_SET_PAGE_READ)),
            flags: cmd::SEND_CMD2 | cmd::DATA_SWAP_METHOD | cmd::TYPE_PAGE,
            ..Self::bare(Operation::ReadPage, opcode::READ0)
        }
    }

    /// Read of the single sector following the main area. `column` is relative to the spare area.
    pub const fn read_oob(column: u32, row: u32, geometry: &ChipGeometry) -> Self {
        CommandDescriptor {
            op: Operation::ReadOob,
            column: column + geometry.page_size(),
            sector_count: 1,
            ecc: false,
            dma: Some(Transfer {
                direction: Direction::ControllerToMemory,
                len: SECTOR_SIZE,
            }),
            ..Self::read_page(0, row, geometry)
        }
    }

    /// First erase cycle with the row address
    pub const fn erase_setup(row: u32) -> Self {
        CommandDescriptor {
            row,
            address_cycles: 3,
            ..Self::bare(Operation::EraseSetup, opcode::ERASE1)
        }
    }

    pub const fn erase_confirm() -> Self {
        Self::bare(Operation::EraseConfirm, opcode::ERASE2)
    }

    /// Program the staging buffer to (`column`, `row`).
    ///
    /// Column 0 writes the whole page with ECC, the spare column writes one
    /// unprotected sector. Anything else is rejected.
    pub fn program(column: u32, row: u32, geometry: &ChipGeometry) -> Result<Self, NfcError> {
        let (sector_count, ecc, len) = if column == 0 {
            (
                geometry.sectors_per_page(),
                true,
                geometry.page_size() as usize,
            )
        } else if column == geometry.page_size() {
            (1, false, SECTOR_SIZE)
        } else {
            return Err(NfcError::UnsupportedColumn(column as u16));
        };
        Ok(CommandDescriptor {
            column,
            row,
            address_cycles: geometry.address_cycles(),
            byte_count: SECTOR_SIZE as u32,
            sector_count,
            ecc,
            dma: Some(Transfer {
                direction: Direction::MemoryToController,
                len,
            }),
            aux: Some(AuxCommand::Write(WCMD_SET_PAGE_PROGRAM)),
            flags: cmd::SEND_CMD2 | cmd::DATA_SWAP_METHOD | cmd::ACCESS_DIR | cmd::TYPE_PAGE,
            ..Self::bare(Operation::PageProgram, opcode::SEQIN)
        })
    }

    pub const fn status() -> Self {
        CommandDescriptor {
            byte_count: 1,
            ..Self::bare(Operation::Status, opcode::STATUS)
        }
    }

    /// Address register values for this transaction
    pub const fn address(&self) -> (u32, u32) {
        pack_address(self.address_cycles, self.column, self.row)
    }

    /// Per-sector user data registers take part in the transfer
    pub const fn uses_user_data(&self) -> bool {
        self.ecc && self.sector_count > 0
    }

    /// Data arrives in the controller RAM window rather than over DMA
    pub const fn reads_ram(&self) -> bool {
        self.dma.is_none() && self.byte_count > 0
    }

    /// Value of the command register that starts the transaction
    pub const fn command_word(&self) -> u32 {
        let mut word = self.opcode as u32 | self.flags;
        if self.address_cycles > 0 {
            word |= cmd::SEND_ADR | ((self.address_cycles as u32 - 1) << cmd::ADR_NUM_SHIFT);
        }
        if self.wait_rb {
            word |= cmd::WAIT_FLAG;
        }
        if self.byte_count > 0 {
            word |= cmd::DATA_TRANS;
        }
        word | cmd::SEND_CMD1
    }
}

/// Split column and row into the low and high address registers.
///
/// Four and five cycle addresses carry the column in the low half word and the
/// row above it. The fifth cycle moves bits 16..24 of the row into the high register.
pub const fn pack_address(cycles: u8, column: u32, row: u32) -> (u32, u32) {
    match cycles {
        1 => (column & 0xFF, 0),
        2 => (column & 0xFFFF, 0),
        3 => (row & 0xFF_FFFF, 0),
        4 => ((column & 0xFFFF) | (row << 16), 0),
        5 => ((column & 0xFFFF) | (row << 16), (row >> 16) & 0xFF),
        _ => (0, 0),
    }
}
