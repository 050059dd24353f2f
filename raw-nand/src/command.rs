use crate::{ColumnAddress, PageIndex};

/// Standard raw NAND command opcodes (first command cycle unless noted)
pub mod opcode {
    pub const READ0: u8 = 0x00;
    pub const RANDOM_DATA_OUT: u8 = 0x05;
    pub const PAGE_PROGRAM: u8 = 0x10;
    pub const READ_START: u8 = 0x30;
    pub const READ_OOB: u8 = 0x50;
    pub const ERASE1: u8 = 0x60;
    pub const STATUS: u8 = 0x70;
    pub const SEQIN: u8 = 0x80;
    pub const RANDOM_DATA_IN: u8 = 0x85;
    pub const READ_ID: u8 = 0x90;
    pub const ERASE2: u8 = 0xD0;
    pub const RANDOM_DATA_OUT_START: u8 = 0xE0;
    pub const READ_PARAM: u8 = 0xEC;
    pub const RESET: u8 = 0xFF;
}

/// A logical NAND operation together with the address it needs.
///
/// Writing a page is a two step sequence: [Command::SeqIn] latches the target,
/// data is then supplied with [crate::RawNand::write_buf], and
/// [Command::PageProgram] commits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Reset the chip and wait for it to come back
    Reset,
    /// Read the 8 byte chip ID
    ReadId,
    /// Read the 1 KiB parameter page
    ReadParam,
    /// Read a page into the staging buffer, ECC checked
    ReadPage {
        column: ColumnAddress,
        page: PageIndex,
    },
    /// Read the spare area of a page, `column` is relative to the start of the spare area
    ReadOob {
        column: ColumnAddress,
        page: PageIndex,
    },
    /// Move the output column of the page currently in the chip's register
    RandomDataOut { column: ColumnAddress },
    /// First erase cycle, selects the block containing `page`
    EraseSetup { page: PageIndex },
    /// Second erase cycle, starts the erase
    EraseConfirm,
    /// Begin a write at (column, page), touches no hardware
    SeqIn {
        column: ColumnAddress,
        page: PageIndex,
    },
    /// Program the data written since the last [Command::SeqIn]
    PageProgram,
    /// Read the status byte
    Status,
}

impl Command {
    /// Opcode of the first command cycle as sent on the bus
    pub const fn opcode(&self) -> u8 {
        match self {
            Command::Reset => opcode::RESET,
            Command::ReadId => opcode::READ_ID,
            Command::ReadParam => opcode::READ_PARAM,
            Command::ReadPage { .. } | Command::ReadOob { .. } => opcode::READ0,
            Command::RandomDataOut { .. } => opcode::RANDOM_DATA_OUT,
            Command::EraseSetup { .. } => opcode::ERASE1,
            Command::EraseConfirm => opcode::ERASE2,
            Command::SeqIn { .. } | Command::PageProgram => opcode::SEQIN,
            Command::Status => opcode::STATUS,
        }
    }
}
