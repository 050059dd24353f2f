//! Driver for the on-die raw NAND flash controller (NFC).
//!
//! [NandController] owns the controller registers, a DMA channel and the single
//! staging buffer used for page I/O, and implements the [raw_nand::RawNand]
//! chip-driver contract on top of them.
//!
//! Hardware access goes through small capability traits so that the same engine
//! runs against real registers ([regs::Mmio]) or the register-level simulator
//! in [sim] (feature `sim`):
//! - [regs::Registers] for the controller register block
//! - [dma::DmaChannel] and [dma::CacheMaintenance] for data transfers
//! - [clock::ClockControl] for the module clock
#![cfg_attr(not(test), no_std)]

// Must be first to share macros across crate
pub(crate) mod fmt;

#[cfg(feature = "sim")]
extern crate alloc;

pub mod buffer;
pub mod catalog;
pub mod clock;
mod config;
pub mod descriptor;
pub mod dma;
pub mod ecc;
mod engine;
pub mod error;
pub mod regs;
#[cfg(feature = "sim")]
pub mod sim;

pub use config::NandConfig;
pub use engine::{NandController, ProbedChip, WriteState};
pub use error::NfcError;
