use raw_nand::{NandFlashError, NandFlashErrorKind};

/// Error type for the NAND flash controller driver.
///
/// Only failures that the engine surfaces to its caller appear here. Command FIFO,
/// command complete and ready/busy waits that run out of retries are logged and
/// the engine carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NfcError {
    /// A bounded wait ran out of retries
    #[error("Timed out waiting for the controller")]
    Timeout,
    /// Probed ID is not in the catalog, or the catalog entry is unusable
    #[error("Unknown NAND chip")]
    UnknownChip,
    /// Board configuration cannot describe a chip
    #[error("Invalid NAND configuration")]
    InvalidConfig,
    /// Program requested at a column other than 0 or the spare area
    #[error("Program at unsupported column {0}")]
    UnsupportedColumn(u16),
    /// A sector reported more bit flips than the ECC mode can correct
    #[error("Uncorrectable ECC error in sector {sector}")]
    EccUncorrectable { sector: u8 },
    /// DMA transfer did not complete within the poll budget
    #[error("DMA transfer did not complete")]
    DmaFailure,
    /// Page operation issued before a chip was probed
    #[error("No chip probed")]
    NotProbed,
    /// Page program without a preceding begin-write
    #[error("Page program without pending write")]
    NoPendingWrite,
    /// Access past the end of the staging buffer
    #[error("Staging buffer overrun")]
    BufferOverrun,
}

impl NandFlashError for NfcError {
    fn kind(&self) -> NandFlashErrorKind {
        match self {
            NfcError::Timeout => NandFlashErrorKind::Timeout,
            NfcError::UnknownChip => NandFlashErrorKind::UnknownChip,
            NfcError::InvalidConfig => NandFlashErrorKind::Other,
            NfcError::UnsupportedColumn(_) => NandFlashErrorKind::UnsupportedColumn,
            NfcError::EccUncorrectable { .. } => NandFlashErrorKind::EccUncorrectable,
            NfcError::DmaFailure => NandFlashErrorKind::DmaFailure,
            NfcError::NotProbed => NandFlashErrorKind::NotProbed,
            NfcError::NoPendingWrite => NandFlashErrorKind::InvalidSequence,
            NfcError::BufferOverrun => NandFlashErrorKind::BufferOverrun,
        }
    }
}
