//! Boot image container.
//!
//! A container starts with a little endian header (magic, entry count, CRC)
//! followed by one fixed size record per packed image. Parsing borrows the raw
//! bytes, nothing is copied.

use thiserror::Error;

/// "PACK" read as a little endian word
pub const PACK_MAGIC: u32 = 0x4B43_4150;
pub const HEADER_SIZE: usize = 12;
pub const ENTRY_SIZE: usize = 48;
pub const NAME_LEN: usize = 32;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageError {
    #[error("Container shorter than its header")]
    TooShort,
    #[error("Bad container magic {0:#010x}")]
    BadMagic(u32),
    #[error("Container holds {available} of {expected} entries")]
    Truncated { expected: u32, available: u32 },
}

fn word(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackHeader {
    pub magic: u32,
    pub entry_count: u32,
    pub crc: u32,
}

impl PackHeader {
    /// Total size of header and entry table
    pub fn table_size(&self) -> usize {
        HEADER_SIZE + self.entry_count as usize * ENTRY_SIZE
    }
}

/// One packed image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PackEntry {
    /// Offset of the image data from the start of the container
    pub offset: u32,
    pub size: u32,
    /// Address the image is meant to be loaded to
    pub load_address: u32,
    pub crc: u32,
    /// NUL padded
    pub name: [u8; NAME_LEN],
}

impl PackEntry {
    fn parse(raw: &[u8]) -> Self {
        let mut name = [0; NAME_LEN];
        name.copy_from_slice(&raw[16..16 + NAME_LEN]);
        PackEntry {
            offset: word(raw, 0),
            size: word(raw, 4),
            load_address: word(raw, 8),
            crc: word(raw, 12),
            name,
        }
    }

    /// Name up to the first NUL, [None] if it isn't UTF-8
    pub fn name(&self) -> Option<&str> {
        let len = self.name.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
        core::str::from_utf8(&self.name[..len]).ok()
    }
}

/// Parsed view of a container
#[derive(Debug, Clone, Copy)]
pub struct PackImage<'a> {
    header: PackHeader,
    table: &'a [u8],
}

impl<'a> PackImage<'a> {
    /// Check the header of `bytes` and that the whole entry table is present.
    ///
    /// Image data past the table is not required, so the first pages of a container
    /// are enough to learn where its images live.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ImageError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ImageError::TooShort);
        }
        let header = PackHeader {
            magic: word(bytes, 0),
            entry_count: word(bytes, 4),
            crc: word(bytes, 8),
        };
        if header.magic != PACK_MAGIC {
            return Err(ImageError::BadMagic(header.magic));
        }
        let available = (bytes.len() - HEADER_SIZE) / ENTRY_SIZE;
        if (available as u64) < header.entry_count as u64 {
            return Err(ImageError::Truncated {
                expected: header.entry_count,
                available: available as u32,
            });
        }
        debug!("Container with {} entries", header.entry_count);
        Ok(PackImage {
            header,
            table: &bytes[HEADER_SIZE..header.table_size()],
        })
    }

    pub fn header(&self) -> &PackHeader {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.header.entry_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry(&self, index: usize) -> Option<PackEntry> {
        let start = index.checked_mul(ENTRY_SIZE)?;
        self.table.get(start..start + ENTRY_SIZE).map(PackEntry::parse)
    }

    pub fn entries(&self) -> impl Iterator<Item = PackEntry> + 'a {
        self.table.chunks_exact(ENTRY_SIZE).map(PackEntry::parse)
    }

    /// First entry called `name`
    pub fn find(&self, name: &str) -> Option<PackEntry> {
        self.entries().find(|entry| entry.name() == Some(name))
    }
}
