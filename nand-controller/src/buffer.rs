//! Staging buffer shared by the engine and the byte level accessors.
//!
//! Page data goes through this buffer in both directions: DMA fills it on reads
//! and drains it on programs, while `read_buf`/`write_buf` move bytes between it
//! and the caller. The spare area words of each sector live right after the page.

use crate::error::NfcError;

/// Largest supported page
pub const MAX_PAGE_SIZE: usize = 1 << 14;

/// Room after the page for the per-sector spare words
pub const SPARE_TAIL: usize = 1024;

/// Total buffer capacity
pub const CAPACITY: usize = MAX_PAGE_SIZE + SPARE_TAIL;

/// Word aligned page buffer with independent read and write cursors
#[repr(C, align(4))]
pub struct StagingBuffer {
    data: [u8; CAPACITY],
    len: usize,
    read_pos: usize,
    write_pos: usize,
}

impl Default for StagingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for StagingBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StagingBuffer")
            .field("len", &self.len)
            .field("read_pos", &self.read_pos)
            .field("write_pos", &self.write_pos)
            .finish_non_exhaustive()
    }
}

impl StagingBuffer {
    pub const fn new() -> Self {
        StagingBuffer {
            data: [0; CAPACITY],
            len: CAPACITY,
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Usable length, page size plus spare tail once a chip is probed
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Limit the usable length. Lengths past the capacity are rejected.
    pub fn set_len(&mut self, len: usize) -> Result<(), NfcError> {
        if len > CAPACITY {
            return Err(NfcError::BufferOverrun);
        }
        self.len = len;
        self.reset_read();
        self.reset_write();
        Ok(())
    }

    pub const fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub const fn write_pos(&self) -> usize {
        self.write_pos
    }

    pub fn reset_read(&mut self) {
        self.read_pos = 0;
    }

    pub fn reset_write(&mut self) {
        self.write_pos = 0;
    }

    /// Copy bytes at the read cursor into `dst` and advance.
    ///
    /// Fails without copying anything if `dst` does not fit before the end.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<(), NfcError> {
        let end = self
            .read_pos
            .checked_add(dst.len())
            .filter(|end| *end <= self.len)
            .ok_or(NfcError::BufferOverrun)?;
        dst.copy_from_slice(&self.data[self.read_pos..end]);
        self.read_pos = end;
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8, NfcError> {
        let mut byte = [0];
        self.read(&mut byte)?;
        Ok(byte[0])
    }

    /// Copy `src` to the write cursor and advance.
    ///
    /// Fails without copying anything if `src` does not fit before the end.
    pub fn write(&mut self, src: &[u8]) -> Result<(), NfcError> {
        let end = self
            .write_pos
            .checked_add(src.len())
            .filter(|end| *end <= self.len)
            .ok_or(NfcError::BufferOverrun)?;
        self.data[self.write_pos..end].copy_from_slice(src);
        self.write_pos = end;
        Ok(())
    }

    /// Copy `src` to `offset`, bypassing the cursors and the usable length
    pub fn load(&mut self, offset: usize, src: &[u8]) -> Result<(), NfcError> {
        let end = offset
            .checked_add(src.len())
            .filter(|end| *end <= CAPACITY)
            .ok_or(NfcError::BufferOverrun)?;
        self.data[offset..end].copy_from_slice(src);
        Ok(())
    }

    /// Fill the first `len` bytes from `byte`, called with each offset
    pub fn fill_with(&mut self, len: usize, mut byte: impl FnMut(usize) -> u8) -> Result<(), NfcError> {
        let dst = self.data.get_mut(..len).ok_or(NfcError::BufferOverrun)?;
        for (offset, slot) in dst.iter_mut().enumerate() {
            *slot = byte(offset);
        }
        Ok(())
    }

    /// Spare word of `sector` stored after a page of `page_size` bytes
    pub fn spare_word(&self, page_size: usize, sector: usize) -> u32 {
        let at = page_size + 4 * sector;
        match self.data.get(at..at + 4) {
            Some(bytes) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            None => 0,
        }
    }

    pub fn set_spare_word(&mut self, page_size: usize, sector: usize, word: u32) {
        let at = page_size + 4 * sector;
        if let Some(bytes) = self.data.get_mut(at..at + 4) {
            bytes.copy_from_slice(&word.to_le_bytes());
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Start of the buffer, memory side address of DMA transfers
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }
}
