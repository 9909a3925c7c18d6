//! Little-endian cursor helpers and bit-field masks.
//!
//! Serializers validate the full output length up front, then write through
//! these cursors without per-field bounds branches. Slicing still panics on
//! misuse, so callers must size buffers with
//! [`calculate_table_size`](super::calculate_table_size) first.

/// Returns a mask covering the low `bits` bits.
#[inline]
pub const fn mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Reads `bits` bits starting at `shift` from a packed word.
#[inline]
pub const fn extract(word: u64, shift: u32, bits: u32) -> u64 {
    (word >> shift) & mask(bits)
}

/// Replaces `bits` bits starting at `shift`; out-of-range values are truncated.
#[inline]
pub const fn insert(word: u64, shift: u32, bits: u32, value: u64) -> u64 {
    let field = mask(bits) << shift;
    (word & !field) | ((value << shift) & field)
}

/// Cursor writing little-endian integers into a preallocated buffer.
///
/// Writes past the end of the buffer panic; callers size the buffer from
/// [`calculate_table_size`](crate::headers::calculate_table_size) first.
#[derive(Debug)]
pub struct LittleEndianWriter<'a> {
    buffer: &'a mut [u8],
    position: usize,
}

impl<'a> LittleEndianWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer[self.position..self.position + 4].copy_from_slice(&value.to_le_bytes());
        self.position += 4;
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.buffer[self.position..self.position + 8].copy_from_slice(&value.to_le_bytes());
        self.position += 8;
    }

    /// Writes at `position + offset` without moving the cursor.
    #[inline]
    pub fn write_u32_at_offset(&mut self, value: u32, offset: usize) {
        let start = self.position + offset;
        self.buffer[start..start + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes at `position + offset` without moving the cursor.
    #[inline]
    pub fn write_u64_at_offset(&mut self, value: u64, offset: usize) {
        let start = self.position + offset;
        self.buffer[start..start + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Copies `bytes` at the cursor and moves past them.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
    }

    #[inline]
    pub fn seek(&mut self, count: usize) {
        self.position += count;
    }
}

/// Cursor reading little-endian integers from a borrowed buffer.
///
/// Reads past the end panic. Check [`remaining`](Self::remaining) before
/// reading untrusted input.
#[derive(Debug, Clone)]
pub struct LittleEndianReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> LittleEndianReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    #[inline]
    pub fn read_u32(&mut self) -> u32 {
        let value = self.read_u32_at_offset(0);
        self.position += 4;
        value
    }

    #[inline]
    pub fn read_u64(&mut self) -> u64 {
        let value = self.read_u64_at_offset(0);
        self.position += 8;
        value
    }

    /// Reads at `position + offset` without moving the cursor.
    #[inline]
    pub fn read_u32_at_offset(&self, offset: usize) -> u32 {
        let start = self.position + offset;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buffer[start..start + 4]);
        u32::from_le_bytes(bytes)
    }

    /// Reads at `position + offset` without moving the cursor.
    #[inline]
    pub fn read_u64_at_offset(&self, offset: usize) -> u64 {
        let start = self.position + offset;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.buffer[start..start + 8]);
        u64::from_le_bytes(bytes)
    }

    /// Borrows the next `count` bytes and moves past them.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> &'a [u8] {
        let bytes = &self.buffer[self.position..self.position + count];
        self.position += count;
        bytes
    }

    #[inline]
    pub fn seek(&mut self, count: usize) {
        self.position += count;
    }
}
