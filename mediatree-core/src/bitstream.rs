//! Bit/byte addressable cursor over the file content.
//!
//! Reads are MSB-first and big-endian. Little-endian fields are read as
//! big-endian and flipped with `swap_bytes`, which is a value transform only:
//! the cursor itself has no notion of byte order.

use bytes::Bytes;

use crate::error::CursorError;

pub struct BitCursor {
    data: Bytes,
    /// Absolute position in bits, always within `0..=data.len() * 8`.
    bit_offset: u64,
}

impl BitCursor {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            bit_offset: 0,
        }
    }

    /// Total size of the underlying data, in bytes.
    pub fn total_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn absolute_bit_offset(&self) -> u64 {
        self.bit_offset
    }

    /// Byte containing the current bit (partial bytes round down).
    pub fn absolute_byte_offset(&self) -> u64 {
        self.bit_offset / 8
    }

    pub fn has_more_data(&self) -> bool {
        self.bit_offset < self.total_bits()
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.total_size().saturating_sub(self.absolute_byte_offset())
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset % 8 == 0
    }

    /// Drop whatever is left of a partially consumed byte.
    pub fn force_byte_alignment(&mut self) {
        let rem = self.bit_offset % 8;
        if rem != 0 {
            self.bit_offset += 8 - rem;
        }
    }

    fn total_bits(&self) -> u64 {
        self.total_size() * 8
    }

    fn check_read(&self, bits: u64) -> Result<(), CursorError> {
        let fits = self
            .bit_offset
            .checked_add(bits)
            .map_or(false, |end| end <= self.total_bits());
        if !fits {
            return Err(CursorError::OutOfRange {
                bits,
                bit_offset: self.bit_offset,
                size: self.total_size(),
            });
        }
        Ok(())
    }

    pub fn read_bits(&mut self, n: u32) -> Result<u32, CursorError> {
        if n > 32 {
            return Err(CursorError::Width(n));
        }
        Ok(self.read_bits64(n)? as u32)
    }

    pub fn read_bits64(&mut self, n: u32) -> Result<u64, CursorError> {
        if n > 64 {
            return Err(CursorError::Width(n));
        }
        if n == 0 {
            return Ok(0);
        }
        self.check_read(n as u64)?;

        if self.is_byte_aligned() && n % 8 == 0 {
            let start = (self.bit_offset / 8) as usize;
            let end = start + (n / 8) as usize;
            let value = self.data[start..end]
                .iter()
                .fold(0u64, |acc, &b| (acc << 8) | b as u64);
            self.bit_offset += n as u64;
            return Ok(value);
        }

        let mut value = 0u64;
        let mut remaining = n;
        while remaining > 0 {
            let byte = self.data[(self.bit_offset / 8) as usize];
            let used = (self.bit_offset % 8) as u32;
            let available = 8 - used;
            let take = available.min(remaining);
            let bits = (byte >> (available - take)) & (0xFFu8 >> (8 - take));
            value = (value << take) | bits as u64;
            remaining -= take;
            self.bit_offset += take as u64;
        }
        Ok(value)
    }

    pub fn read_bit(&mut self) -> Result<bool, CursorError> {
        Ok(self.read_bits64(1)? == 1)
    }

    /// Advance by `n` bits. Skipping past the end parks the cursor at the end
    /// and reports the overrun.
    pub fn skip_bits(&mut self, n: u64) -> Result<(), CursorError> {
        if let Err(e) = self.check_read(n) {
            self.bit_offset = self.total_bits();
            return Err(e);
        }
        self.bit_offset += n;
        Ok(())
    }

    pub fn rewind_bits(&mut self, n: u64) -> Result<(), CursorError> {
        if n > self.bit_offset {
            return Err(CursorError::BeforeStart {
                bits: n,
                bit_offset: self.bit_offset,
            });
        }
        self.bit_offset -= n;
        Ok(())
    }

    pub fn skip_bytes(&mut self, n: u64) -> Result<(), CursorError> {
        self.skip_bits(n.saturating_mul(8))
    }

    pub fn rewind_bytes(&mut self, n: u64) -> Result<(), CursorError> {
        self.rewind_bits(n.saturating_mul(8))
    }

    /// Jump to an absolute byte offset inside the data.
    pub fn goto_byte_offset(&mut self, pos: u64) -> Result<(), CursorError> {
        if pos >= self.total_size() {
            return Err(CursorError::SeekOutOfRange {
                target: pos,
                size: self.total_size(),
            });
        }
        self.bit_offset = pos * 8;
        Ok(())
    }

    pub fn seek_to_end(&mut self) {
        self.bit_offset = self.total_bits();
    }

    // ------------------------------------------------------------------
    // Byte-level helpers
    // ------------------------------------------------------------------

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.read_bits64(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        Ok(self.read_bits64(16)? as u16)
    }

    pub fn read_u24(&mut self) -> Result<u32, CursorError> {
        Ok(self.read_bits64(24)? as u32)
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        Ok(self.read_bits64(32)? as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64, CursorError> {
        self.read_bits64(64)
    }

    pub fn read_i16(&mut self) -> Result<i16, CursorError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, CursorError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, CursorError> {
        Ok(self.read_u16()?.swap_bytes())
    }

    pub fn read_u32_le(&mut self) -> Result<u32, CursorError> {
        Ok(self.read_u32()?.swap_bytes())
    }

    pub fn read_u64_le(&mut self) -> Result<u64, CursorError> {
        Ok(self.read_u64()?.swap_bytes())
    }

    pub fn read_i32_le(&mut self) -> Result<i32, CursorError> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32, CursorError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CursorError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        let mut out = [0u8; N];
        for b in out.iter_mut() {
            *b = self.read_u8()?;
        }
        Ok(out)
    }

    /// Read `n` bytes. Aligned reads share the underlying buffer.
    pub fn read_bytes(&mut self, n: u64) -> Result<Bytes, CursorError> {
        self.check_read(n.saturating_mul(8))?;
        if self.is_byte_aligned() {
            let start = self.absolute_byte_offset() as usize;
            let out = self.data.slice(start..start + n as usize);
            self.bit_offset += n * 8;
            return Ok(out);
        }
        let mut out = Vec::with_capacity(n as usize);
        for _ in 0..n {
            out.push(self.read_u8()?);
        }
        Ok(Bytes::from(out))
    }

    /// Byte range access that leaves the position untouched.
    pub fn slice(&self, start: u64, len: u64) -> Option<Bytes> {
        let end = start.checked_add(len)?;
        if end > self.total_size() {
            return None;
        }
        Some(self.data.slice(start as usize..end as usize))
    }
}

impl std::fmt::Debug for BitCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitCursor")
            .field("size", &self.data.len())
            .field("bit_offset", &self.bit_offset)
            .finish()
    }
}
