//! MSB-first bit reader for codec configuration records
//!
//! Reads return `None` past the end of the data; callers map that onto the
//! error for the structure they are parsing.

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    pub fn remaining_bits(&self) -> usize {
        (self.data.len() - self.byte_pos.min(self.data.len())) * 8 - self.bit_pos as usize
    }

    pub fn read_bit(&mut self) -> Option<bool> {
        let byte = *self.data.get(self.byte_pos)?;
        let bit = (byte >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        Some(bit != 0)
    }

    /// Read up to 32 bits
    pub fn read_bits(&mut self, n: u8) -> Option<u32> {
        if n > 32 || self.remaining_bits() < n as usize {
            return None;
        }
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Some(value)
    }

    pub fn read_flag(&mut self) -> Option<bool> {
        self.read_bit()
    }

    pub fn skip_bits(&mut self, n: usize) -> Option<()> {
        if self.remaining_bits() < n {
            return None;
        }
        let total = self.bit_pos as usize + n;
        self.byte_pos += total / 8;
        self.bit_pos = (total % 8) as u8;
        Some(())
    }

    /// Unsigned Exp-Golomb, ue(v)
    pub fn read_ue(&mut self) -> Option<u32> {
        let mut leading_zeros = 0u8;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return None;
            }
        }
        if leading_zeros == 0 {
            return Some(0);
        }
        let suffix = self.read_bits(leading_zeros)?;
        Some((1u32 << leading_zeros) - 1 + suffix)
    }

    /// Signed Exp-Golomb, se(v)
    pub fn read_se(&mut self) -> Option<i32> {
        let ue = self.read_ue()?;
        let magnitude = ((ue + 1) / 2) as i32;
        Some(if ue % 2 == 0 { -magnitude } else { magnitude })
    }
}

/// Drop emulation prevention bytes (00 00 03 -> 00 00)
pub fn nal_to_rbsp(nal: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nal.len());
    let mut zeros = 0;
    for &byte in nal {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}
