//! MSB-first bit streams with fixed-width, gamma and delta codes.
//!
//! Gamma and delta codes write `x + 1`, so every `u64` (including zero and
//! `u64::MAX`) is representable; the arithmetic is done in `u128`.

use crate::error::{Error, Result};

#[derive(Default, Debug, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bits: u64,
}

impl BitWriter {
    pub fn new() -> BitWriter { BitWriter::default() }

    /// Number of bits written so far.
    pub fn bits(&self) -> u64 { self.bits }
    pub fn as_bytes(&self) -> &[u8] { &self.bytes[..] }
    pub fn into_bytes(self) -> Vec<u8> { self.bytes }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.bits = 0;
    }

    /// Writes the low `width` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u64, width: u32) -> usize {
        debug_assert!(width <= 64);
        let mut remaining = width;
        while remaining > 0 {
            let used = (self.bits % 8) as u32;
            if used == 0 { self.bytes.push(0); }
            let free = 8 - used;
            let take = ::std::cmp::min(remaining, free);
            let shift = remaining - take;
            let chunk = ((value >> shift) & ((1u64 << take) - 1)) as u8;
            let last = self.bytes.len() - 1;
            self.bytes[last] |= chunk << (free - take);
            remaining -= take;
            self.bits += take as u64;
        }
        width as usize
    }

    fn write_zeros(&mut self, mut count: u32) -> usize {
        let written = count as usize;
        while count > 0 {
            let take = ::std::cmp::min(count, 64);
            self.write_bits(0, take);
            count -= take;
        }
        written
    }

    fn write_elias(&mut self, v: u128) -> usize {
        // v >= 1; `len` is its bit length, the leading one is written by the caller
        let len = 128 - v.leading_zeros();
        let low = (v & ((1u128 << (len - 1)) - 1)) as u64;
        self.write_bits(low, len - 1)
    }

    pub fn write_gamma(&mut self, x: u64) -> usize {
        let v = x as u128 + 1;
        let len = 128 - v.leading_zeros();
        self.write_zeros(len - 1) + self.write_bits(1, 1) + self.write_elias(v)
    }

    pub fn write_delta(&mut self, x: u64) -> usize {
        let v = x as u128 + 1;
        let len = 128 - v.leading_zeros();
        self.write_gamma((len - 1) as u64) + self.write_elias(v)
    }
}

pub struct BitReader<'a> {
    bytes: &'a [u8],
    position: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> BitReader<'a> { BitReader { bytes, position: 0 } }

    pub fn position(&self) -> u64 { self.position }
    pub fn set_position(&mut self, position: u64) { self.position = position; }

    fn read_bit(&mut self) -> Result<bool> {
        let byte = *self.bytes.get((self.position / 8) as usize)
            .ok_or(Error::TruncatedBitStream { position: self.position })?;
        let bit = (byte >> (7 - (self.position % 8))) & 1;
        self.position += 1;
        Ok(bit == 1)
    }

    pub fn read_bits(&mut self, width: u32) -> Result<u64> {
        debug_assert!(width <= 64);
        if self.position + width as u64 > 8 * self.bytes.len() as u64 {
            return Err(Error::TruncatedBitStream { position: self.position });
        }
        let mut value = 0u64;
        let mut remaining = width;
        while remaining > 0 {
            let used = (self.position % 8) as u32;
            let take = ::std::cmp::min(remaining, 8 - used);
            let byte = self.bytes[(self.position / 8) as usize] as u64;
            let chunk = (byte >> (8 - used - take)) & ((1u64 << take) - 1);
            value = (value << take) | chunk;
            remaining -= take;
            self.position += take as u64;
        }
        Ok(value)
    }

    fn read_elias(&mut self, len: u32) -> Result<u64> {
        let low = self.read_bits(len - 1)? as u128;
        Ok((((1u128 << (len - 1)) | low) - 1) as u64)
    }

    pub fn read_gamma(&mut self) -> Result<u64> {
        let mut zeros = 0u32;
        while !self.read_bit()? {
            zeros += 1;
            if zeros > 64 {
                return Err(Error::TruncatedBitStream { position: self.position });
            }
        }
        self.read_elias(zeros + 1)
    }

    pub fn read_delta(&mut self) -> Result<u64> {
        let len = self.read_gamma()?;
        if len > 64 {
            return Err(Error::TruncatedBitStream { position: self.position });
        }
        self.read_elias(len as u32 + 1)
    }
}

#[cfg(test)]
use rand::{Rng, SeedableRng};
#[cfg(test)]
use rand::rngs::StdRng;

#[test]
#[cfg(test)]
fn gamma_known_codes() {
    // 0 -> "1", 1 -> "010", 2 -> "011", 3 -> "00100"
    let mut w = BitWriter::new();
    assert_eq!(w.write_gamma(0), 1);
    assert_eq!(w.write_gamma(1), 3);
    assert_eq!(w.write_gamma(2), 3);
    assert_eq!(w.write_gamma(3), 5);
    assert_eq!(w.bits(), 12);
    assert_eq!(w.as_bytes(), &[0b1010_0110, 0b0100_0000]);
}

#[test]
#[cfg(test)]
fn extremes_survive() {
    let mut w = BitWriter::new();
    w.write_gamma(u64::max_value());
    w.write_delta(u64::max_value());
    w.write_bits(u64::max_value(), 64);
    w.write_delta(0);
    let bytes = w.into_bytes();
    let mut r = BitReader::new(&bytes);
    assert_eq!(r.read_gamma().unwrap(), u64::max_value());
    assert_eq!(r.read_delta().unwrap(), u64::max_value());
    assert_eq!(r.read_bits(64).unwrap(), u64::max_value());
    assert_eq!(r.read_delta().unwrap(), 0);
}

#[test]
#[cfg(test)]
fn mixed_codes_random() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut w = BitWriter::new();
    let mut expected = Vec::new();
    for _ in 0..2000 {
        let width = rng.gen_range(0..=64u32);
        let value = if width == 64 { rng.gen::<u64>() } else { rng.gen::<u64>() & ((1u64 << width) - 1) };
        let x = rng.gen::<u64>() >> rng.gen_range(0..64);
        let before = w.bits();
        let written = w.write_bits(value, width) + w.write_gamma(x) + w.write_delta(x);
        assert_eq!(w.bits() - before, written as u64);
        expected.push((width, value, x));
    }
    let bytes = w.into_bytes();
    let mut r = BitReader::new(&bytes);
    for (width, value, x) in expected {
        assert_eq!(r.read_bits(width).unwrap(), value);
        assert_eq!(r.read_gamma().unwrap(), x);
        assert_eq!(r.read_delta().unwrap(), x);
    }
}

#[test]
#[cfg(test)]
fn reading_past_the_end() {
    let mut r = BitReader::new(&[0u8]);
    match r.read_gamma() {
        Err(Error::TruncatedBitStream { .. }) => {}
        other => panic!("unexpected {:?}", other),
    }
    let mut r = BitReader::new(&[0xff]);
    assert!(r.read_bits(9).is_err());
}
