//! Validity bitmap.

use alloc::vec;
use alloc::vec::Vec;

/// A growable bitset used as the validity mask of a column.
///
/// Bit `i` is set when row `i` holds a valid value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// Creates an empty bitmap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bitmap of `len` bits, all set to `value`.
    pub fn with_len(len: usize, value: bool) -> Self {
        let fill = if value { u64::MAX } else { 0 };
        let mut bitmap = Self {
            words: vec![fill; len.div_ceil(64)],
            len,
        };
        bitmap.clear_tail();
        bitmap
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the bit at `idx`; out-of-range reads are false.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        self.words[idx / 64] & (1u64 << (idx % 64)) != 0
    }

    /// Sets the bit at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        assert!(idx < self.len, "bitmap index {} out of range {}", idx, self.len);
        let mask = 1u64 << (idx % 64);
        if value {
            self.words[idx / 64] |= mask;
        } else {
            self.words[idx / 64] &= !mask;
        }
    }

    pub fn push(&mut self, value: bool) {
        if self.len % 64 == 0 {
            self.words.push(0);
        }
        self.len += 1;
        self.set(self.len - 1, value);
    }

    /// Grows or shrinks to `len` bits; new bits take `value`.
    pub fn resize(&mut self, len: usize, value: bool) {
        if len <= self.len {
            self.len = len;
            self.words.truncate(len.div_ceil(64));
            self.clear_tail();
            return;
        }
        let old = self.len;
        self.words.resize(len.div_ceil(64), 0);
        self.len = len;
        if value {
            for idx in old..len {
                self.set(idx, true);
            }
        }
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of unset bits.
    pub fn count_zeros(&self) -> usize {
        self.len - self.count_ones()
    }

    /// Iterates over the bits in order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |idx| self.get(idx))
    }

    /// Packs the bits LSB-first into bytes, as columnar interchange formats
    /// expect.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len.div_ceil(8));
        for word in &self.words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes.truncate(self.len.div_ceil(8));
        bytes
    }

    fn clear_tail(&mut self) {
        let rem = self.len % 64;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

impl FromIterator<bool> for Bitmap {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut bitmap = Bitmap::new();
        for bit in iter {
            bitmap.push(bit);
        }
        bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let mut bitmap = Bitmap::new();
        for i in 0..130 {
            bitmap.push(i % 3 == 0);
        }
        assert_eq!(bitmap.len(), 130);
        assert!(bitmap.get(0));
        assert!(!bitmap.get(1));
        assert!(bitmap.get(129));
        assert!(!bitmap.get(500));
        assert_eq!(bitmap.count_ones(), 44);
    }

    #[test]
    fn test_resize_preserves_bits() {
        let mut bitmap = Bitmap::with_len(10, true);
        bitmap.set(3, false);
        bitmap.resize(100, false);
        assert_eq!(bitmap.count_ones(), 9);
        assert!(!bitmap.get(3));
        assert!(!bitmap.get(50));

        bitmap.resize(5, true);
        assert_eq!(bitmap.count_ones(), 4);
        bitmap.resize(8, true);
        assert_eq!(bitmap.count_ones(), 7);
    }

    #[test]
    fn test_to_bytes() {
        let bitmap: Bitmap = [true, false, true, true, false, false, false, false, true]
            .into_iter()
            .collect();
        assert_eq!(bitmap.to_bytes(), vec![0b0000_1101, 0b0000_0001]);
        assert_eq!(bitmap.count_zeros(), 5);
    }
}
