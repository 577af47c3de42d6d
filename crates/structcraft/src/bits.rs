//! Low-level bit primitives: bitmaps, a bit consumer and a bit writer.
//!
//! Bits are consumed in MSB-first order: bit 0 is the high bit of the first byte.

use std::fmt;

/// Masks `width` low bits.
pub fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Sign-extends the low `bits` of `value` to a full `i128`.
pub fn sign_extend(value: u128, bits: u32) -> i128 {
    if bits == 0 {
        return 0;
    }
    if bits >= 128 {
        return value as i128;
    }

    let shift = 128 - bits;
    ((value << shift) as i128) >> shift
}

/// A (value, width) pair; the atomic unit of the bit engine.
///
/// The value is always reduced modulo `2^width`. Signedness is applied only
/// when a value is interpreted, never while accumulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bitmap {
    value: u128,
    width: u32,
}

impl Bitmap {
    /// Widest bitmap that can be represented.
    pub const MAX_WIDTH: u32 = 128;

    /// Creates a bitmap, truncating `value` to `width` bits.
    pub fn new(value: u128, width: u32) -> Self {
        let width = width.min(Self::MAX_WIDTH);
        Bitmap {
            value: value & mask(width),
            width,
        }
    }

    /// Raw unsigned value.
    pub fn value(&self) -> u128 {
        self.value
    }

    /// Number of bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Two's-complement interpretation of the value.
    pub fn signed(&self) -> i128 {
        sign_extend(self.value, self.width)
    }

    /// Appends `other` below the current bits. `None` when the result would
    /// exceed [Bitmap::MAX_WIDTH].
    pub fn push(self, other: Bitmap) -> Option<Bitmap> {
        let width = self.width.checked_add(other.width)?;
        if width > Self::MAX_WIDTH {
            return None;
        }
        let shifted = if other.width >= 128 { 0 } else { self.value << other.width };
        Some(Bitmap::new(shifted | other.value, width))
    }

    fn push_bit(&mut self, bit: u8) {
        self.value = (self.value << 1) | u128::from(bit & 1);
        self.width += 1;
    }
}

impl fmt::Display for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = ((self.width + 3) / 4).max(1) as usize;
        write!(f, "({:#0w$x}, {})", self.value, self.width, w = digits + 2)
    }
}

/// Bits that could not be delivered because the underlying stream ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    /// The bits that were read before the end of data.
    pub partial: Bitmap,
    /// How many requested bits are missing.
    pub missing: u32,
}

/// An ordered stream of individual bits drawn from a byte iterator.
pub struct BitConsumer<'a> {
    bytes: Box<dyn Iterator<Item = u8> + 'a>,
    current: u8,
    remaining: u8,
    limit: Option<u64>,
    consumed: u64,
}

impl<'a> BitConsumer<'a> {
    /// Consumes bits from `bytes`, pulling one byte at a time.
    pub fn new(bytes: impl Iterator<Item = u8> + 'a) -> Self {
        BitConsumer {
            bytes: Box::new(bytes),
            current: 0,
            remaining: 0,
            limit: None,
            consumed: 0,
        }
    }

    /// Consumes bits from an in-memory slice.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::new(data.iter().copied())
    }

    /// Stops after `bits` bits even if more bytes are available.
    pub fn with_limit(mut self, bits: u64) -> Self {
        self.limit = Some(bits);
        self
    }

    /// Total number of bits handed out so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Reads one bit, `None` at end of data.
    pub fn read_bit(&mut self) -> Option<u8> {
        if self.limit.is_some_and(|limit| self.consumed >= limit) {
            return None;
        }

        if self.remaining == 0 {
            self.current = self.bytes.next()?;
            self.remaining = 8;
        }

        self.remaining -= 1;
        self.consumed += 1;
        Some((self.current >> self.remaining) & 1)
    }

    /// Reads `width` bits as an unsigned bitmap, MSB first.
    pub fn consume(&mut self, width: u32) -> Result<Bitmap, Exhausted> {
        let width = width.min(Bitmap::MAX_WIDTH);
        let mut bitmap = Bitmap::default();

        for read in 0..width {
            match self.read_bit() {
                Some(bit) => bitmap.push_bit(bit),
                None => {
                    return Err(Exhausted {
                        partial: bitmap,
                        missing: width - read,
                    });
                }
            }
        }

        Ok(bitmap)
    }
}

impl BitConsumer<'static> {
    /// An endless stream of zero bits, used to allocate and measure types.
    pub fn zeros() -> Self {
        Self::new(std::iter::repeat(0u8))
    }
}

impl fmt::Debug for BitConsumer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitConsumer")
            .field("consumed", &self.consumed)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

/// Accumulates bitmaps MSB-first and emits bytes zero-padded at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bits: u64,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the bits of `bitmap`, most significant first.
    pub fn push(&mut self, bitmap: Bitmap) {
        for i in (0..bitmap.width()).rev() {
            self.push_bit(((bitmap.value() >> i) & 1) as u8);
        }
    }

    /// Appends a single bit.
    pub fn push_bit(&mut self, bit: u8) {
        let bit_index = (self.bits % 8) as u32;
        if bit_index == 0 {
            self.bytes.push(0);
        }
        if let Some(last) = self.bytes.last_mut() {
            *last |= (bit & 1) << (7 - bit_index);
        }
        self.bits += 1;
    }

    /// Number of bits written.
    pub fn bit_len(&self) -> u64 {
        self.bits
    }

    /// Written bytes; the final byte is zero-padded on the right.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
