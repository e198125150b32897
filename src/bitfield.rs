//! A packed, most-significant-bit-first bitset tracking which pieces a peer
//! advertises (§4.2). Bit 0 of byte 0 is piece 0.

use bitvec::prelude::{BitVec, Msb0};

/// Piece availability, backed by a packed bit vector.
///
/// Out-of-range [`has`](Bitfield::has) returns `false`; out-of-range
/// [`set`](Bitfield::set) is a silent no-op. Equality and length are
/// byte-wise, matching the wire representation.
#[derive(Clone, Debug, Default)]
pub struct Bitfield(BitVec<u8, Msb0>);

impl Bitfield {
    /// Creates an all-zero bitfield sized to hold `piece_count` pieces.
    pub fn new(piece_count: usize) -> Self {
        Self(BitVec::repeat(false, piece_count))
    }

    /// Wraps a raw, already-packed byte sequence received off the wire.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(BitVec::from_vec(bytes))
    }

    /// Returns whether the peer has piece `index`. Out-of-range indices
    /// return `false`.
    pub fn has(&self, index: usize) -> bool {
        self.0.get(index).map(|bit| *bit).unwrap_or(false)
    }

    /// Marks piece `index` as available. Out-of-range indices are a
    /// silent no-op.
    pub fn set(&mut self, index: usize) {
        if let Some(mut bit) = self.0.get_mut(index) {
            *bit = true;
        }
    }

    /// Returns true if every bit up to `piece_count` is set, i.e. the peer
    /// is a seed for a torrent of that many pieces.
    pub fn has_all(&self, piece_count: usize) -> bool {
        (0..piece_count).all(|i| self.has(i))
    }

    /// The packed byte length of this bitfield.
    pub fn byte_len(&self) -> usize {
        self.0.as_raw_slice().len()
    }

    /// The raw packed bytes, suitable for sending on the wire.
    pub fn as_raw_slice(&self) -> &[u8] {
        self.0.as_raw_slice()
    }
}

impl PartialEq for Bitfield {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_raw_slice() == other.0.as_raw_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_zero_is_msb_of_byte_zero() {
        let mut bf = Bitfield::new(9);
        bf.set(0);
        assert_eq!(bf.as_raw_slice()[0], 0b1000_0000);
        assert!(bf.has(0));
        assert!(!bf.has(1));
    }

    #[test]
    fn set_and_has_across_byte_boundary() {
        let mut bf = Bitfield::new(9);
        bf.set(7);
        bf.set(8);
        assert_eq!(bf.as_raw_slice()[0], 0b0000_0001);
        assert_eq!(bf.as_raw_slice()[1], 0b1000_0000);
        assert!(bf.has(7));
        assert!(bf.has(8));
    }

    #[test]
    fn out_of_range_has_is_false() {
        let bf = Bitfield::new(4);
        assert!(!bf.has(100));
    }

    #[test]
    fn out_of_range_set_is_noop() {
        let mut bf = Bitfield::new(4);
        bf.set(100);
        assert_eq!(bf.byte_len(), 1);
    }

    #[test]
    fn has_all_detects_seed() {
        let mut bf = Bitfield::new(3);
        bf.set(0);
        bf.set(1);
        assert!(!bf.has_all(3));
        bf.set(2);
        assert!(bf.has_all(3));
    }

    #[test]
    fn from_bytes_round_trips() {
        let raw = vec![0b1010_0000u8];
        let bf = Bitfield::from_bytes(raw.clone());
        assert_eq!(bf.as_raw_slice(), raw.as_slice());
        assert!(bf.has(0));
        assert!(!bf.has(1));
        assert!(bf.has(2));
    }
}
