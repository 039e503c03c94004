//! Packing of per-batch object slots into vertex data.
//!
//! A GPU batch holds up to `max_batched_items` matrix batches. Every vertex
//! carries the slot of the matrix batch it belongs to in the low bits of its
//! last position component, which the vertex shader uses to index the local
//! matrix array and a picking pass can read back. The contract:
//!
//! * `bits = bits_required(max_batched_items)` low mantissa bits are reserved,
//!   `mask = mask_from_bits(bits)`.
//! * `pack` replaces those bits with the slot; all other bits are kept.
//! * `unpack` returns `bits & mask`.
//! * A capacity of 1 disables the encoding (`mask == 0`): nothing is written
//!   and every vertex decodes to slot 0.

/// Smallest `i` with `1 << i >= max`, plus one.
pub fn bits_required(max: u32) -> u32 {
    (0..32).find(|i| (1u64 << i) >= max as u64).unwrap_or(31) + 1
}

pub fn mask_from_bits(bits: u32) -> u32 {
    match bits {
        0 => 0,
        b if b >= 32 => !0,
        b => !0u32 >> (32 - b),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectIdEncoding {
    bits: u32,
    mask: u32,
}

impl ObjectIdEncoding {
    pub fn for_capacity(max_batched_items: u32) -> Self {
        if max_batched_items <= 1 {
            return Self { bits: 0, mask: 0 };
        }

        let bits = bits_required(max_batched_items);
        Self {
            bits,
            mask: mask_from_bits(bits),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn is_enabled(&self) -> bool {
        self.mask != 0
    }

    pub fn pack(&self, value: f32, slot: u32) -> f32 {
        debug_assert!(
            slot & !self.mask == 0 || !self.is_enabled(),
            "slot {slot} does not fit in {} bits",
            self.bits
        );
        f32::from_bits((value.to_bits() & !self.mask) | (slot & self.mask))
    }

    pub fn unpack(&self, value: f32) -> u32 {
        value.to_bits() & self.mask
    }
}
