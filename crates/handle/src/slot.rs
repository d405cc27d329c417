//! Opaque handles over slot-table indices.
//!
//! The upstream proxy hands clients a scrambled raw pointer. Handing a
//! raw address to an untrusted peer process is the one part of that
//! design this port does not keep: a scrambled pointer is still a real
//! address if the scrambling is ever broken or guessed, and a forged
//! handle that unscrambles to a live heap address is a much worse bug
//! than one that unscrambles to an out-of-range table index. Instead,
//! every handle here names a slot in a bounds-checked table (pooled
//! instances, cached inodes, open file/dir descriptors); [`decode`]
//! rejects anything a bounds check alone would catch just as eagerly as
//! it rejects a checksum failure, so a forged handle never reaches the
//! table lookup with an attacker-chosen index.

use wire::CephfsError;

use crate::checksum::byte_parity;
use crate::scrambler::Scrambler;

/// Slot indices are shifted left by this many bits before scrambling, so
/// the low bits stay zero for the same alignment check the original
/// pointer scrambler relied on, and checked against it again on decode.
const ALIGN_SHIFT: u32 = 3;
/// Mask recovering the 56-bit payload after the top checksum byte is
/// subtracted out.
const VALUE_MASK: u64 = 0x00ff_ffff_ffff_ffff;
/// Bits that must be zero before a value is checksummed: the top byte
/// (reserved for the checksum) and the low three alignment bits.
const GUARD_MASK: u64 = 0xff00_0000_0000_0007;

/// Encodes `index` into an opaque handle. Returns `0` for no index, kept
/// as the wire sentinel for "no handle" (a real slot never scrambles to
/// `0` because its checksum byte is nonzero whenever the unscrambled
/// value is).
#[must_use]
pub fn encode(scrambler: &Scrambler, index: Option<u32>) -> u64 {
    let Some(index) = index else { return 0 };
    let raw = (u64::from(index)) << ALIGN_SHIFT;
    debug_assert_eq!(raw & GUARD_MASK, 0, "slot index does not fit in the scrambled payload");
    let checksummed = raw - (byte_parity(raw) << 56);
    scrambler.scramble(checksummed)
}

/// Decodes a handle back into a slot index. `0` decodes to `None`, an
/// index is returned only once checksum, alignment, and top-byte guards
/// all pass, so a forged or corrupted handle never reaches a table
/// lookup with an attacker-chosen index.
pub fn decode(scrambler: &Scrambler, handle: u64) -> Result<Option<u32>, CephfsError> {
    if handle == 0 {
        return Ok(None);
    }
    let value = scrambler.unscramble(handle);
    if byte_parity(value) != 0 || value & ((1 << ALIGN_SHIFT) - 1) != 0 {
        return Err(CephfsError::InvalidHandle("checksum or alignment mismatch"));
    }
    let payload = value & VALUE_MASK;
    let index = payload >> ALIGN_SHIFT;
    u32::try_from(index).map(Some).map_err(|_| CephfsError::InvalidHandle("slot index out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scrambler() -> Scrambler {
        Scrambler::new(&mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn none_round_trips_through_zero() {
        let s = scrambler();
        assert_eq!(encode(&s, None), 0);
        assert_eq!(decode(&s, 0).unwrap(), None);
    }

    #[test]
    fn a_slot_index_round_trips() {
        let s = scrambler();
        let handle = encode(&s, Some(42));
        assert_ne!(handle, 0);
        assert_eq!(decode(&s, handle).unwrap(), Some(42));
    }

    #[test]
    fn a_handle_from_a_different_scrambler_is_rejected() {
        let mine = scrambler();
        let theirs = Scrambler::new(&mut StdRng::seed_from_u64(99));
        let handle = encode(&mine, Some(3));
        assert!(decode(&theirs, handle).is_err());
    }

    #[test]
    fn a_flipped_bit_is_caught() {
        let s = scrambler();
        let handle = encode(&s, Some(100));
        assert!(decode(&s, handle ^ 1).is_err());
    }

    proptest! {
        #[test]
        fn any_in_range_index_round_trips(seed: u64, index: u32) {
            let s = Scrambler::new(&mut StdRng::seed_from_u64(seed));
            let handle = encode(&s, Some(index));
            prop_assert_eq!(decode(&s, handle).unwrap(), Some(index));
        }
    }
}
