//! Object identifiers.

use std::fmt;

use crate::codec;
use crate::error::Result;

/// A 64-bit object identifier. The high bits encode the object's type
/// storage id (as a variable-length unsigned int per [`codec::encode_uint`]);
/// the low bits are random. See spec §3 "Object ID".
///
/// `ObjId`s are immutable, compared by value, and ordered lexicographically
/// on their encoded bytes (which, since the type prefix is order-preserving
/// and comes first, groups all objects of a type contiguously in the KV
/// namespace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjId(u64);

impl ObjId {
    /// Builds an `ObjId` directly from its raw 64-bit value. Callers outside
    /// this crate should prefer [`crate::Transaction::create`], which
    /// generates a correctly-typed id.
    pub fn from_raw(raw: u64) -> Self {
        ObjId(raw)
    }

    /// Returns the raw 64-bit value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Builds an `ObjId` whose high bits encode `type_id` and whose low bits
    /// are supplied by `random_suffix` (typically from an RNG). `type_id`
    /// is encoded with [`codec::encode_uint`]; the remaining bits of `raw`
    /// are filled with `random_suffix`, truncated/shifted to fit.
    pub fn new(type_id: u64, random_suffix: u64) -> Self {
        let mut encoded = Vec::new();
        // encode_uint never fails for values produced by this crate's own
        // storage-id allocator (bounded well under the u32::MAX+0xFB cap).
        codec::encode_uint(type_id, &mut encoded).expect("type id too large to encode");
        let prefix_bits = encoded.len() * 8;
        let raw = if prefix_bits >= 64 {
            // Degenerate case: the type id alone fills (or exceeds) 64 bits.
            // Not reachable for storage ids in the supported range, but
            // handled rather than panicking.
            u64::from_be_bytes({
                let mut buf = [0u8; 8];
                let take = encoded.len().min(8);
                buf[..take].copy_from_slice(&encoded[..take]);
                buf
            })
        } else {
            let mut buf = [0u8; 8];
            buf[..encoded.len()].copy_from_slice(&encoded);
            let prefix = u64::from_be_bytes(buf);
            let suffix_bits = 64 - prefix_bits;
            let suffix_mask = if suffix_bits == 64 {
                u64::MAX
            } else {
                (1u64 << suffix_bits) - 1
            };
            prefix | (random_suffix & suffix_mask)
        };
        ObjId(raw)
    }

    /// Decodes the type storage id encoded in this `ObjId`'s high bits.
    pub fn type_storage_id(&self) -> Result<u64> {
        let bytes = self.0.to_be_bytes();
        let (type_id, _len) = codec::decode_uint(&bytes)?;
        Ok(type_id)
    }

    /// The big-endian byte encoding used as the KV key suffix for this id.
    /// Fixed-width (8 bytes) so object records sort by raw numeric value,
    /// keeping an object's own records and all same-typed objects in
    /// contiguous key ranges (the high bits, which carry the type id, sort
    /// first).
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Inverse of [`ObjId::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(crate::error::CodecError::Truncated {
                expected: 8,
                got: bytes.len(),
            }
            .into());
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        Ok(ObjId(u64::from_be_bytes(buf)))
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_prefix_roundtrips() {
        let id = ObjId::new(42, 0xDEAD_BEEF_CAFE);
        assert_eq!(id.type_storage_id().unwrap(), 42);
    }

    #[test]
    fn bytes_roundtrip() {
        let id = ObjId::new(7, 12345);
        let bytes = id.to_bytes();
        assert_eq!(ObjId::from_bytes(&bytes).unwrap(), id);
    }

    #[test]
    fn ordering_is_by_raw_value() {
        let a = ObjId::from_raw(1);
        let b = ObjId::from_raw(2);
        assert!(a < b);
        assert!(a.to_bytes() < b.to_bytes());
    }
}
