//! Consensus serialization.
//!
//! Transaction ids, the merkle root, header hashes and stake kernels are
//! all hashes over this little-endian wire encoding, so it must match the
//! existing chain byte for byte. Storage uses bincode instead (see
//! `storage::rocksdb`).

use super::Hash256;

/// Types with a canonical consensus byte encoding.
pub trait Encodable {
    /// Appends the consensus encoding of `self` to `w`.
    fn consensus_encode(&self, w: &mut Vec<u8>);

    /// Returns the consensus encoding as a fresh buffer.
    fn consensus_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.consensus_encode(&mut out);
        out
    }
}

/// Writes a Bitcoin "CompactSize" length prefix.
pub fn write_compact_size(w: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => w.push(n as u8),
        0xfd..=0xffff => {
            w.push(0xfd);
            w.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            w.push(0xfe);
            w.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            w.push(0xff);
            w.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Writes a length-prefixed byte string.
pub fn write_var_bytes(w: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(w, bytes.len() as u64);
    w.extend_from_slice(bytes);
}

impl Encodable for u32 {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(&self.to_le_bytes());
    }
}

impl Encodable for i32 {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(&self.to_le_bytes());
    }
}

impl Encodable for i64 {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(&self.to_le_bytes());
    }
}

impl Encodable for Hash256 {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(&self.0);
    }
}

impl<T: Encodable> Encodable for [T] {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        write_compact_size(w, self.len() as u64);
        for item in self {
            item.consensus_encode(w);
        }
    }
}
