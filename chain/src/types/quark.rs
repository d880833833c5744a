//! Quark header hash.
//!
//! Headers before version 4 were identified by Quark: nine rounds over
//! six SHA-3 candidates, three of them picked by bit 3 of the previous
//! digest. Groestl, JH, Keccak and Skein come from RustCrypto. BLAKE-512
//! and BMW-512 are implemented here.

use groestl::Groestl512;
use jh::Jh512;
use sha3::{Digest, Keccak512};
use skein::{Skein512, consts::U64};

use super::{Hash256, LegacyHeaderHasher};

type Digest512 = [u8; 64];

/// [`LegacyHeaderHasher`] for headers older than version 4.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuarkHasher;

impl LegacyHeaderHasher for QuarkHasher {
    fn hash_header(&self, header_bytes: &[u8]) -> Hash256 {
        quark_hash(header_bytes)
    }
}

/// Quark digest of `data`, truncated to 256 bits.
pub fn quark_hash(data: &[u8]) -> Hash256 {
    let branch = |h: &Digest512| h[0] & 8 != 0;

    let mut h = blake512(data);
    h = bmw512(&h);
    h = if branch(&h) { rust_crypto::<Groestl512>(&h) } else { rust_crypto::<Skein512<U64>>(&h) };
    h = rust_crypto::<Groestl512>(&h);
    h = rust_crypto::<Jh512>(&h);
    h = if branch(&h) { blake512(&h) } else { bmw512(&h) };
    h = rust_crypto::<Keccak512>(&h);
    h = rust_crypto::<Skein512<U64>>(&h);
    h = if branch(&h) { rust_crypto::<Keccak512>(&h) } else { rust_crypto::<Jh512>(&h) };

    let mut out = [0u8; 32];
    out.copy_from_slice(&h[..32]);
    Hash256(out)
}

fn rust_crypto<D: Digest>(data: &[u8]) -> Digest512 {
    let mut out = [0u8; 64];
    out.copy_from_slice(&D::digest(data));
    out
}

// ---------------------------
// BLAKE-512
// ---------------------------

const BLAKE_IV: [u64; 8] = [
    0x6A09_E667_F3BC_C908,
    0xBB67_AE85_84CA_A73B,
    0x3C6E_F372_FE94_F82B,
    0xA54F_F53A_5F1D_36F1,
    0x510E_527F_ADE6_82D1,
    0x9B05_688C_2B3E_6C1F,
    0x1F83_D9AB_FB41_BD6B,
    0x5BE0_CD19_137E_2179,
];

const BLAKE_C: [u64; 16] = [
    0x243F_6A88_85A3_08D3,
    0x1319_8A2E_0370_7344,
    0xA409_3822_299F_31D0,
    0x082E_FA98_EC4E_6C89,
    0x4528_21E6_38D0_1377,
    0xBE54_66CF_34E9_0C6C,
    0xC0AC_29B7_C97C_50DD,
    0x3F84_D5B5_B547_0917,
    0x9216_D5D9_8979_FB1B,
    0xD131_0BA6_98DF_B5AC,
    0x2FFD_72DB_D01A_DFB7,
    0xB8E1_AFED_6A26_7E96,
    0xBA7C_9045_F12C_7F99,
    0x24A1_9947_B391_6CF7,
    0x0801_F2E2_858E_FC16,
    0x6369_20D8_7157_4E69,
];

const BLAKE_SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

/// Column then diagonal steps of one round: (a, b, c, d).
const BLAKE_STEPS: [(usize, usize, usize, usize); 8] = [
    (0, 4, 8, 12),
    (1, 5, 9, 13),
    (2, 6, 10, 14),
    (3, 7, 11, 15),
    (0, 5, 10, 15),
    (1, 6, 11, 12),
    (2, 7, 8, 13),
    (3, 4, 9, 14),
];

fn blake_compress(h: &mut [u64; 8], block: &[u8], counter: u128) {
    let mut m = [0u64; 16];
    for (word, chunk) in m.iter_mut().zip(block.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *word = u64::from_be_bytes(buf);
    }

    let t0 = counter as u64;
    let t1 = (counter >> 64) as u64;
    let mut v = [0u64; 16];
    v[..8].copy_from_slice(h);
    v[8..].copy_from_slice(&BLAKE_C[..8]);
    v[12] ^= t0;
    v[13] ^= t0;
    v[14] ^= t1;
    v[15] ^= t1;

    for round in 0..16 {
        let s = &BLAKE_SIGMA[round % 10];
        for (i, &(a, b, c, d)) in BLAKE_STEPS.iter().enumerate() {
            let (x, y) = (s[2 * i], s[2 * i + 1]);
            v[a] = v[a].wrapping_add(v[b]).wrapping_add(m[x] ^ BLAKE_C[y]);
            v[d] = (v[d] ^ v[a]).rotate_right(32);
            v[c] = v[c].wrapping_add(v[d]);
            v[b] = (v[b] ^ v[c]).rotate_right(25);
            v[a] = v[a].wrapping_add(v[b]).wrapping_add(m[y] ^ BLAKE_C[x]);
            v[d] = (v[d] ^ v[a]).rotate_right(16);
            v[c] = v[c].wrapping_add(v[d]);
            v[b] = (v[b] ^ v[c]).rotate_right(11);
        }
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

fn blake512(data: &[u8]) -> Digest512 {
    let bits = (data.len() as u128) * 8;
    let mut h = BLAKE_IV;

    let mut blocks = data.chunks_exact(128);
    let mut counted = 0u128;
    for block in &mut blocks {
        counted += 1024;
        blake_compress(&mut h, block, counted);
    }

    let rest = blocks.remainder();
    let mut tail = [0u8; 256];
    tail[..rest.len()].copy_from_slice(rest);
    tail[rest.len()] = 0x80;
    let len = if rest.len() < 112 { 128 } else { 256 };
    tail[len - 17] |= 0x01;
    tail[len - 16..len].copy_from_slice(&bits.to_be_bytes());

    // A block holding only padding is compressed with a zero counter.
    if len == 128 {
        let counter = if rest.is_empty() { 0 } else { bits };
        blake_compress(&mut h, &tail[..128], counter);
    } else {
        blake_compress(&mut h, &tail[..128], bits);
        blake_compress(&mut h, &tail[128..], 0);
    }

    let mut out = [0u8; 64];
    for (chunk, word) in out.chunks_exact_mut(8).zip(h) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    out
}

// ---------------------------
// BMW-512
// ---------------------------

/// Signed terms of the sixteen `W` words: (index, subtract).
const BMW_W: [[(usize, bool); 5]; 16] = [
    [(5, false), (7, true), (10, false), (13, false), (14, false)],
    [(6, false), (8, true), (11, false), (14, false), (15, true)],
    [(0, false), (7, false), (9, false), (12, true), (15, false)],
    [(0, false), (1, true), (8, false), (10, true), (13, false)],
    [(1, false), (2, false), (9, false), (11, true), (14, true)],
    [(3, false), (2, true), (10, false), (12, true), (15, false)],
    [(4, false), (0, true), (3, true), (11, true), (13, false)],
    [(1, false), (4, true), (5, true), (12, true), (14, true)],
    [(2, false), (5, true), (6, true), (13, false), (15, true)],
    [(0, false), (3, true), (6, false), (7, true), (14, false)],
    [(8, false), (1, true), (4, true), (7, true), (15, false)],
    [(8, false), (0, true), (2, true), (5, true), (9, false)],
    [(1, false), (3, false), (6, true), (9, true), (10, false)],
    [(2, false), (4, false), (7, false), (10, false), (11, false)],
    [(3, false), (5, true), (8, false), (11, true), (12, true)],
    [(12, false), (4, true), (6, true), (9, true), (13, false)],
];

const BMW_ROT: [u32; 7] = [5, 11, 27, 32, 37, 43, 53];

fn bmw_s(i: usize, x: u64) -> u64 {
    match i {
        0 => (x >> 1) ^ (x << 3) ^ x.rotate_left(4) ^ x.rotate_left(37),
        1 => (x >> 1) ^ (x << 2) ^ x.rotate_left(13) ^ x.rotate_left(43),
        2 => (x >> 2) ^ (x << 1) ^ x.rotate_left(19) ^ x.rotate_left(53),
        3 => (x >> 2) ^ (x << 2) ^ x.rotate_left(28) ^ x.rotate_left(59),
        4 => (x >> 1) ^ x,
        _ => (x >> 2) ^ x,
    }
}

fn bmw_iv() -> [u64; 16] {
    let mut iv = [0u64; 16];
    for (i, word) in iv.iter_mut().enumerate() {
        let base = 0x80 + 8 * i as u8;
        *word = u64::from_be_bytes(std::array::from_fn(|k| base + k as u8));
    }
    iv
}

fn bmw_compress(h: &[u64; 16], m: &[u64; 16]) -> [u64; 16] {
    let x: [u64; 16] = std::array::from_fn(|i| m[i] ^ h[i]);

    let mut q = [0u64; 32];
    for (j, terms) in BMW_W.iter().enumerate() {
        let w = terms.iter().fold(0u64, |acc, &(i, sub)| {
            if sub { acc.wrapping_sub(x[i]) } else { acc.wrapping_add(x[i]) }
        });
        q[j] = bmw_s(j % 5, w).wrapping_add(h[(j + 1) % 16]);
    }

    let add_element = |j: usize| -> u64 {
        let r = |i: usize| m[i].rotate_left(i as u32 + 1);
        r((j - 16) % 16)
            .wrapping_add(r((j - 13) % 16))
            .wrapping_sub(r((j - 6) % 16))
            .wrapping_add((j as u64).wrapping_mul(0x0555_5555_5555_5555))
            ^ h[(j - 16 + 7) % 16]
    };

    for j in 16..18 {
        let mut acc = add_element(j);
        for k in 0..16 {
            acc = acc.wrapping_add(bmw_s([1, 2, 3, 0][k % 4], q[j - 16 + k]));
        }
        q[j] = acc;
    }
    for j in 18..32 {
        let mut acc = add_element(j);
        for k in 0..14 {
            let v = q[j - 16 + k];
            let term = if k % 2 == 0 { v } else { v.rotate_left(BMW_ROT[k / 2]) };
            acc = acc.wrapping_add(term);
        }
        acc = acc
            .wrapping_add(bmw_s(4, q[j - 2]))
            .wrapping_add(bmw_s(5, q[j - 1]));
        q[j] = acc;
    }

    let xl = q[16..24].iter().fold(0, |a, v| a ^ v);
    let xh = q[24..32].iter().fold(xl, |a, v| a ^ v);

    let mut out = [0u64; 16];
    out[0] = ((xh << 5) ^ (q[16] >> 5) ^ m[0]).wrapping_add(xl ^ q[24] ^ q[0]);
    out[1] = ((xh >> 7) ^ (q[17] << 8) ^ m[1]).wrapping_add(xl ^ q[25] ^ q[1]);
    out[2] = ((xh >> 5) ^ (q[18] << 5) ^ m[2]).wrapping_add(xl ^ q[26] ^ q[2]);
    out[3] = ((xh >> 1) ^ (q[19] << 5) ^ m[3]).wrapping_add(xl ^ q[27] ^ q[3]);
    out[4] = ((xh >> 3) ^ q[20] ^ m[4]).wrapping_add(xl ^ q[28] ^ q[4]);
    out[5] = ((xh << 6) ^ (q[21] >> 6) ^ m[5]).wrapping_add(xl ^ q[29] ^ q[5]);
    out[6] = ((xh >> 4) ^ (q[22] << 6) ^ m[6]).wrapping_add(xl ^ q[30] ^ q[6]);
    out[7] = ((xh >> 11) ^ (q[23] << 2) ^ m[7]).wrapping_add(xl ^ q[31] ^ q[7]);

    let lows = [
        (xl << 8) ^ q[23] ^ q[8],
        (xl >> 6) ^ q[16] ^ q[9],
        (xl << 6) ^ q[17] ^ q[10],
        (xl << 4) ^ q[18] ^ q[11],
        (xl >> 3) ^ q[19] ^ q[12],
        (xl >> 4) ^ q[20] ^ q[13],
        (xl >> 7) ^ q[21] ^ q[14],
        (xl >> 2) ^ q[22] ^ q[15],
    ];
    for i in 0..8 {
        out[8 + i] = out[(i + 4) % 8]
            .rotate_left(9 + i as u32)
            .wrapping_add(xh ^ q[24 + i] ^ m[8 + i])
            .wrapping_add(lows[i]);
    }
    out
}

fn bmw512(data: &[u8]) -> Digest512 {
    let bits = (data.len() as u64).wrapping_mul(8);
    let mut padded = data.to_vec();
    padded.push(0x80);
    while padded.len() % 128 != 120 {
        padded.push(0);
    }
    padded.extend_from_slice(&bits.to_le_bytes());

    let mut h = bmw_iv();
    for block in padded.chunks_exact(128) {
        let m: [u64; 16] = std::array::from_fn(|j| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&block[8 * j..8 * j + 8]);
            u64::from_le_bytes(buf)
        });
        h = bmw_compress(&h, &m);
    }

    let finalization: [u64; 16] = std::array::from_fn(|i| 0xaaaa_aaaa_aaaa_aaa0 + i as u64);
    let h = bmw_compress(&finalization, &h);

    let mut out = [0u8; 64];
    for (chunk, word) in out.chunks_exact_mut(8).zip(&h[8..]) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake512_empty_and_single_byte() {
        assert_eq!(
            hex::encode(blake512(b"")),
            "a8cfbbd73726062df0c6864dda65defe58ef0cc52a5625090fa17601e1eecd1b\
             628e94f396ae402a00acc9eab77b4d4c2e852aaaa25a636d80af3fc7913ef5b8"
        );
        assert_eq!(
            hex::encode(blake512(&[0])),
            "97961587f6d970faba6d2478045de6d1fabd09b61ae50932054d52bc29d31be4\
             ff9102b9f69e2bbdb83be13d4b9c06091e5fa0b48bd081b634058be0ec49beb3"
        );
    }

    #[test]
    fn bmw512_empty() {
        assert_eq!(
            hex::encode(bmw512(b"")),
            "6a725655c42bc8a2a20549dd5a233a6a2beb01616975851fd122504e604b46af\
             7d96697d0b6333db1d1709d6df328d2a6c786551b0cce2255e8c7332b4819c0e"
        );
    }

    #[test]
    fn long_inputs_span_several_blocks() {
        let data = vec![0x5a; 300];
        assert_ne!(blake512(&data), blake512(&data[..299]));
        assert_ne!(bmw512(&data), bmw512(&data[..299]));
        assert_ne!(quark_hash(&data), quark_hash(&data[..299]));
    }
}
