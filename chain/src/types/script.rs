//! Script byte strings and recognition of the standard forms.
//!
//! Only what consensus validation needs is modelled here: building
//! scripts, walking their push/opcode structure and classifying output
//! scripts. Executing scripts is the job of an interpreter outside this
//! crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::encode::{Encodable, write_var_bytes};
use super::hash160;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_ZEROCOINMINT: u8 = 0xc1;
pub const OP_ZEROCOINSPEND: u8 = 0xc2;
pub const OP_ZEROCOINPUBLICSPEND: u8 = 0xc3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed script: push at offset {offset} runs past the end")]
pub struct MalformedScript {
    pub offset: usize,
}

/// A single parsed script element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction<'a> {
    Push(&'a [u8]),
    Op(u8),
}

/// Recognised output script templates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptKind {
    Empty,
    PubKey(Vec<u8>),
    PubKeyHash([u8; 20]),
    ZerocoinMint(Vec<u8>),
    NonStandard,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push_opcode(mut self, op: u8) -> Self {
        self.0.push(op);
        self
    }

    /// Appends a minimal data push.
    pub fn push_slice(mut self, data: &[u8]) -> Self {
        let len = data.len();
        if len < OP_PUSHDATA1 as usize {
            self.0.push(len as u8);
        } else if len <= 0xff {
            self.0.push(OP_PUSHDATA1);
            self.0.push(len as u8);
        } else if len <= 0xffff {
            self.0.push(OP_PUSHDATA2);
            self.0.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.0.push(OP_PUSHDATA4);
            self.0.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.0.extend_from_slice(data);
        self
    }

    /// Appends an integer, using the small-integer opcodes where they apply.
    pub fn push_int(self, n: i64) -> Self {
        match n {
            -1 => self.push_opcode(OP_1NEGATE),
            0 => self.push_opcode(OP_0),
            1..=16 => self.push_opcode(OP_1 + (n as u8) - 1),
            _ => self.push_script_num(n),
        }
    }

    /// Appends an integer as a data push of its minimal script-number
    /// encoding, never as a small-integer opcode.
    pub fn push_script_num(self, n: i64) -> Self {
        let bytes = script_num_bytes(n);
        self.push_slice(&bytes)
    }

    pub fn p2pk(pubkey: &[u8]) -> Self {
        Script::new().push_slice(pubkey).push_opcode(OP_CHECKSIG)
    }

    pub fn p2pkh(key_hash: &[u8; 20]) -> Self {
        Script::new()
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(key_hash)
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
    }

    pub fn p2pkh_for_key(pubkey: &[u8]) -> Self {
        Script::p2pkh(&hash160(pubkey))
    }

    /// `OP_ZEROCOINMINT <commitment>`; the commitment is big-endian.
    pub fn zerocoin_mint(commitment: &[u8]) -> Self {
        Script::new()
            .push_opcode(OP_ZEROCOINMINT)
            .push_slice(commitment)
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            data: &self.0,
            pos: 0,
        }
    }

    /// Parses the whole script, failing on any truncated push.
    pub fn parse(&self) -> Result<Vec<Instruction<'_>>, MalformedScript> {
        self.instructions().collect()
    }

    /// Last data push, if the script is well formed and ends in one.
    pub fn last_push(&self) -> Option<&[u8]> {
        match self.parse().ok()?.last()? {
            Instruction::Push(data) => Some(*data),
            Instruction::Op(_) => None,
        }
    }

    pub fn classify(&self) -> ScriptKind {
        if self.0.is_empty() {
            return ScriptKind::Empty;
        }
        let Ok(ins) = self.parse() else {
            return ScriptKind::NonStandard;
        };
        match ins.as_slice() {
            [Instruction::Push(key), Instruction::Op(OP_CHECKSIG)]
                if key.len() == 33 || key.len() == 65 =>
            {
                ScriptKind::PubKey(key.to_vec())
            }
            [
                Instruction::Op(OP_DUP),
                Instruction::Op(OP_HASH160),
                Instruction::Push(hash),
                Instruction::Op(OP_EQUALVERIFY),
                Instruction::Op(OP_CHECKSIG),
            ] if hash.len() == 20 => {
                let mut out = [0u8; 20];
                out.copy_from_slice(hash);
                ScriptKind::PubKeyHash(out)
            }
            [Instruction::Op(OP_ZEROCOINMINT), Instruction::Push(commitment)]
                if !commitment.is_empty() =>
            {
                ScriptKind::ZerocoinMint(commitment.to_vec())
            }
            _ => ScriptKind::NonStandard,
        }
    }

    pub fn is_zerocoin_mint(&self) -> bool {
        self.0.first() == Some(&OP_ZEROCOINMINT)
    }

    /// True for input scripts carrying a private or public zerocoin spend.
    pub fn is_zerocoin_spend(&self) -> bool {
        matches!(
            self.0.first(),
            Some(&OP_ZEROCOINSPEND) | Some(&OP_ZEROCOINPUBLICSPEND)
        )
    }

    pub fn is_zerocoin_public_spend(&self) -> bool {
        self.0.first() == Some(&OP_ZEROCOINPUBLICSPEND)
    }
}

impl Encodable for Script {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        write_var_bytes(w, &self.0);
    }
}

/// Iterator over the elements of a script.
pub struct Instructions<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, MalformedScript>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let data = self.data;
        let start = self.pos;
        let op = data[start];
        let (header, len) = match op {
            0x01..=0x4b => (1, op as usize),
            OP_PUSHDATA1 => match data.get(start + 1) {
                Some(&n) => (2, n as usize),
                None => return self.fail(start),
            },
            OP_PUSHDATA2 => match data.get(start + 1..start + 3) {
                Some(b) => (3, u16::from_le_bytes([b[0], b[1]]) as usize),
                None => return self.fail(start),
            },
            OP_PUSHDATA4 => match data.get(start + 1..start + 5) {
                Some(b) => (5, u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize),
                None => return self.fail(start),
            },
            _ => {
                self.pos += 1;
                return Some(Ok(Instruction::Op(op)));
            }
        };
        let body = start + header;
        match data.get(body..body + len) {
            Some(slice) => {
                self.pos = body + len;
                Some(Ok(Instruction::Push(slice)))
            }
            None => self.fail(start),
        }
    }
}

impl Instructions<'_> {
    fn fail<T>(&mut self, offset: usize) -> Option<Result<T, MalformedScript>> {
        self.pos = self.data.len();
        Some(Err(MalformedScript { offset }))
    }
}

/// Minimal little-endian sign-magnitude encoding used by script numbers.
fn script_num_bytes(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_int_matches_reference_encoding() {
        // 486604799 == 0x1d00ffff
        let s = Script::new().push_int(486_604_799);
        assert_eq!(s.0, vec![0x04, 0xff, 0xff, 0x00, 0x1d]);
        assert_eq!(Script::new().push_int(4).0, vec![0x54]);
        assert_eq!(Script::new().push_script_num(4).0, vec![0x01, 0x04]);
        assert_eq!(Script::new().push_int(-1).0, vec![OP_1NEGATE]);
        assert_eq!(Script::new().push_int(128).0, vec![0x02, 0x80, 0x00]);
        assert_eq!(Script::new().push_int(-128).0, vec![0x02, 0x80, 0x80]);
    }

    #[test]
    fn classify_standard_forms() {
        let key = [2u8; 33];
        assert_eq!(Script::p2pk(&key).classify(), ScriptKind::PubKey(key.to_vec()));
        assert_eq!(
            Script::p2pkh_for_key(&key).classify(),
            ScriptKind::PubKeyHash(hash160(&key))
        );
        assert_eq!(
            Script::zerocoin_mint(&[7u8; 64]).classify(),
            ScriptKind::ZerocoinMint(vec![7u8; 64])
        );
        assert_eq!(Script::new().classify(), ScriptKind::Empty);
        assert_eq!(
            Script::new().push_opcode(OP_DUP).classify(),
            ScriptKind::NonStandard
        );
    }

    #[test]
    fn long_pushes_use_pushdata_prefixes() {
        let s = Script::new().push_slice(&[1u8; 300]);
        assert_eq!(s.0[0], OP_PUSHDATA2);
        assert_eq!(s.last_push().map(<[u8]>::len), Some(300));

        let s = Script::new().push_slice(&[1u8; 80]);
        assert_eq!(&s.0[..2], &[OP_PUSHDATA1, 80]);
    }

    #[test]
    fn truncated_push_is_malformed() {
        let s = Script(vec![0x05, 0x01, 0x02]);
        assert_eq!(s.parse(), Err(MalformedScript { offset: 0 }));
        assert_eq!(s.classify(), ScriptKind::NonStandard);
        assert_eq!(s.last_push(), None);
    }
}
