//! Branch node update batches.
//!
//! A branch record captures one update batch for a single trie branch:
//! which of the sixteen children were touched, which exist afterwards, and
//! a reference record for each surviving child.
//!
//! # Wire format
//!
//! ```text
//! [touch_map: u16 BE][after_map: u16 BE]
//! then, for each set bit of after_map in ascending child index order:
//!   [field flags: u8][varint len + bytes per flagged field]
//! ```

use crate::error::DecodeError;
use crate::varint::{put_uvarint, read_uvarint};
use std::fmt;

/// Reference record for one surviving child of a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildRef {
    /// Plain key of the account the child resolves to, if it collapses to
    /// an account leaf.
    pub account_key: Option<Vec<u8>>,
    /// Plain key of the storage slot the child resolves to, if it collapses
    /// to a storage leaf.
    pub storage_key: Option<Vec<u8>>,
    /// Hash of the child subtree, when it does not collapse.
    pub hash: Option<Vec<u8>>,
}

impl ChildRef {
    /// Field flag: account plain key present.
    const ACCOUNT_KEY: u8 = 1;
    /// Field flag: storage plain key present.
    const STORAGE_KEY: u8 = 2;
    /// Field flag: subtree hash present.
    const HASH: u8 = 4;

    /// A child referenced only by its subtree hash.
    pub fn hashed(hash: impl Into<Vec<u8>>) -> Self {
        Self {
            hash: Some(hash.into()),
            ..Self::default()
        }
    }

    fn field_flags(&self) -> u8 {
        let mut flags = 0;
        if self.account_key.is_some() {
            flags |= Self::ACCOUNT_KEY;
        }
        if self.storage_key.is_some() {
            flags |= Self::STORAGE_KEY;
        }
        if self.hash.is_some() {
            flags |= Self::HASH;
        }
        flags
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.field_flags());
        for field in [&self.account_key, &self.storage_key, &self.hash]
            .into_iter()
            .flatten()
        {
            put_uvarint(buf, field.len() as u64);
            buf.extend_from_slice(field);
        }
    }

    fn decode(buf: &[u8], pos: usize) -> Result<(Self, usize), DecodeError> {
        let flags = *buf.get(pos).ok_or(DecodeError::UnexpectedEof {
            field: "child flags",
            offset: pos,
        })?;
        let mut pos = pos + 1;
        let mut child = ChildRef::default();
        for (bit, slot, field) in [
            (Self::ACCOUNT_KEY, &mut child.account_key, "account key"),
            (Self::STORAGE_KEY, &mut child.storage_key, "storage key"),
            (Self::HASH, &mut child.hash, "child hash"),
        ] {
            if flags & bit == 0 {
                continue;
            }
            let (len, next) = read_uvarint(buf, pos, field)?;
            pos = next;
            let end = usize::try_from(len)
                .ok()
                .and_then(|len| pos.checked_add(len))
                .ok_or(DecodeError::UnexpectedEof { field, offset: pos })?;
            let bytes = buf
                .get(pos..end)
                .ok_or(DecodeError::UnexpectedEof { field, offset: pos })?;
            *slot = Some(bytes.to_vec());
            pos = end;
        }
        Ok((child, pos))
    }
}

/// One branch update batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchData {
    /// Children touched by this batch.
    pub touch_map: u16,
    /// Children that exist after this batch.
    pub after_map: u16,
    children: [Option<ChildRef>; 16],
}

impl BranchData {
    /// An empty batch with the given maps and no child records yet.
    pub fn new(touch_map: u16, after_map: u16) -> Self {
        Self {
            touch_map,
            after_map,
            children: std::array::from_fn(|_| None),
        }
    }

    /// Record a surviving child, setting its bit in `after_map`.
    pub fn set_child(&mut self, index: usize, child: ChildRef) {
        assert!(index < 16, "branch child index out of range");
        self.after_map |= 1 << index;
        self.children[index] = Some(child);
    }

    /// The record for a surviving child, if its `after_map` bit is set.
    pub fn child(&self, index: usize) -> Option<&ChildRef> {
        if self.after_map & (1u16 << index) == 0 {
            return None;
        }
        self.children[index].as_ref()
    }

    /// Encode the batch.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 8 * self.after_map.count_ones() as usize);
        buf.extend_from_slice(&self.touch_map.to_be_bytes());
        buf.extend_from_slice(&self.after_map.to_be_bytes());
        let empty = ChildRef::default();
        for index in 0..16 {
            if self.after_map & (1u16 << index) == 0 {
                continue;
            }
            self.children[index]
                .as_ref()
                .unwrap_or(&empty)
                .encode_into(&mut buf);
        }
        buf
    }

    /// Decode a batch starting at `pos`. Returns the batch and the position
    /// after it.
    pub fn decode(buf: &[u8], pos: usize) -> Result<(Self, usize), DecodeError> {
        let maps = buf.get(pos..pos + 4).ok_or(DecodeError::UnexpectedEof {
            field: "branch maps",
            offset: pos,
        })?;
        let touch_map = u16::from_be_bytes([maps[0], maps[1]]);
        let after_map = u16::from_be_bytes([maps[2], maps[3]]);
        let mut pos = pos + 4;

        let mut branch = BranchData::new(touch_map, after_map);
        for index in 0..16 {
            if after_map & (1u16 << index) == 0 {
                continue;
            }
            let (child, next) = ChildRef::decode(buf, pos)?;
            branch.children[index] = Some(child);
            pos = next;
        }
        Ok((branch, pos))
    }

    /// Decode a batch that must span the whole buffer.
    pub fn decode_exact(buf: &[u8]) -> Result<Self, DecodeError> {
        let (branch, pos) = Self::decode(buf, 0)?;
        if pos != buf.len() {
            return Err(DecodeError::TrailingBytes {
                offset: pos,
                len: buf.len() - pos,
            });
        }
        Ok(branch)
    }

    /// Merge a newer batch over this one.
    ///
    /// The touch maps accumulate; existence is whatever the newer batch
    /// says; a surviving child's record comes from the newer batch when it
    /// touched that child, else from this one. Associative over batch
    /// sequences.
    pub fn merge(&self, newer: &BranchData) -> BranchData {
        let mut out = BranchData::new(self.touch_map | newer.touch_map, newer.after_map);
        for index in 0..16 {
            let bit = 1u16 << index;
            if newer.after_map & bit == 0 {
                continue;
            }
            let child = if newer.touch_map & bit != 0 {
                newer.child(index)
            } else {
                self.child(index).or_else(|| newer.child(index))
            };
            if let Some(child) = child {
                out.children[index] = Some(child.clone());
            }
        }
        out
    }
}

impl fmt::Display for BranchData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "touch {:016b} after {:016b} children {}",
            self.touch_map,
            self.after_map,
            self.after_map.count_ones()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_branch() -> BranchData {
        let mut branch = BranchData::new(0b0000_0000_0000_0110, 0);
        branch.set_child(1, ChildRef::hashed(vec![0xaa; 32]));
        branch.set_child(
            2,
            ChildRef {
                account_key: Some(vec![0x01, 0x02]),
                storage_key: None,
                hash: Some(vec![0xbb; 32]),
            },
        );
        branch
    }

    #[test]
    fn round_trips_maps_and_children() {
        let branch = sample_branch();
        let encoded = branch.encode();
        let decoded = BranchData::decode_exact(&encoded).unwrap();
        assert_eq!(decoded, branch);
    }

    #[test]
    fn round_trips_an_empty_batch() {
        let branch = BranchData::new(0, 0);
        assert_eq!(BranchData::decode_exact(&branch.encode()).unwrap(), branch);
    }

    #[test]
    fn truncation_is_rejected_everywhere() {
        let encoded = sample_branch().encode();
        for cut in 0..encoded.len() {
            assert!(
                BranchData::decode_exact(&encoded[..cut]).is_err(),
                "cut at {cut} decoded"
            );
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut encoded = sample_branch().encode();
        encoded.push(0);
        assert!(matches!(
            BranchData::decode_exact(&encoded),
            Err(DecodeError::TrailingBytes { .. })
        ));
    }

    #[test]
    fn merge_prefers_the_newer_touched_child() {
        let mut old = BranchData::new(0b0010, 0);
        old.set_child(1, ChildRef::hashed(vec![0x01]));
        old.set_child(3, ChildRef::hashed(vec![0x03]));

        // The newer batch touches child 1 and drops child 3.
        let mut newer = BranchData::new(0b0010, 0);
        newer.set_child(1, ChildRef::hashed(vec![0xff]));

        let merged = old.merge(&newer);
        assert_eq!(merged.touch_map, 0b0010);
        assert_eq!(merged.after_map, 0b0010);
        assert_eq!(merged.child(1), Some(&ChildRef::hashed(vec![0xff])));
        assert_eq!(merged.child(3), None);
    }

    #[test]
    fn merge_keeps_untouched_children_from_the_older_batch() {
        let mut old = BranchData::new(0b0010, 0);
        old.set_child(1, ChildRef::hashed(vec![0x01]));

        // The newer batch says child 1 still exists but did not touch it.
        let mut newer = BranchData::new(0b0100, 0);
        newer.set_child(1, ChildRef::hashed(vec![0xee]));
        newer.set_child(2, ChildRef::hashed(vec![0x02]));

        let merged = old.merge(&newer);
        assert_eq!(merged.touch_map, 0b0110);
        assert_eq!(merged.child(1), Some(&ChildRef::hashed(vec![0x01])));
        assert_eq!(merged.child(2), Some(&ChildRef::hashed(vec![0x02])));
    }

    #[test]
    fn child_lookup_respects_the_after_map() {
        let mut branch = BranchData::new(0, 0);
        branch.set_child(5, ChildRef::hashed(vec![0x05]));
        assert!(branch.child(5).is_some());
        assert!(branch.child(4).is_none());
    }
}
