//! The account/storage update record.
//!
//! Two codecs share the [`StateUpdate`] value:
//!
//! - [`StateUpdate::encode`] / [`StateUpdate::decode`]: the flagged record
//!   used by the commitment layer (flags byte, then only the flagged
//!   fields).
//! - [`StateUpdate::decode_for_storage`]: the flag-less, length-prefixed
//!   account encoding used by the storage layer.
//!
//! They serve different persistence layers and are deliberately distinct;
//! neither delegates to the other.

use crate::error::DecodeError;
use crate::varint::{put_uvarint, read_uvarint};
use alloy_primitives::U256;
use lodestone_types::EMPTY_CODE_HASH;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Field flags of an update record. `DELETE` is exclusive of all others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateFlags(u8);

impl UpdateFlags {
    /// Code hash present.
    pub const CODE: UpdateFlags = UpdateFlags(1);
    /// The key is deleted; no other field may be flagged.
    pub const DELETE: UpdateFlags = UpdateFlags(2);
    /// Balance present.
    pub const BALANCE: UpdateFlags = UpdateFlags(4);
    /// Nonce present.
    pub const NONCE: UpdateFlags = UpdateFlags(8);
    /// Storage value present.
    pub const STORAGE: UpdateFlags = UpdateFlags(16);

    /// No fields flagged.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit pattern.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Reconstruct from a raw flags byte. Unknown bits are carried as-is,
    /// matching the wire format's forward tolerance.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: UpdateFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for UpdateFlags {
    type Output = UpdateFlags;

    fn bitor(self, rhs: UpdateFlags) -> UpdateFlags {
        UpdateFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for UpdateFlags {
    fn bitor_assign(&mut self, rhs: UpdateFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for UpdateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::DELETE {
            return write!(f, "Delete");
        }
        if self.contains(Self::BALANCE) {
            write!(f, "+Balance")?;
        }
        if self.contains(Self::NONCE) {
            write!(f, "+Nonce")?;
        }
        if self.contains(Self::CODE) {
            write!(f, "+Code")?;
        }
        if self.contains(Self::STORAGE) {
            write!(f, "+Storage")?;
        }
        Ok(())
    }
}

/// One account or storage update, as carried through the commitment layer.
///
/// `code_hash_or_storage` holds a code hash (32 bytes) for account records
/// and the raw storage value prefix for storage records; `val_length` is
/// the authoritative storage value length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    /// Which fields this record carries.
    pub flags: UpdateFlags,
    /// Account balance, when flagged.
    pub balance: U256,
    /// Account nonce, when flagged.
    pub nonce: u64,
    /// Code hash or storage value bytes.
    pub code_hash_or_storage: [u8; 32],
    /// Authoritative length of the storage value (0..=32).
    pub val_length: usize,
}

impl Default for StateUpdate {
    fn default() -> Self {
        Self {
            flags: UpdateFlags::empty(),
            balance: U256::ZERO,
            nonce: 0,
            code_hash_or_storage: EMPTY_CODE_HASH,
            val_length: 0,
        }
    }
}

impl StateUpdate {
    /// A record deleting its key.
    pub fn deleted() -> Self {
        Self {
            flags: UpdateFlags::DELETE,
            ..Self::default()
        }
    }

    /// A record carrying a balance.
    pub fn balance(balance: U256) -> Self {
        Self {
            flags: UpdateFlags::BALANCE,
            balance,
            ..Self::default()
        }
    }

    /// A record carrying a nonce.
    pub fn nonce(nonce: u64) -> Self {
        Self {
            flags: UpdateFlags::NONCE,
            nonce,
            ..Self::default()
        }
    }

    /// A record carrying a code hash.
    pub fn code(code_hash: [u8; 32]) -> Self {
        Self {
            flags: UpdateFlags::CODE,
            code_hash_or_storage: code_hash,
            ..Self::default()
        }
    }

    /// A record carrying a storage value of up to 32 bytes.
    pub fn storage(value: &[u8]) -> Self {
        assert!(value.len() <= 32, "storage value exceeds 32 bytes");
        let mut bytes = [0u8; 32];
        bytes[..value.len()].copy_from_slice(value);
        Self {
            flags: UpdateFlags::STORAGE,
            code_hash_or_storage: bytes,
            val_length: value.len(),
            ..Self::default()
        }
    }

    /// The flagged storage value prefix.
    pub fn storage_value(&self) -> &[u8] {
        &self.code_hash_or_storage[..self.val_length]
    }

    /// Overlay another non-delete record onto this one, field by field.
    pub fn apply(&mut self, other: &StateUpdate) {
        debug_assert!(
            !other.flags.contains(UpdateFlags::DELETE),
            "deletes remove the key instead of merging"
        );
        if other.flags.contains(UpdateFlags::BALANCE) {
            self.flags |= UpdateFlags::BALANCE;
            self.balance = other.balance;
        }
        if other.flags.contains(UpdateFlags::NONCE) {
            self.flags |= UpdateFlags::NONCE;
            self.nonce = other.nonce;
        }
        if other.flags.contains(UpdateFlags::CODE) {
            self.flags |= UpdateFlags::CODE;
            self.code_hash_or_storage = other.code_hash_or_storage;
        }
        if other.flags.contains(UpdateFlags::STORAGE) {
            self.flags |= UpdateFlags::STORAGE;
            self.code_hash_or_storage = other.code_hash_or_storage;
            self.val_length = other.val_length;
        }
    }

    /// Encode the flagged record.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 32 + 10);
        buf.push(self.flags.bits());
        if self.flags.contains(UpdateFlags::BALANCE) {
            let len = self.balance.byte_len();
            buf.push(len as u8);
            let bytes = self.balance.to_be_bytes::<32>();
            buf.extend_from_slice(&bytes[32 - len..]);
        }
        if self.flags.contains(UpdateFlags::NONCE) {
            put_uvarint(&mut buf, self.nonce);
        }
        if self.flags.contains(UpdateFlags::CODE) {
            buf.extend_from_slice(&self.code_hash_or_storage);
        }
        if self.flags.contains(UpdateFlags::STORAGE) {
            put_uvarint(&mut buf, self.val_length as u64);
            buf.extend_from_slice(&self.code_hash_or_storage[..self.val_length]);
        }
        buf
    }

    /// Decode a flagged record starting at `pos`. Returns the record and
    /// the position after it.
    pub fn decode(buf: &[u8], pos: usize) -> Result<(Self, usize), DecodeError> {
        let mut pos = pos;
        let flags_byte = *buf
            .get(pos)
            .ok_or(DecodeError::UnexpectedEof { field: "flags", offset: pos })?;
        let flags = UpdateFlags::from_bits(flags_byte);
        pos += 1;

        let mut update = StateUpdate {
            flags,
            ..StateUpdate::default()
        };

        if flags.contains(UpdateFlags::BALANCE) {
            let len = *buf.get(pos).ok_or(DecodeError::UnexpectedEof {
                field: "balance length",
                offset: pos,
            })? as usize;
            if len > 32 {
                return Err(DecodeError::FieldTooLong {
                    field: "balance",
                    len,
                    max: 32,
                    offset: pos,
                });
            }
            pos += 1;
            let bytes = buf
                .get(pos..pos + len)
                .ok_or(DecodeError::UnexpectedEof { field: "balance", offset: pos })?;
            update.balance = U256::from_be_slice(bytes);
            pos += len;
        }

        if flags.contains(UpdateFlags::NONCE) {
            let (nonce, next) = read_uvarint(buf, pos, "nonce")?;
            update.nonce = nonce;
            pos = next;
        }

        if flags.contains(UpdateFlags::CODE) {
            let bytes = buf
                .get(pos..pos + 32)
                .ok_or(DecodeError::UnexpectedEof { field: "code hash", offset: pos })?;
            update.code_hash_or_storage.copy_from_slice(bytes);
            pos += 32;
        }

        if flags.contains(UpdateFlags::STORAGE) {
            let (len, next) = read_uvarint(buf, pos, "storage length")?;
            if len > 32 {
                return Err(DecodeError::FieldTooLong {
                    field: "storage",
                    len: len as usize,
                    max: 32,
                    offset: pos,
                });
            }
            pos = next;
            let len = len as usize;
            let bytes = buf
                .get(pos..pos + len)
                .ok_or(DecodeError::UnexpectedEof { field: "storage", offset: pos })?;
            update.code_hash_or_storage = [0u8; 32];
            update.code_hash_or_storage[..len].copy_from_slice(bytes);
            update.val_length = len;
            pos += len;
        }

        Ok((update, pos))
    }

    /// Decode a flagged record that must span the whole buffer.
    pub fn decode_exact(buf: &[u8]) -> Result<Self, DecodeError> {
        let (update, pos) = Self::decode(buf, 0)?;
        if pos != buf.len() {
            return Err(DecodeError::TrailingBytes {
                offset: pos,
                len: buf.len() - pos,
            });
        }
        Ok(update)
    }

    /// Decode the storage layer's flag-less account encoding:
    /// `len | nonce bytes | len | balance bytes | len | code hash bytes`,
    /// each length a single byte and each integer big-endian.
    pub fn decode_for_storage(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut update = StateUpdate::default();
        let mut pos = 0usize;

        let nonce_len = *buf.get(pos).ok_or(DecodeError::UnexpectedEof {
            field: "nonce length",
            offset: pos,
        })? as usize;
        if nonce_len > 8 {
            return Err(DecodeError::FieldTooLong {
                field: "nonce",
                len: nonce_len,
                max: 8,
                offset: pos,
            });
        }
        pos += 1;
        if nonce_len > 0 {
            let bytes = buf
                .get(pos..pos + nonce_len)
                .ok_or(DecodeError::UnexpectedEof { field: "nonce", offset: pos })?;
            update.nonce = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
            pos += nonce_len;
        }

        let balance_len = *buf.get(pos).ok_or(DecodeError::UnexpectedEof {
            field: "balance length",
            offset: pos,
        })? as usize;
        if balance_len > 32 {
            return Err(DecodeError::FieldTooLong {
                field: "balance",
                len: balance_len,
                max: 32,
                offset: pos,
            });
        }
        pos += 1;
        if balance_len > 0 {
            let bytes = buf
                .get(pos..pos + balance_len)
                .ok_or(DecodeError::UnexpectedEof { field: "balance", offset: pos })?;
            update.balance = U256::from_be_slice(bytes);
            pos += balance_len;
        }

        let code_len = *buf.get(pos).ok_or(DecodeError::UnexpectedEof {
            field: "code hash length",
            offset: pos,
        })? as usize;
        if code_len > 32 {
            return Err(DecodeError::FieldTooLong {
                field: "code hash",
                len: code_len,
                max: 32,
                offset: pos,
            });
        }
        pos += 1;
        if code_len > 0 {
            let bytes = buf
                .get(pos..pos + code_len)
                .ok_or(DecodeError::UnexpectedEof { field: "code hash", offset: pos })?;
            update.code_hash_or_storage[..code_len].copy_from_slice(bytes);
        }

        Ok(update)
    }
}

impl fmt::Display for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags: [{}]", self.flags)?;
        if self.flags.contains(UpdateFlags::BALANCE) {
            write!(f, ", Balance: [{}]", self.balance)?;
        }
        if self.flags.contains(UpdateFlags::NONCE) {
            write!(f, ", Nonce: [{}]", self.nonce)?;
        }
        if self.flags.contains(UpdateFlags::CODE) {
            write!(f, ", CodeHash: [{}]", alloy_primitives::hex::encode(self.code_hash_or_storage))?;
        }
        if self.flags.contains(UpdateFlags::STORAGE) {
            write!(f, ", Storage: [{}]", alloy_primitives::hex::encode(self.storage_value()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(update: &StateUpdate) {
        let encoded = update.encode();
        let decoded = StateUpdate::decode_exact(&encoded).unwrap();
        assert_eq!(&decoded, update, "round trip of {update}");
    }

    #[test]
    fn round_trips_every_record_shape() {
        round_trip(&StateUpdate::deleted());
        round_trip(&StateUpdate::balance(U256::ZERO));
        round_trip(&StateUpdate::balance(U256::from(1u64)));
        round_trip(&StateUpdate::balance(U256::MAX));
        round_trip(&StateUpdate::nonce(0));
        round_trip(&StateUpdate::nonce(u64::MAX));
        round_trip(&StateUpdate::code([0xab; 32]));
        round_trip(&StateUpdate::storage(&[]));
        round_trip(&StateUpdate::storage(&[0x01]));
        round_trip(&StateUpdate::storage(&[0xff; 32]));

        let mut combined = StateUpdate::balance(U256::from(123_456u64));
        combined.apply(&StateUpdate::nonce(77));
        combined.apply(&StateUpdate::code([0x11; 32]));
        round_trip(&combined);
    }

    #[test]
    fn zero_balance_encodes_as_zero_length() {
        let encoded = StateUpdate::balance(U256::ZERO).encode();
        assert_eq!(encoded, vec![UpdateFlags::BALANCE.bits(), 0]);
    }

    #[test]
    fn delete_record_is_a_single_flags_byte() {
        assert_eq!(StateUpdate::deleted().encode(), vec![UpdateFlags::DELETE.bits()]);
    }

    #[test]
    fn truncation_is_rejected_at_every_field_boundary() {
        let mut full = StateUpdate::balance(U256::from(1_000_000u64));
        full.apply(&StateUpdate::nonce(300));
        full.apply(&StateUpdate::code([0x22; 32]));
        let encoded = full.encode();

        assert_eq!(
            StateUpdate::decode_exact(&[]),
            Err(DecodeError::UnexpectedEof { field: "flags", offset: 0 })
        );
        for cut in 1..encoded.len() {
            let err = StateUpdate::decode_exact(&encoded[..cut]).unwrap_err();
            assert!(
                matches!(
                    err,
                    DecodeError::UnexpectedEof { .. } | DecodeError::VarintOverflow { .. }
                ),
                "cut at {cut} produced {err:?}"
            );
        }
    }

    #[test]
    fn storage_truncation_is_rejected() {
        let encoded = StateUpdate::storage(&[0xaa, 0xbb, 0xcc]).encode();
        for cut in 1..encoded.len() {
            assert!(StateUpdate::decode_exact(&encoded[..cut]).is_err());
        }
    }

    #[test]
    fn oversized_lengths_are_rejected() {
        // Balance length byte above 32.
        let buf = [UpdateFlags::BALANCE.bits(), 33];
        assert!(matches!(
            StateUpdate::decode_exact(&buf),
            Err(DecodeError::FieldTooLong { field: "balance", .. })
        ));

        // Storage length varint above 32.
        let mut buf = vec![UpdateFlags::STORAGE.bits()];
        put_uvarint(&mut buf, 33);
        assert!(matches!(
            StateUpdate::decode_exact(&buf),
            Err(DecodeError::FieldTooLong { field: "storage", .. })
        ));
    }

    #[test]
    fn nonce_varint_overflow_is_rejected() {
        let mut buf = vec![UpdateFlags::NONCE.bits()];
        buf.extend_from_slice(&[0x80; 9]);
        buf.push(0x02);
        assert_eq!(
            StateUpdate::decode_exact(&buf),
            Err(DecodeError::VarintOverflow { field: "nonce", offset: 1 })
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut encoded = StateUpdate::nonce(5).encode();
        encoded.push(0x00);
        assert_eq!(
            StateUpdate::decode_exact(&encoded),
            Err(DecodeError::TrailingBytes { offset: 2, len: 1 })
        );
    }

    #[test]
    fn storage_value_length_is_authoritative() {
        // A short value padded inside the 32-byte buffer encodes only its
        // declared prefix.
        let update = StateUpdate::storage(&[0xde, 0xad]);
        let encoded = update.encode();
        assert_eq!(encoded, vec![UpdateFlags::STORAGE.bits(), 2, 0xde, 0xad]);
        let decoded = StateUpdate::decode_exact(&encoded).unwrap();
        assert_eq!(decoded.storage_value(), &[0xde, 0xad]);
        assert_eq!(decoded.val_length, 2);
    }

    #[test]
    fn decode_for_storage_reads_the_flagless_layout() {
        // nonce 0x0102, balance 0x03, 4-byte code prefix
        let buf = [2, 0x01, 0x02, 1, 0x03, 4, 0xaa, 0xbb, 0xcc, 0xdd];
        let update = StateUpdate::decode_for_storage(&buf).unwrap();
        assert_eq!(update.nonce, 0x0102);
        assert_eq!(update.balance, U256::from(3u64));
        assert_eq!(&update.code_hash_or_storage[..4], &[0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(update.flags, UpdateFlags::empty());
    }

    #[test]
    fn decode_for_storage_defaults_to_the_empty_code_hash() {
        let update = StateUpdate::decode_for_storage(&[0, 0, 0]).unwrap();
        assert_eq!(update.nonce, 0);
        assert_eq!(update.balance, U256::ZERO);
        assert_eq!(update.code_hash_or_storage, lodestone_types::EMPTY_CODE_HASH);
    }

    #[test]
    fn decode_for_storage_rejects_truncation() {
        assert!(StateUpdate::decode_for_storage(&[]).is_err());
        assert!(StateUpdate::decode_for_storage(&[2, 0x01]).is_err());
        assert!(StateUpdate::decode_for_storage(&[0, 1]).is_err());
        assert!(StateUpdate::decode_for_storage(&[0, 0, 33]).is_err());
    }

    #[test]
    fn flags_display_matches_the_wire_taxonomy() {
        assert_eq!(UpdateFlags::DELETE.to_string(), "Delete");
        assert_eq!(
            (UpdateFlags::BALANCE | UpdateFlags::NONCE | UpdateFlags::STORAGE).to_string(),
            "+Balance+Nonce+Storage"
        );
    }
}
