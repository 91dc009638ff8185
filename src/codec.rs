// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Byte buffer for model serialization.
//!
//! Writes append to the end of the buffer; reads advance a cursor that can
//! be moved freely. Multi-byte primitives use the buffer's byte order and,
//! when alignment is enabled, start on a multiple of their own width.

use md5::{Digest, Md5};

use crate::error::{Result, TauPError};

/// Width of the digest slot at the start of a checksummed buffer.
pub const DIGEST_LEN: usize = 32;

/// Byte order of multi-byte primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

impl ByteOrder {
    /// Order of the running platform.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// The opposite order.
    pub fn reversed(self) -> Self {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }

    /// Marker byte stored in model headers.
    pub fn marker(self) -> u8 {
        match self {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        }
    }

    /// Inverse of [`marker`](Self::marker).
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            0 => Some(ByteOrder::Little),
            1 => Some(ByteOrder::Big),
            _ => None,
        }
    }
}

macro_rules! primitive {
    ($put:ident, $get:ident, $putv:ident, $getv:ident, $t:ty, $n:expr) => {
        #[doc = concat!("Append one `", stringify!($t), "`.")]
        pub fn $put(&mut self, value: $t) {
            self.pad_to($n);
            let bytes = match self.order {
                ByteOrder::Little => value.to_le_bytes(),
                ByteOrder::Big => value.to_be_bytes(),
            };
            self.bytes.extend_from_slice(&bytes);
        }

        #[doc = concat!("Read one `", stringify!($t), "` at the cursor.")]
        pub fn $get(&mut self) -> Result<$t> {
            self.skip_to($n);
            let mut raw = [0u8; $n];
            raw.copy_from_slice(self.take($n)?);
            Ok(match self.order {
                ByteOrder::Little => <$t>::from_le_bytes(raw),
                ByteOrder::Big => <$t>::from_be_bytes(raw),
            })
        }

        #[doc = concat!("Append an int32 count followed by `", stringify!($t), "` values.")]
        pub fn $putv(&mut self, values: &[$t]) {
            self.put_len(values.len());
            for &v in values {
                self.$put(v);
            }
        }

        #[doc = concat!("Read a counted array of `", stringify!($t), "`.")]
        pub fn $getv(&mut self) -> Result<Vec<$t>> {
            let n = self.get_len()?;
            (0..n).map(|_| self.$get()).collect()
        }
    };
}

/// Growable byte buffer with a read cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataBuffer {
    bytes: Vec<u8>,
    position: usize,
    order: ByteOrder,
    aligned: bool,
}

impl DataBuffer {
    /// Empty little-endian, unaligned buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing bytes with the cursor at the start.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        DataBuffer {
            bytes,
            ..Self::default()
        }
    }

    /// Use `order` for multi-byte primitives.
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// Enable or disable alignment padding.
    pub fn with_alignment(mut self, aligned: bool) -> Self {
        self.aligned = aligned;
        self
    }

    /// Current byte order.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Switch byte order for subsequent reads and writes.
    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    /// True if multi-byte primitives are aligned.
    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    /// Switch alignment for subsequent reads and writes.
    pub fn set_aligned(&mut self, aligned: bool) {
        self.aligned = aligned;
    }

    /// Buffer contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the buffer, returning its contents.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Total length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Cursor position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor. Positions past the end fail on the next read.
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    fn pad_to(&mut self, width: usize) {
        if self.aligned {
            let rem = self.bytes.len() % width;
            if rem != 0 {
                self.bytes.resize(self.bytes.len() + width - rem, 0);
            }
        }
    }

    fn skip_to(&mut self, width: usize) {
        if self.aligned {
            let rem = self.position % width;
            if rem != 0 {
                self.position += width - rem;
            }
        }
    }

    fn take(&mut self, needed: usize) -> Result<&[u8]> {
        let start = self.position;
        let end = start.checked_add(needed).filter(|&e| e <= self.bytes.len());
        match end {
            Some(end) => {
                self.position = end;
                Ok(&self.bytes[start..end])
            }
            None => Err(TauPError::TruncatedBuffer {
                position: start,
                needed,
                len: self.bytes.len(),
            }),
        }
    }

    fn put_len(&mut self, len: usize) {
        self.put_i32(i32::try_from(len).unwrap_or(i32::MAX));
    }

    fn get_len(&mut self) -> Result<usize> {
        let position = self.position;
        let n = self.get_i32()?;
        usize::try_from(n).map_err(|_| TauPError::InvalidString { position })
    }

    /// Append one byte.
    pub fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    /// Read one byte.
    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Append a boolean as one byte.
    pub fn put_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }

    /// Read a boolean; any non-zero byte is true.
    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Read `n` raw bytes.
    pub fn get_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    primitive!(put_i32, get_i32, put_i32_array, get_i32_array, i32, 4);
    primitive!(put_i64, get_i64, put_i64_array, get_i64_array, i64, 8);
    primitive!(put_f32, get_f32, put_f32_array, get_f32_array, f32, 4);
    primitive!(put_f64, get_f64, put_f64_array, get_f64_array, f64, 8);

    /// Append an int32 byte length followed by UTF-8 bytes.
    pub fn put_string(&mut self, value: &str) {
        self.put_len(value.len());
        self.put_bytes(value.as_bytes());
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> Result<String> {
        let position = self.position;
        let n = self.get_len()?;
        let raw = self.take(n)?.to_vec();
        String::from_utf8(raw).map_err(|_| TauPError::InvalidString { position })
    }

    /// Append a presence flag and, when present, the string.
    pub fn put_optional_string(&mut self, value: Option<&str>) {
        self.put_bool(value.is_some());
        if let Some(s) = value {
            self.put_string(s);
        }
    }

    /// Read a value written by [`put_optional_string`](Self::put_optional_string).
    pub fn get_optional_string(&mut self) -> Result<Option<String>> {
        if self.get_bool()? {
            self.get_string().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Append a zeroed digest slot. Must be the first write.
    pub fn reserve_digest(&mut self) {
        self.put_bytes(&[0u8; DIGEST_LEN]);
    }

    /// MD5 of every byte after the digest slot, as lower-case hex.
    pub fn compute_digest(&self) -> String {
        let body = self.bytes.get(DIGEST_LEN..).unwrap_or(&[]);
        format!("{:x}", Md5::digest(body))
    }

    /// Digest currently stored in the slot.
    pub fn stored_digest(&self) -> Result<String> {
        let slot = self.bytes.get(..DIGEST_LEN).ok_or(TauPError::TruncatedBuffer {
            position: 0,
            needed: DIGEST_LEN,
            len: self.bytes.len(),
        })?;
        String::from_utf8(slot.to_vec()).map_err(|_| TauPError::InvalidString { position: 0 })
    }

    /// Write the digest of the current contents into the slot.
    ///
    /// # Errors
    /// Returns [`TauPError::TruncatedBuffer`] if no slot was reserved.
    pub fn seal(&mut self) -> Result<()> {
        if self.bytes.len() < DIGEST_LEN {
            return Err(TauPError::TruncatedBuffer {
                position: 0,
                needed: DIGEST_LEN,
                len: self.bytes.len(),
            });
        }
        let digest = self.compute_digest();
        self.bytes[..DIGEST_LEN].copy_from_slice(digest.as_bytes());
        Ok(())
    }

    /// Check the stored digest against the contents.
    ///
    /// # Errors
    /// Returns [`TauPError::ChecksumMismatch`] when they differ.
    pub fn verify(&self) -> Result<()> {
        let stored = self.stored_digest()?;
        let computed = self.compute_digest();
        if stored != computed {
            return Err(TauPError::ChecksumMismatch { stored, computed });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_in_both_orders() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut buf = DataBuffer::new().with_byte_order(order);
            buf.put_u8(7);
            buf.put_bool(true);
            buf.put_i32(-123_456);
            buf.put_i64(1 << 40);
            buf.put_f32(1.5);
            buf.put_f64(-6371.25);
            buf.put_string("Moho");
            let mut rd = DataBuffer::from_bytes(buf.into_bytes()).with_byte_order(order);
            assert_eq!(rd.get_u8().unwrap(), 7);
            assert!(rd.get_bool().unwrap());
            assert_eq!(rd.get_i32().unwrap(), -123_456);
            assert_eq!(rd.get_i64().unwrap(), 1 << 40);
            assert_eq!(rd.get_f32().unwrap(), 1.5);
            assert_eq!(rd.get_f64().unwrap(), -6371.25);
            assert_eq!(rd.get_string().unwrap(), "Moho");
            assert_eq!(rd.remaining(), 0);
        }
    }

    #[test]
    fn big_endian_layout() {
        let mut buf = DataBuffer::new().with_byte_order(ByteOrder::Big);
        buf.put_i32(1);
        assert_eq!(buf.as_bytes(), &[0, 0, 0, 1]);
        let mut buf = DataBuffer::new();
        buf.put_i32(1);
        assert_eq!(buf.as_bytes(), &[1, 0, 0, 0]);
    }

    #[test]
    fn alignment_pads_multibyte_values() {
        let mut buf = DataBuffer::new().with_alignment(true);
        buf.put_u8(1);
        buf.put_f64(2.0);
        buf.put_u8(3);
        buf.put_i32(4);
        assert_eq!(buf.len(), 8 + 8 + 4 + 4);

        let mut rd = DataBuffer::from_bytes(buf.into_bytes()).with_alignment(true);
        assert_eq!(rd.get_u8().unwrap(), 1);
        assert_eq!(rd.get_f64().unwrap(), 2.0);
        assert_eq!(rd.get_u8().unwrap(), 3);
        assert_eq!(rd.get_i32().unwrap(), 4);
    }

    #[test]
    fn arrays_and_optional_strings() {
        let mut buf = DataBuffer::new();
        buf.put_f64_array(&[1.0, 2.0, 3.0]);
        buf.put_i32_array(&[]);
        buf.put_optional_string(None);
        buf.put_optional_string(Some("PKP"));
        let mut rd = DataBuffer::from_bytes(buf.into_bytes());
        assert_eq!(rd.get_f64_array().unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(rd.get_i32_array().unwrap().is_empty());
        assert_eq!(rd.get_optional_string().unwrap(), None);
        assert_eq!(rd.get_optional_string().unwrap().as_deref(), Some("PKP"));
    }

    #[test]
    fn truncated_read_reports_position() {
        let mut rd = DataBuffer::from_bytes(vec![1, 2, 3]);
        rd.seek(1);
        match rd.get_i32() {
            Err(TauPError::TruncatedBuffer { position, needed, len }) => {
                assert_eq!((position, needed, len), (1, 4, 3));
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn negative_string_length_is_rejected() {
        let mut buf = DataBuffer::new();
        buf.put_i32(-4);
        let mut rd = DataBuffer::from_bytes(buf.into_bytes());
        assert!(matches!(rd.get_string(), Err(TauPError::InvalidString { position: 0 })));
    }

    #[test]
    fn digest_detects_corruption() {
        let mut buf = DataBuffer::new();
        buf.reserve_digest();
        buf.put_string("model");
        buf.put_f64(8.0);
        buf.seal().unwrap();
        assert!(buf.verify().is_ok());
        assert_eq!(buf.stored_digest().unwrap().len(), DIGEST_LEN);

        let mut bytes = buf.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let corrupted = DataBuffer::from_bytes(bytes);
        assert!(matches!(corrupted.verify(), Err(TauPError::ChecksumMismatch { .. })));
    }

    #[test]
    fn empty_digest_matches_known_value() {
        let mut buf = DataBuffer::new();
        buf.reserve_digest();
        assert_eq!(buf.compute_digest(), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
