//! BER-TLV Encoder
//!
//! Encodes TLV trees and tag/length headers to bytes for card commands.

use super::TLV;

/// TLV Encoder for building BER-TLV structures
pub struct TLVEncoder;

impl TLVEncoder {
    /// Encode a tag-value pair to bytes
    pub fn encode(tag: u16, value: &[u8]) -> Vec<u8> {
        let mut result = Self::encode_taglen(tag, value.len());
        result.extend_from_slice(value);
        result
    }

    /// Encode a tag followed by a length, without any value
    ///
    /// OpenPGP key import uses this form to declare component sizes in
    /// `7F48` while the component bytes travel separately in `5F48`.
    pub fn encode_taglen(tag: u16, length: usize) -> Vec<u8> {
        let mut result = Self::encode_tag(tag);
        result.extend(Self::encode_length(length));
        result
    }

    /// Encode just the tag bytes
    pub fn encode_tag(tag: u16) -> Vec<u8> {
        if tag > 0xFF {
            tag.to_be_bytes().to_vec()
        } else {
            vec![tag as u8]
        }
    }

    /// Encode just the length bytes, shortest form
    pub fn encode_length(length: usize) -> Vec<u8> {
        if length < 0x80 {
            // Short form
            vec![length as u8]
        } else if length <= 0xFF {
            vec![0x81, length as u8]
        } else if length <= 0xFFFF {
            vec![0x82, (length >> 8) as u8, length as u8]
        } else if length <= 0xFF_FFFF {
            vec![0x83, (length >> 16) as u8, (length >> 8) as u8, length as u8]
        } else {
            let bytes = (length as u32).to_be_bytes();
            vec![0x84, bytes[0], bytes[1], bytes[2], bytes[3]]
        }
    }

    /// Number of bytes [`TLVEncoder::encode_tag`] emits
    pub fn tag_size(tag: u16) -> usize {
        if tag > 0xFF {
            2
        } else {
            1
        }
    }

    /// Number of bytes [`TLVEncoder::encode_length`] emits
    pub fn length_size(length: usize) -> usize {
        match length {
            0..=0x7F => 1,
            0x80..=0xFF => 2,
            0x100..=0xFFFF => 3,
            0x1_0000..=0xFF_FFFF => 4,
            _ => 5,
        }
    }

    /// Encode a TLV tree to bytes, children in order
    pub fn encode_tlv(tlv: &TLV) -> Vec<u8> {
        Self::encode(tlv.tag(), &tlv.value_bytes())
    }

    /// Build a constructed TLV from already encoded children
    pub fn build_constructed(tag: u16, children: &[&[u8]]) -> Vec<u8> {
        Self::encode(tag, &children.concat())
    }
}

/// Builder for byte-level TLV sequences
///
/// Useful when a response is assembled once and never inspected again,
/// e.g. a `7F49` public key template.
pub struct TLVBuilder {
    data: Vec<u8>,
}

impl TLVBuilder {
    /// Create a new TLV builder
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Add a primitive TLV
    pub fn add(mut self, tag: u16, value: &[u8]) -> Self {
        self.data.extend(TLVEncoder::encode(tag, value));
        self
    }

    /// Add raw bytes (pre-encoded TLV)
    pub fn add_raw(mut self, data: &[u8]) -> Self {
        self.data.extend_from_slice(data);
        self
    }

    /// Wrap current content in a constructed tag
    pub fn wrap(self, tag: u16) -> Self {
        let wrapped = TLVEncoder::encode(tag, &self.data);
        Self { data: wrapped }
    }

    /// Build the final byte vector
    pub fn build(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for TLVBuilder {
    fn default() -> Self {
        Self::new()
    }
}
