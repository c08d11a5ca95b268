//! BER-TLV Parser
//!
//! Parses BER-TLV (Basic Encoding Rules - Tag Length Value) structures
//! as exchanged with OpenPGP cards, into a tree of [`TLV`] nodes.

use std::fmt;

use thiserror::Error;

use super::encoder::TLVEncoder;

/// Grammar violations found while decoding a buffer
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    #[error("unexpected end of data while parsing tag")]
    UnexpectedEndTag,

    #[error("unexpected end of data while parsing length")]
    UnexpectedEndLength,

    #[error("declared length {declared} exceeds the {available} bytes remaining")]
    UnexpectedEndValue { declared: usize, available: usize },

    #[error("indefinite length form is not allowed")]
    IndefiniteLength,

    #[error("length uses {0} bytes, at most 4 supported")]
    LengthTooLarge(usize),

    #[error("only two bytes for tags supported")]
    TagTooLong,

    #[error("{0} bytes left after the top-level object")]
    TrailingBytes(usize),
}

/// Errors raised by the TLV codec
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TLVError {
    /// The buffer does not follow the BER-TLV grammar
    #[error("malformed encoding: {0}")]
    MalformedEncoding(#[from] Malformed),

    /// A child was appended to a primitive node that already holds bytes
    #[error("tag 0x{0:X} holds raw bytes and cannot take children")]
    InvalidNodeKind(u16),

    /// A tag the protocol guarantees was not found
    #[error("tag 0x{0:X} not found")]
    MissingTag(u16),
}

/// Value of a TLV node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TLVValue {
    /// Raw bytes
    Primitive(Vec<u8>),
    /// Nested data objects, in wire order
    Constructed(Vec<TLV>),
}

/// A TLV (Tag-Length-Value) node
///
/// The length is never stored: it is derived from the value when encoding,
/// so it always matches the value even after children are appended.
///
/// # Example
/// ```ignore
/// let pk = TLV::parse(&response)?;
/// if let Some(point) = pk.find(0x86) {
///     println!("{}", point);
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TLV {
    tag: u16,
    value: TLVValue,
}

impl TLV {
    /// Create a new primitive TLV
    pub fn new(tag: u16, value: Vec<u8>) -> Self {
        Self {
            tag,
            value: TLVValue::Primitive(value),
        }
    }

    /// Create a new constructed TLV with children
    pub fn constructed(tag: u16, children: Vec<TLV>) -> Self {
        Self {
            tag,
            value: TLVValue::Constructed(children),
        }
    }

    /// Create a zero-length node
    ///
    /// The node kind follows the tag class bit, so the node compares equal
    /// to what [`TLV::parse`] returns for `tag 00`. Either kind accepts
    /// children through [`TLV::append`].
    pub fn empty(tag: u16) -> Self {
        if is_constructed_tag(tag) {
            Self::constructed(tag, Vec::new())
        } else {
            Self::new(tag, Vec::new())
        }
    }

    /// Parse exactly one data object from `data`
    ///
    /// Constructed tags are decoded recursively. Any byte left after the
    /// object is an error.
    pub fn parse(data: &[u8]) -> Result<Self, TLVError> {
        let (tlv, rest) = read_single(data, true)?;
        if !rest.is_empty() {
            return Err(Malformed::TrailingBytes(rest.len()).into());
        }
        Ok(tlv)
    }

    /// Serialize this node (tag, shortest length, value)
    pub fn encode(&self) -> Vec<u8> {
        TLVEncoder::encode_tlv(self)
    }

    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn value(&self) -> &TLVValue {
        &self.value
    }

    /// Raw bytes of a primitive node, `None` for a constructed one
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.value {
            TLVValue::Primitive(bytes) => Some(bytes),
            TLVValue::Constructed(_) => None,
        }
    }

    /// Child nodes; empty for primitive nodes
    pub fn children(&self) -> &[TLV] {
        match &self.value {
            TLVValue::Primitive(_) => &[],
            TLVValue::Constructed(children) => children,
        }
    }

    /// Check if this node holds children (as opposed to raw bytes)
    pub fn is_constructed(&self) -> bool {
        matches!(self.value, TLVValue::Constructed(_))
    }

    /// Check if the tag class bit marks this tag as constructed
    pub fn has_constructed_tag(&self) -> bool {
        is_constructed_tag(self.tag)
    }

    /// Encoded length of the value, i.e. the L in TLV
    pub fn len(&self) -> usize {
        match &self.value {
            TLVValue::Primitive(bytes) => bytes.len(),
            TLVValue::Constructed(children) => children.iter().map(TLV::encoded_len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total encoded size: tag bytes + length bytes + value
    pub fn encoded_len(&self) -> usize {
        let len = self.len();
        TLVEncoder::tag_size(self.tag) + TLVEncoder::length_size(len) + len
    }

    /// Value bytes as they appear on the wire
    pub fn value_bytes(&self) -> Vec<u8> {
        match &self.value {
            TLVValue::Primitive(bytes) => bytes.clone(),
            TLVValue::Constructed(children) => {
                children.iter().flat_map(TLV::encode).collect()
            }
        }
    }

    /// Append a child built from a tag and raw bytes
    ///
    /// Empty bytes produce a placeholder that can itself take children.
    /// Returns the new child so nested objects can be filled in place.
    pub fn append(&mut self, tag: u16, value: Vec<u8>) -> Result<&mut TLV, TLVError> {
        let child = if value.is_empty() {
            TLV::empty(tag)
        } else {
            TLV::new(tag, value)
        };
        self.push(child)
    }

    /// Append a prebuilt child node
    pub fn push(&mut self, child: TLV) -> Result<&mut TLV, TLVError> {
        if let TLVValue::Primitive(bytes) = &self.value {
            if !bytes.is_empty() {
                return Err(TLVError::InvalidNodeKind(self.tag));
            }
            self.value = TLVValue::Constructed(Vec::new());
        }
        match &mut self.value {
            TLVValue::Constructed(children) => {
                children.push(child);
                let last = children.len() - 1;
                Ok(&mut children[last])
            }
            TLVValue::Primitive(_) => Err(TLVError::InvalidNodeKind(self.tag)),
        }
    }

    /// Recursively search for a tag (depth-first, root included)
    pub fn find(&self, tag: u16) -> Option<&TLV> {
        if self.tag == tag {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(tag))
    }

    /// Mutable variant of [`TLV::find`]; changes land in this tree
    pub fn find_mut(&mut self, tag: u16) -> Option<&mut TLV> {
        let path = self.path_of(tag)?;
        self.get_mut(&path)
    }

    /// Find a tag or fail with [`TLVError::MissingTag`]
    pub fn require(&self, tag: u16) -> Result<&TLV, TLVError> {
        self.find(tag).ok_or(TLVError::MissingTag(tag))
    }

    /// Find a direct child by tag (non-recursive)
    pub fn find_child(&self, tag: u16) -> Option<&TLV> {
        self.children().iter().find(|c| c.tag == tag)
    }

    /// Child-index path to the first node carrying `tag`
    ///
    /// The root itself has the empty path.
    pub fn path_of(&self, tag: u16) -> Option<Vec<usize>> {
        if self.tag == tag {
            return Some(Vec::new());
        }
        for (index, child) in self.children().iter().enumerate() {
            if let Some(mut rest) = child.path_of(tag) {
                rest.insert(0, index);
                return Some(rest);
            }
        }
        None
    }

    /// Follow a child-index path
    pub fn get(&self, path: &[usize]) -> Option<&TLV> {
        match path.split_first() {
            None => Some(self),
            Some((&index, rest)) => self.children().get(index)?.get(rest),
        }
    }

    /// Follow a child-index path, mutably
    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut TLV> {
        match path.split_first() {
            None => Some(self),
            Some((&index, rest)) => match &mut self.value {
                TLVValue::Constructed(children) => children.get_mut(index)?.get_mut(rest),
                TLVValue::Primitive(_) => None,
            },
        }
    }

    /// Re-read the bytes of a primitive node as a list of data objects
    ///
    /// Some OpenPGP DOs nest objects under a tag without the constructed
    /// bit (`4D`, the extended header list), so the parser keeps their value
    /// as bytes. Constructed nodes return a copy of their children.
    pub fn read_nested(&self, recursive: bool) -> Result<Vec<TLV>, TLVError> {
        match &self.value {
            TLVValue::Primitive(bytes) => read_objects(bytes, recursive, false),
            TLVValue::Constructed(children) => Ok(children.clone()),
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match &self.value {
            TLVValue::Primitive(bytes) => writeln!(
                f,
                "{}{:X} [{}] {}",
                pad,
                self.tag,
                bytes.len(),
                hex::encode_upper(bytes)
            ),
            TLVValue::Constructed(children) => {
                writeln!(f, "{}{:X} [{}]", pad, self.tag, self.len())?;
                for child in children {
                    child.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for TLV {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// Check the constructed bit (0x20) of the first tag byte
pub fn is_constructed_tag(tag: u16) -> bool {
    let first_byte = if tag > 0xFF { (tag >> 8) as u8 } else { tag as u8 };
    (first_byte & 0x20) != 0
}

/// Parse a sequence of data objects
///
/// Filler bytes (0x00, 0xFF) between top-level objects are skipped. Inside
/// a value every byte is read as a tag, so a child tagged `00` survives.
/// With `recursive` unset, constructed tags keep their value as raw bytes.
pub fn read_list(data: &[u8], recursive: bool) -> Result<Vec<TLV>, TLVError> {
    read_objects(data, recursive, true)
}

fn read_objects(data: &[u8], recursive: bool, skip_filler: bool) -> Result<Vec<TLV>, TLVError> {
    let mut result = Vec::new();
    let mut remaining = data;

    while let Some(&first) = remaining.first() {
        if skip_filler && (first == 0x00 || first == 0xFF) {
            remaining = &remaining[1..];
            continue;
        }

        let (tlv, rest) = read_single(remaining, recursive)?;
        result.push(tlv);
        remaining = rest;
    }

    Ok(result)
}

/// Parse a single data object and return it with the remaining bytes
pub fn read_single(data: &[u8], recursive: bool) -> Result<(TLV, &[u8]), TLVError> {
    let (tag, tag_len) = parse_tag(data)?;
    let rest = &data[tag_len..];

    let (length, len_len) = parse_length(rest)?;
    let rest = &rest[len_len..];

    if length > rest.len() {
        return Err(Malformed::UnexpectedEndValue {
            declared: length,
            available: rest.len(),
        }
        .into());
    }
    let (value, rest) = rest.split_at(length);

    let tlv = if recursive && is_constructed_tag(tag) {
        TLV::constructed(tag, read_objects(value, true, false)?)
    } else {
        TLV::new(tag, value.to_vec())
    };

    Ok((tlv, rest))
}

/// Parse a list of tag/length descriptors carrying no values
///
/// This is the layout of a `7F48` private key template: each entry
/// declares the size of a component sent separately in `5F48`.
pub fn read_taglen_list(data: &[u8]) -> Result<Vec<(u16, usize)>, TLVError> {
    let mut result = Vec::new();
    let mut remaining = data;

    while !remaining.is_empty() {
        let (tag, tag_len) = parse_tag(remaining)?;
        let (length, len_len) = parse_length(&remaining[tag_len..])?;
        result.push((tag, length));
        remaining = &remaining[tag_len + len_len..];
    }

    Ok(result)
}

/// Parse a BER tag (1-2 bytes)
fn parse_tag(data: &[u8]) -> Result<(u16, usize), Malformed> {
    let first = *data.first().ok_or(Malformed::UnexpectedEndTag)?;

    // Low 5 bits all set: the tag number continues in the next byte
    if (first & 0x1F) != 0x1F {
        return Ok((first as u16, 1));
    }

    let second = *data.get(1).ok_or(Malformed::UnexpectedEndTag)?;
    if (second & 0x80) != 0 {
        return Err(Malformed::TagTooLong);
    }

    Ok((((first as u16) << 8) | (second as u16), 2))
}

/// Parse a BER length (1-5 bytes)
fn parse_length(data: &[u8]) -> Result<(usize, usize), Malformed> {
    let first = *data.first().ok_or(Malformed::UnexpectedEndLength)?;

    // Short form (0-127)
    if (first & 0x80) == 0 {
        return Ok((first as usize, 1));
    }

    let num_bytes = (first & 0x7F) as usize;
    if num_bytes == 0 {
        return Err(Malformed::IndefiniteLength);
    }
    if num_bytes > 4 {
        return Err(Malformed::LengthTooLarge(num_bytes));
    }
    if data.len() < 1 + num_bytes {
        return Err(Malformed::UnexpectedEndLength);
    }

    let length = data[1..=num_bytes]
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);

    Ok((length, 1 + num_bytes))
}
