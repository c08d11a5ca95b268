//! OpenPGP data-object templates for ECC keys
//!
//! Pure constructors for the objects sent to the card, and readers for the
//! objects it returns:
//!
//! - signature value `30 { 02 r, 02 s }`
//! - private key import `4D { <CRT> 00, 7F48 <lengths>, 5F48 <private || public> }`
//! - ECDH cipher DO `A6 { 7F49 { 86 <point> } }`
//! - public key `7F49 { 86 <point> }` or `7F49 { 81 <n/x>, 82 <e/y> }`

use super::KeySlot;
use crate::crypto::EccCurve;
use crate::tlv::{read_taglen_list, tags, Malformed, TLVEncoder, TLVError, TLV};

/// Public key fields of a `7F49` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyComponents {
    /// Tag 86: uncompressed point `04 || x || y`
    Point(Vec<u8>),
    /// Tags 81 and 82: modulus and exponent, or x and y
    Split { n: Vec<u8>, e: Vec<u8> },
}

impl PublicKeyComponents {
    /// Locate the components anywhere in `tlv`
    ///
    /// Tag 86 wins when both forms are present.
    pub fn from_tlv(tlv: &TLV) -> Result<Self, TLVError> {
        if let Some(point) = tlv.find(tags::ECC_PUBLIC_KEY) {
            return Ok(PublicKeyComponents::Point(point.value_bytes()));
        }

        match (tlv.find(tags::RSA_MODULUS), tlv.find(tags::RSA_EXPONENT)) {
            (Some(n), Some(e)) => Ok(PublicKeyComponents::Split {
                n: n.value_bytes(),
                e: e.value_bytes(),
            }),
            (Some(_), None) => Err(TLVError::MissingTag(tags::RSA_EXPONENT)),
            (None, Some(_)) => Err(TLVError::MissingTag(tags::RSA_MODULUS)),
            (None, None) => Err(TLVError::MissingTag(tags::ECC_PUBLIC_KEY)),
        }
    }

    /// The point, if the key came in the 86 form
    pub fn point(&self) -> Option<&[u8]> {
        match self {
            PublicKeyComponents::Point(point) => Some(point),
            PublicKeyComponents::Split { .. } => None,
        }
    }

    /// Flatten to a pair; the second element is empty for the point form
    pub fn into_pair(self) -> (Vec<u8>, Vec<u8>) {
        match self {
            PublicKeyComponents::Point(point) => (point, Vec::new()),
            PublicKeyComponents::Split { n, e } => (n, e),
        }
    }
}

/// Key material carried by a private key import template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyImport {
    /// Tag of the first element, the CRT selecting the slot
    pub key_type: u16,
    /// Component tag, as declared in `7F48`, with its bytes from `5F48`
    pub components: Vec<(u16, Vec<u8>)>,
}

impl KeyImport {
    /// Bytes of the component declared with `tag`
    pub fn component(&self, tag: u16) -> Option<&[u8]> {
        self.components
            .iter()
            .find(|(component, _)| *component == tag)
            .map(|(_, bytes)| bytes.as_slice())
    }
}

/// Encode an unsigned big-endian value as DER INTEGER content
///
/// Leading zero bytes are dropped and a single zero is prefixed when the
/// high bit is set, so the integer stays positive.
fn der_unsigned(value: &[u8]) -> Vec<u8> {
    let start = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    let trimmed = &value[start..];

    match trimmed.first() {
        None => vec![0x00],
        Some(&first) if first & 0x80 != 0 => [&[0x00][..], trimmed].concat(),
        Some(_) => trimmed.to_vec(),
    }
}

/// Build the signature value `30 { 02 r, 02 s }`
pub fn signature_container(r: &[u8], s: &[u8]) -> TLV {
    TLV::constructed(
        tags::SEQUENCE,
        vec![
            TLV::new(tags::INTEGER, der_unsigned(r)),
            TLV::new(tags::INTEGER, der_unsigned(s)),
        ],
    )
}

/// Wrap a raw card signature `r || s` into a signature value
///
/// Returns `None` when the input cannot be split into two equal halves.
pub fn raw_signature_to_container(signature: &[u8]) -> Option<TLV> {
    if signature.is_empty() || signature.len() % 2 != 0 {
        return None;
    }
    let (r, s) = signature.split_at(signature.len() / 2);
    Some(signature_container(r, s))
}

/// Read `r` and `s` back from an encoded signature value
pub fn signature_components(container: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TLVError> {
    let sequence = TLV::parse(container)?;
    let mut integers = sequence
        .children()
        .iter()
        .filter(|child| child.tag() == tags::INTEGER)
        .map(TLV::value_bytes);

    match (integers.next(), integers.next()) {
        (Some(r), Some(s)) => Ok((r, s)),
        _ => Err(TLVError::MissingTag(tags::INTEGER)),
    }
}

/// Build the private key import template (extended header list `4D`)
///
/// `key_type` is the CRT of the target slot. `7F48` only declares the
/// component sizes; the components travel concatenated in `5F48`.
///
/// `4D` has no constructed bit, so [`TLV::parse`] keeps the encoded value as
/// bytes and `find(0x7F48)` on the result is `None`. Read the template back
/// with [`parse_private_key_template`] or [`TLV::read_nested`].
pub fn private_key_template(key_type: u16, private_key: &[u8], public_key: &[u8]) -> TLV {
    let mut lengths = TLVEncoder::encode_taglen(tags::ECC_PRIVATE_KEY, private_key.len());
    lengths.extend(TLVEncoder::encode_taglen(tags::ECC_IMPORT_PUBLIC_KEY, public_key.len()));

    TLV::constructed(
        tags::EXTENDED_HEADER_LIST,
        vec![
            TLV::empty(key_type),
            TLV::new(tags::PRIVATE_KEY_TEMPLATE, lengths),
            TLV::new(tags::CONCATENATED_KEY_DATA, [private_key, public_key].concat()),
        ],
    )
}

/// Read a private key import template
///
/// `5F48` is cut into the components declared by `7F48`; the declared
/// sizes must account for every byte.
pub fn parse_private_key_template(data: &[u8]) -> Result<KeyImport, TLVError> {
    let header = TLV::parse(data)?;
    if header.tag() != tags::EXTENDED_HEADER_LIST {
        return Err(TLVError::MissingTag(tags::EXTENDED_HEADER_LIST));
    }

    // 4D lacks the constructed bit, so its children are read explicitly
    let elements = header.read_nested(false)?;
    let key_type = elements
        .first()
        .map(TLV::tag)
        .ok_or(TLVError::MissingTag(tags::EXTENDED_HEADER_LIST))?;

    let find = |tag: u16| {
        elements
            .iter()
            .find(|element| element.tag() == tag)
            .map(TLV::value_bytes)
            .ok_or(TLVError::MissingTag(tag))
    };
    let declared = read_taglen_list(&find(tags::PRIVATE_KEY_TEMPLATE)?)?;
    let key_data = find(tags::CONCATENATED_KEY_DATA)?;

    let mut components = Vec::with_capacity(declared.len());
    let mut rest = key_data.as_slice();
    for (tag, length) in declared {
        if length > rest.len() {
            return Err(Malformed::UnexpectedEndValue {
                declared: length,
                available: rest.len(),
            }
            .into());
        }
        let (component, tail) = rest.split_at(length);
        components.push((tag, component.to_vec()));
        rest = tail;
    }
    if !rest.is_empty() {
        return Err(Malformed::TrailingBytes(rest.len()).into());
    }

    Ok(KeyImport { key_type, components })
}

/// Build the ECDH cipher DO `A6 { 7F49 { 86 point } }` for PSO:DECIPHER
pub fn ecdh_public_key_container(point: &[u8]) -> TLV {
    TLV::constructed(tags::CIPHER_DO, vec![public_key_template(point)])
}

/// Read the peer point out of an ECDH cipher DO
pub fn ecdh_point_from_container(data: &[u8]) -> Result<Vec<u8>, TLVError> {
    let container = TLV::parse(data)?;
    if container.tag() != tags::CIPHER_DO {
        return Err(TLVError::MissingTag(tags::CIPHER_DO));
    }
    Ok(container.require(tags::ECC_PUBLIC_KEY)?.value_bytes())
}

/// Build a public key response `7F49 { 86 point }`
pub fn public_key_template(point: &[u8]) -> TLV {
    TLV::constructed(
        tags::PUBLIC_KEY_TEMPLATE,
        vec![TLV::new(tags::ECC_PUBLIC_KEY, point.to_vec())],
    )
}

/// Extract the public key fields of a key generation response
pub fn public_key_components(response: &[u8]) -> Result<PublicKeyComponents, TLVError> {
    PublicKeyComponents::from_tlv(&TLV::parse(response)?)
}

/// Algorithm attributes DO value for an ECC key: algorithm ID then curve OID
pub fn algorithm_attributes(slot: KeySlot, curve: EccCurve) -> Vec<u8> {
    let mut attributes = vec![slot.ecc_algorithm_id()];
    attributes.extend_from_slice(curve.oid());
    attributes
}

/// Curve named by an algorithm attributes DO value
///
/// A trailing import-format byte `FF` is accepted.
pub fn curve_from_attributes(attributes: &[u8]) -> Option<EccCurve> {
    let (&algorithm, oid) = attributes.split_first()?;
    if algorithm != 0x12 && algorithm != 0x13 {
        return None;
    }
    let oid = oid.strip_suffix(&[0xFF]).unwrap_or(oid);
    EccCurve::from_oid(oid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::TLVBuilder;

    #[test]
    fn test_signature_container() {
        let encoded = signature_container(&[0x01, 0x02], &[0x03, 0x04]).encode();
        assert_eq!(hex::encode_upper(&encoded), "30080202010202020304");
    }

    #[test]
    fn test_signature_integer_normalization() {
        let encoded = signature_container(&[0x00, 0x00, 0x7F], &[0x80, 0x01]).encode();
        assert_eq!(hex::encode_upper(encoded), "300702017F0203008001");

        let encoded = signature_container(&[0x00], &[]).encode();
        assert_eq!(hex::encode_upper(encoded), "3006020100020100");
    }

    #[test]
    fn test_raw_signature_split() {
        let container = raw_signature_to_container(&[0x01, 0x02, 0x03, 0x04]).unwrap();
        assert_eq!(container, signature_container(&[0x01, 0x02], &[0x03, 0x04]));
        assert!(raw_signature_to_container(&[0x01, 0x02, 0x03]).is_none());
        assert!(raw_signature_to_container(&[]).is_none());
    }

    #[test]
    fn test_signature_components() {
        let encoded = hex::decode("30080202010202020304").unwrap();
        assert_eq!(
            signature_components(&encoded).unwrap(),
            (vec![0x01, 0x02], vec![0x03, 0x04])
        );
        assert_eq!(
            signature_components(&hex::decode("3004020201FF").unwrap()),
            Err(TLVError::MissingTag(tags::INTEGER))
        );
    }

    #[test]
    fn test_private_key_template() {
        let private_key = [0x11u8; 16];
        let public_key = [0x22u8; 33];
        let template = private_key_template(0xC1, &private_key, &public_key);
        let encoded = template.encode();

        let mut expected = hex::decode("4D3DC1007F4804921099215F4831").unwrap();
        expected.extend_from_slice(&private_key);
        expected.extend_from_slice(&public_key);
        assert_eq!(encoded, expected);
        assert_eq!(template.len(), 0x3D);
    }

    #[test]
    fn test_private_key_template_read_back() {
        let private_key = [0x5Au8; 32];
        let public_key = [0x04u8; 65];
        let encoded = private_key_template(tags::CRT_AUT, &private_key, &public_key).encode();

        let import = parse_private_key_template(&encoded).unwrap();
        assert_eq!(import.key_type, tags::CRT_AUT);
        assert_eq!(import.component(tags::ECC_PRIVATE_KEY), Some(&private_key[..]));
        assert_eq!(import.component(tags::ECC_IMPORT_PUBLIC_KEY), Some(&public_key[..]));
        assert_eq!(import.component(0x93), None);
    }

    #[test]
    fn test_private_key_template_long_lengths() {
        // P-521 sized components need the 0x81 length form everywhere
        let private_key = [0x01u8; 66];
        let public_key = [0x04u8; 133];
        let encoded = private_key_template(tags::CRT_SIG, &private_key, &public_key).encode();
        assert_eq!(&encoded[..3], &[0x4D, 0x81, 0xD5]);
        assert_eq!(encoded.len(), 3 + 0xD5);

        let parsed = TLV::parse(&encoded).unwrap();
        assert!(!parsed.is_constructed());
        assert!(parsed.find(tags::PRIVATE_KEY_TEMPLATE).is_none());

        let elements = parsed.read_nested(false).unwrap();
        assert_eq!(
            elements[1].bytes().unwrap(),
            hex::decode("9242998185").unwrap()
        );

        let import = parse_private_key_template(&encoded).unwrap();
        assert_eq!(import.key_type, tags::CRT_SIG);
        assert_eq!(import.component(tags::ECC_IMPORT_PUBLIC_KEY), Some(&public_key[..]));
    }

    #[test]
    fn test_private_key_template_length_mismatch() {
        // 7F48 declares 3 bytes of 92 but 5F48 carries 4
        let data = hex::decode("4D0EB6007F480292035F480401020304").unwrap();
        assert_eq!(
            parse_private_key_template(&data),
            Err(TLVError::MalformedEncoding(Malformed::TrailingBytes(1)))
        );

        let data = hex::decode("4D0BB6007F480292055F4801AA").unwrap();
        assert!(matches!(
            parse_private_key_template(&data),
            Err(TLVError::MalformedEncoding(Malformed::UnexpectedEndValue { .. }))
        ));

        let data = hex::decode("4D07B6007F48029200").unwrap();
        assert_eq!(
            parse_private_key_template(&data),
            Err(TLVError::MissingTag(tags::CONCATENATED_KEY_DATA))
        );
    }

    #[test]
    fn test_ecdh_container() {
        let point = [0x04, 0xAA, 0xBB];
        let encoded = ecdh_public_key_container(&point).encode();
        assert_eq!(hex::encode_upper(&encoded), "A6087F4905860304AABB");
        assert_eq!(ecdh_point_from_container(&encoded).unwrap(), point);

        assert_eq!(
            ecdh_point_from_container(&public_key_template(&point).encode()),
            Err(TLVError::MissingTag(tags::CIPHER_DO))
        );
    }

    #[test]
    fn test_public_key_point_form() {
        let response = public_key_template(&[0x04, 0x01, 0x02]).encode();
        let components = public_key_components(&response).unwrap();
        assert_eq!(components.point(), Some(&[0x04, 0x01, 0x02][..]));
        assert_eq!(components.into_pair(), (vec![0x04, 0x01, 0x02], Vec::new()));
    }

    #[test]
    fn test_public_key_split_form() {
        let response = TLVBuilder::new()
            .add(tags::RSA_MODULUS, &[0xC3; 4])
            .add(tags::RSA_EXPONENT, &[0x01, 0x00, 0x01])
            .wrap(tags::PUBLIC_KEY_TEMPLATE)
            .build();
        let components = public_key_components(&response).unwrap();
        assert!(components.point().is_none());
        assert_eq!(components.into_pair(), (vec![0xC3; 4], vec![0x01, 0x00, 0x01]));
    }

    #[test]
    fn test_public_key_point_wins() {
        let response = TLVBuilder::new()
            .add(tags::RSA_MODULUS, &[0x01])
            .add(tags::RSA_EXPONENT, &[0x02])
            .add(tags::ECC_PUBLIC_KEY, &[0x04, 0x03])
            .wrap(tags::PUBLIC_KEY_TEMPLATE)
            .build();
        assert_eq!(
            public_key_components(&response).unwrap(),
            PublicKeyComponents::Point(vec![0x04, 0x03])
        );
    }

    #[test]
    fn test_public_key_missing() {
        let only_modulus = TLVBuilder::new()
            .add(tags::RSA_MODULUS, &[0x01])
            .wrap(tags::PUBLIC_KEY_TEMPLATE)
            .build();
        assert_eq!(
            public_key_components(&only_modulus),
            Err(TLVError::MissingTag(tags::RSA_EXPONENT))
        );
        assert_eq!(
            public_key_components(&[0x7F, 0x49, 0x00]),
            Err(TLVError::MissingTag(tags::ECC_PUBLIC_KEY))
        );
    }

    #[test]
    fn test_algorithm_attributes() {
        let attributes = algorithm_attributes(KeySlot::Signature, EccCurve::P384);
        assert_eq!(hex::encode_upper(&attributes), "132B81040022");
        assert_eq!(curve_from_attributes(&attributes), Some(EccCurve::P384));

        let attributes = algorithm_attributes(KeySlot::Decryption, EccCurve::P256);
        assert_eq!(hex::encode_upper(&attributes), "122A8648CE3D030107");

        let mut with_format = attributes.clone();
        with_format.push(0xFF);
        assert_eq!(curve_from_attributes(&with_format), Some(EccCurve::P256));

        // RSA 2048
        assert_eq!(curve_from_attributes(&hex::decode("010800002000").unwrap()), None);
        assert_eq!(curve_from_attributes(&[]), None);
    }
}
