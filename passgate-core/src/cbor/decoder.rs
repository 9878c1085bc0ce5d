//! Streaming CBOR decoder (RFC 8949 subset used by WebAuthn).

use tracing::trace;

use super::{ByteStream, CborError, CborValue, OtherRegistry, TagRegistry};

/// Default nesting limit for arrays, maps and tags.
pub const DEFAULT_MAX_DEPTH: usize = 64;

const BREAK: u8 = 0xff;

enum Item {
    Value(CborValue),
    Break,
}

/// Decodes one data item at a time from a [`ByteStream`].
///
/// Tag and simple-value handling is delegated to the registries given at
/// construction, so callers decide which extensions are acceptable.
#[derive(Debug, Clone)]
pub struct Decoder {
    tags: TagRegistry,
    others: OtherRegistry,
    max_depth: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(TagRegistry::with_defaults(), OtherRegistry::with_defaults())
    }
}

impl Decoder {
    pub fn new(tags: TagRegistry, others: OtherRegistry) -> Self {
        Self {
            tags,
            others,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Decode the next complete value. Bytes after it are left in the stream.
    pub fn decode(&self, stream: &mut ByteStream<'_>) -> Result<CborValue, CborError> {
        let start = stream.position();
        let value = self.read_value(stream, 0)?;
        trace!(
            kind = value.type_name(),
            bytes = stream.position() - start,
            "Decoded CBOR value"
        );
        Ok(value)
    }

    /// Decode a buffer that must hold exactly one value.
    pub fn decode_all(&self, data: &[u8]) -> Result<CborValue, CborError> {
        let mut stream = ByteStream::new(data);
        let value = self.decode(&mut stream)?;
        stream.expect_eof()?;
        Ok(value)
    }

    fn read_value(&self, stream: &mut ByteStream<'_>, depth: usize) -> Result<CborValue, CborError> {
        match self.read_item(stream, depth)? {
            Item::Value(value) => Ok(value),
            Item::Break => Err(CborError::UnexpectedBreak),
        }
    }

    fn read_item(&self, stream: &mut ByteStream<'_>, depth: usize) -> Result<Item, CborError> {
        if depth > self.max_depth {
            return Err(CborError::DepthExceeded(self.max_depth));
        }

        let initial = stream.read_u8()?;
        let major = initial >> 5;
        let info = initial & 0x1f;

        match info {
            28..=30 => Err(CborError::ReservedAdditionalInfo(info)),
            31 => self.read_indefinite(major, stream, depth),
            _ => {
                let argument = read_argument(stream, info)?;
                self.read_definite(major, info, argument, stream, depth)
                    .map(Item::Value)
            }
        }
    }

    fn read_definite(
        &self,
        major: u8,
        info: u8,
        argument: u64,
        stream: &mut ByteStream<'_>,
        depth: usize,
    ) -> Result<CborValue, CborError> {
        match major {
            0 => Ok(CborValue::Unsigned(argument)),
            1 => Ok(CborValue::Negative(argument)),
            2 => {
                let len = checked_length(argument, 1, stream)?;
                Ok(CborValue::Bytes(stream.read(len)?.to_vec()))
            }
            3 => {
                let len = checked_length(argument, 1, stream)?;
                let text = std::str::from_utf8(stream.read(len)?)
                    .map_err(|_| CborError::InvalidUtf8)?;
                Ok(CborValue::Text(text.to_owned()))
            }
            4 => {
                let count = checked_length(argument, 1, stream)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value(stream, depth + 1)?);
                }
                Ok(CborValue::Array(items))
            }
            5 => {
                let count = checked_length(argument, 2, stream)?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = self.read_value(stream, depth + 1)?;
                    let value = self.read_value(stream, depth + 1)?;
                    entries.push((key, value));
                }
                Ok(CborValue::Map(entries))
            }
            6 => {
                let content = self.read_value(stream, depth + 1)?;
                self.tags.create(argument, content)
            }
            _ => self.others.create(info, argument),
        }
    }

    fn read_indefinite(
        &self,
        major: u8,
        stream: &mut ByteStream<'_>,
        depth: usize,
    ) -> Result<Item, CborError> {
        match major {
            2 | 3 => self.read_chunks(major, stream, depth).map(Item::Value),
            4 => {
                let mut items = Vec::new();
                loop {
                    match self.read_item(stream, depth + 1)? {
                        Item::Value(value) => items.push(value),
                        Item::Break => return Ok(Item::Value(CborValue::Array(items))),
                    }
                }
            }
            5 => {
                let mut entries = Vec::new();
                loop {
                    match self.read_item(stream, depth + 1)? {
                        Item::Value(key) => {
                            let value = self.read_value(stream, depth + 1)?;
                            entries.push((key, value));
                        }
                        Item::Break => return Ok(Item::Value(CborValue::Map(entries))),
                    }
                }
            }
            7 => Ok(Item::Break),
            _ => Err(CborError::InvalidIndefinite(major)),
        }
    }

    /// Concatenate the definite-length chunks of an indefinite string.
    fn read_chunks(
        &self,
        major: u8,
        stream: &mut ByteStream<'_>,
        depth: usize,
    ) -> Result<CborValue, CborError> {
        let mut bytes = Vec::new();
        let mut text = String::new();
        loop {
            let initial = stream.peek().ok_or(CborError::UnexpectedEnd {
                needed: 1,
                available: 0,
            })?;
            if initial == BREAK {
                stream.read_u8()?;
                break;
            }
            if initial >> 5 != major || initial & 0x1f == 31 {
                return Err(CborError::InvalidChunk(format!(
                    "initial byte 0x{initial:02x} inside indefinite major type {major}"
                )));
            }
            match self.read_value(stream, depth + 1)? {
                CborValue::Bytes(chunk) => bytes.extend_from_slice(&chunk),
                CborValue::Text(chunk) => text.push_str(&chunk),
                other => {
                    return Err(CborError::InvalidChunk(format!(
                        "unexpected {} chunk",
                        other.type_name()
                    )))
                }
            }
        }

        Ok(if major == 2 {
            CborValue::Bytes(bytes)
        } else {
            CborValue::Text(text)
        })
    }
}

fn read_argument(stream: &mut ByteStream<'_>, info: u8) -> Result<u64, CborError> {
    Ok(match info {
        0..=23 => info as u64,
        24 => stream.read_u8()? as u64,
        25 => stream.read_u16()? as u64,
        26 => stream.read_u32()? as u64,
        _ => stream.read_u64()?,
    })
}

/// Reject lengths that cannot fit in what is left of the input before
/// allocating anything for them.
fn checked_length(
    declared: u64,
    min_bytes_per_item: usize,
    stream: &ByteStream<'_>,
) -> Result<usize, CborError> {
    let available = stream.remaining() / min_bytes_per_item;
    match usize::try_from(declared) {
        Ok(len) if len <= available => Ok(len),
        _ => Err(CborError::LengthExceedsInput {
            declared,
            available: stream.remaining(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::super::OtherValue;
    use super::*;

    fn decode(hex_str: &str) -> Result<CborValue, CborError> {
        let bytes = hex::decode(hex_str).unwrap();
        Decoder::default().decode_all(&bytes)
    }

    #[test]
    fn test_integers() {
        assert_eq!(decode("00").unwrap(), CborValue::Unsigned(0));
        assert_eq!(decode("17").unwrap(), CborValue::Unsigned(23));
        assert_eq!(decode("1818").unwrap(), CborValue::Unsigned(24));
        assert_eq!(decode("1903e8").unwrap(), CborValue::Unsigned(1000));
        assert_eq!(
            decode("1bffffffffffffffff").unwrap(),
            CborValue::Unsigned(u64::MAX)
        );
        assert_eq!(decode("20").unwrap().as_i64(), Some(-1));
        assert_eq!(decode("3903e7").unwrap().as_i64(), Some(-1000));
    }

    #[test]
    fn test_strings_definite_and_indefinite() {
        assert_eq!(
            decode("4401020304").unwrap(),
            CborValue::Bytes(vec![1, 2, 3, 4])
        );
        assert_eq!(
            decode("5f42010243030405ff").unwrap(),
            CborValue::Bytes(vec![1, 2, 3, 4, 5])
        );
        assert_eq!(decode("6449455446").unwrap(), CborValue::text("IETF"));
        assert_eq!(
            decode("7f657374726561646d696e67ff").unwrap(),
            CborValue::text("streaming")
        );
    }

    #[test]
    fn test_indefinite_equals_definite() {
        assert_eq!(decode("9f010203ff").unwrap(), decode("83010203").unwrap());
        assert_eq!(
            decode("bf61610161629f0203ffff").unwrap(),
            decode("a26161016162820203").unwrap()
        );
    }

    #[test]
    fn test_mixed_chunk_is_rejected() {
        // Text chunk inside an indefinite byte string.
        assert!(matches!(
            decode("5f4101616100ff"),
            Err(CborError::InvalidChunk(_))
        ));
        // Nested indefinite chunk.
        assert!(matches!(
            decode("5f5f4101ffff"),
            Err(CborError::InvalidChunk(_))
        ));
    }

    #[test]
    fn test_break_outside_indefinite() {
        assert!(matches!(decode("ff"), Err(CborError::UnexpectedBreak)));
        assert!(matches!(decode("82ff01"), Err(CborError::UnexpectedBreak)));
        // Break where a map value is expected.
        assert!(matches!(decode("bf01ff"), Err(CborError::UnexpectedBreak)));
    }

    #[test]
    fn test_reserved_and_illegal_indefinite() {
        assert!(matches!(
            decode("1c"),
            Err(CborError::ReservedAdditionalInfo(28))
        ));
        assert!(matches!(decode("1f"), Err(CborError::InvalidIndefinite(0))));
        assert!(matches!(decode("df"), Err(CborError::InvalidIndefinite(6))));
    }

    #[test]
    fn test_tags_and_others() {
        assert_eq!(
            decode("c11a514b67b0").unwrap(),
            CborValue::Tag(1, Box::new(CborValue::Unsigned(1363896240)))
        );
        assert!(matches!(
            decode("d9ffff00"),
            Err(CborError::UnknownTag(0xffff))
        ));
        assert_eq!(decode("f4").unwrap().as_bool(), Some(false));
        assert_eq!(decode("f5").unwrap().as_bool(), Some(true));
        assert_eq!(decode("f6").unwrap(), CborValue::Other(OtherValue::Null));
        assert_eq!(
            decode("f7").unwrap(),
            CborValue::Other(OtherValue::Undefined)
        );
        assert_eq!(
            decode("f93c00").unwrap(),
            CborValue::Other(OtherValue::Float(1.0))
        );
        assert_eq!(
            decode("fa47c35000").unwrap(),
            CborValue::Other(OtherValue::Float(100000.0))
        );
        assert_eq!(
            decode("fb3ff199999999999a").unwrap(),
            CborValue::Other(OtherValue::Float(1.1))
        );
    }

    #[test]
    fn test_truncation_fails_and_trailing_bytes_remain() {
        assert!(matches!(
            decode("4401"),
            Err(CborError::LengthExceedsInput { .. })
        ));
        assert!(matches!(
            decode("8301"),
            Err(CborError::LengthExceedsInput { .. })
        ));
        assert!(matches!(
            decode("820102"),
            Ok(CborValue::Array(_))
        ));
        assert!(matches!(
            decode("a20102"),
            Err(CborError::LengthExceedsInput { .. })
        ));

        let bytes = hex::decode("0102").unwrap();
        let mut stream = ByteStream::new(&bytes);
        assert_eq!(
            Decoder::default().decode(&mut stream).unwrap(),
            CborValue::Unsigned(1)
        );
        assert_eq!(stream.remaining(), 1);
        assert!(matches!(
            Decoder::default().decode_all(&bytes),
            Err(CborError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_huge_declared_length_is_rejected() {
        assert!(matches!(
            decode("5bffffffffffffffff00"),
            Err(CborError::LengthExceedsInput { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(decode("62c328"), Err(CborError::InvalidUtf8)));
    }

    #[test]
    fn test_depth_limit() {
        let mut bytes = vec![0x81; 10];
        bytes.push(0x00);
        let decoder = Decoder::default().with_max_depth(4);
        assert!(matches!(
            decoder.decode_all(&bytes),
            Err(CborError::DepthExceeded(4))
        ));
        assert!(Decoder::default().decode_all(&bytes).is_ok());
    }

    #[test]
    fn test_agrees_with_ciborium_encoding() {
        use ciborium::value::Value;

        let value = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Integer((-7).into()), Value::Bytes(vec![9; 40])),
            (Value::Text("list".into()), Value::Array(vec![Value::Bool(true), Value::Null])),
        ]);
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&value, &mut encoded).unwrap();

        let decoded = Decoder::default().decode_all(&encoded).unwrap();
        assert_eq!(decoded.get("fmt").and_then(CborValue::as_text), Some("none"));
        assert_eq!(decoded.get_int(-7).and_then(CborValue::as_bytes), Some(&[9u8; 40][..]));
        assert_eq!(
            decoded.get("list"),
            Some(&CborValue::Array(vec![
                CborValue::Other(OtherValue::True),
                CborValue::Other(OtherValue::Null)
            ]))
        );
    }
}
