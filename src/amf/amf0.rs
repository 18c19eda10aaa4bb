//! AMF0 encoder and decoder
//!
//! Type markers:
//! ```text
//! 0x00 Number       0x01 Boolean     0x02 String      0x03 Object
//! 0x05 Null         0x06 Undefined   0x07 Reference   0x08 ECMA Array
//! 0x09 Object End   0x0A Strict Arr  0x0B Date        0x0C Long String
//! 0x0D Unsupported  0x0F XML         0x10 Typed Obj   0x11 AVM+ (AMF3)
//! ```
//!
//! Decoding is strict: truncated input, a missing object end marker or an
//! unknown marker (AVM+ included) is an [`AmfError`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::value::AmfValue;
use crate::error::AmfError;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_REFERENCE: u8 = 0x07;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;
const MARKER_XML_DOCUMENT: u8 = 0x0F;
const MARKER_TYPED_OBJECT: u8 = 0x10;

const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder. Keeps the reference table for one message.
#[derive(Debug, Default)]
pub struct Amf0Decoder {
    references: Vec<AmfValue>,
    depth: usize,
}

impl Amf0Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if !buf.has_remaining() {
            return Err(AmfError::UnexpectedEof);
        }
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(AmfError::NestingTooDeep);
        }

        self.depth += 1;
        let marker = buf.get_u8();
        let value = self.decode_value(marker, buf);
        self.depth -= 1;
        value
    }

    /// Decode values until the buffer is empty
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_NUMBER => {
                need(buf, 8)?;
                Ok(AmfValue::Number(buf.get_f64()))
            }
            MARKER_BOOLEAN => {
                need(buf, 1)?;
                Ok(AmfValue::Boolean(buf.get_u8() != 0))
            }
            MARKER_STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            MARKER_LONG_STRING => Ok(AmfValue::String(read_utf8_long(buf)?)),
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_UNDEFINED | MARKER_UNSUPPORTED => Ok(AmfValue::Undefined),
            MARKER_OBJECT => {
                let slot = self.reserve_reference();
                let properties = self.read_properties(buf)?;
                Ok(self.fill_reference(slot, AmfValue::Object(properties)))
            }
            MARKER_ECMA_ARRAY => {
                need(buf, 4)?;
                // Count is a hint only; the end marker terminates
                let _count = buf.get_u32();
                let slot = self.reserve_reference();
                let properties = self.read_properties(buf)?;
                Ok(self.fill_reference(slot, AmfValue::EcmaArray(properties)))
            }
            MARKER_TYPED_OBJECT => {
                let class_name = read_utf8(buf)?;
                let slot = self.reserve_reference();
                let properties = self.read_properties(buf)?;
                Ok(self.fill_reference(
                    slot,
                    AmfValue::TypedObject {
                        class_name,
                        properties,
                    },
                ))
            }
            MARKER_STRICT_ARRAY => {
                need(buf, 4)?;
                let count = buf.get_u32() as usize;
                let slot = self.reserve_reference();
                let mut elements = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    elements.push(self.decode(buf)?);
                }
                Ok(self.fill_reference(slot, AmfValue::Array(elements)))
            }
            MARKER_DATE => {
                need(buf, 10)?;
                let millis = buf.get_f64();
                let _timezone = buf.get_i16();
                Ok(AmfValue::Date(millis))
            }
            MARKER_XML_DOCUMENT => Ok(AmfValue::Xml(read_utf8_long(buf)?)),
            MARKER_REFERENCE => {
                need(buf, 2)?;
                let index = buf.get_u16();
                self.references
                    .get(index as usize)
                    .cloned()
                    .ok_or(AmfError::InvalidReference(index))
            }
            other => Err(AmfError::UnknownMarker(other)),
        }
    }

    /// Key/value pairs up to the empty key + 0x09 terminator
    fn read_properties(&mut self, buf: &mut Bytes) -> Result<HashMap<String, AmfValue>, AmfError> {
        let mut properties = HashMap::new();
        loop {
            let key = read_utf8(buf)?;
            if key.is_empty() {
                need(buf, 1)?;
                if buf.get_u8() != MARKER_OBJECT_END {
                    return Err(AmfError::InvalidObjectEnd);
                }
                return Ok(properties);
            }
            let value = self.decode(buf)?;
            properties.insert(key, value);
        }
    }

    fn reserve_reference(&mut self) -> usize {
        self.references.push(AmfValue::Null);
        self.references.len() - 1
    }

    fn fill_reference(&mut self, slot: usize, value: AmfValue) -> AmfValue {
        self.references[slot] = value.clone();
        value
    }
}

fn need(buf: &Bytes, n: usize) -> Result<(), AmfError> {
    if buf.remaining() < n {
        Err(AmfError::UnexpectedEof)
    } else {
        Ok(())
    }
}

fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    need(buf, 2)?;
    let len = buf.get_u16() as usize;
    read_str(buf, len)
}

fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    need(buf, 4)?;
    let len = buf.get_u32() as usize;
    read_str(buf, len)
}

fn read_str(buf: &mut Bytes, len: usize) -> Result<String, AmfError> {
    need(buf, len)?;
    let raw = buf.split_to(len);
    std::str::from_utf8(&raw)
        .map(str::to_owned)
        .map_err(|_| AmfError::InvalidUtf8)
}

/// AMF0 encoder
#[derive(Debug)]
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Take the encoded bytes, leaving the encoder empty
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Null => self.buf.put_u8(MARKER_NULL),
            AmfValue::Undefined => self.buf.put_u8(MARKER_UNDEFINED),
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(u8::from(*b));
            }
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::String(s) if s.len() > 0xFFFF => {
                self.buf.put_u8(MARKER_LONG_STRING);
                self.buf.put_u32(s.len() as u32);
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::String(s) => {
                self.buf.put_u8(MARKER_STRING);
                self.write_key(s);
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.write_properties(props);
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(props.len() as u32);
                self.write_properties(props);
            }
            AmfValue::TypedObject {
                class_name,
                properties,
            } => {
                self.buf.put_u8(MARKER_TYPED_OBJECT);
                self.write_key(class_name);
                self.write_properties(properties);
            }
            AmfValue::Array(elements) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(elements.len() as u32);
                for element in elements {
                    self.encode(element);
                }
            }
            AmfValue::Date(millis) => {
                self.buf.put_u8(MARKER_DATE);
                self.buf.put_f64(*millis);
                self.buf.put_i16(0);
            }
            AmfValue::Xml(s) => {
                self.buf.put_u8(MARKER_XML_DOCUMENT);
                self.buf.put_u32(s.len() as u32);
                self.buf.put_slice(s.as_bytes());
            }
        }
    }

    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    fn write_properties(&mut self, props: &HashMap<String, AmfValue>) {
        for (key, value) in props {
            self.write_key(key);
            self.encode(value);
        }
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
    }

    /// 16-bit length prefixed UTF-8, truncated on a char boundary
    fn write_key(&mut self, s: &str) {
        let mut len = s.len().min(0xFFFF);
        while !s.is_char_boundary(len) {
            len -= 1;
        }
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

pub fn decode_all(data: Bytes) -> Result<Vec<AmfValue>, AmfError> {
    let mut data = data;
    Amf0Decoder::new().decode_all(&mut data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_command_roundtrip() {
        let values = vec![
            AmfValue::from("connect"),
            AmfValue::from(1.0),
            AmfValue::object([
                ("app", AmfValue::from("live")),
                ("tcUrl", AmfValue::from("rtmp://localhost/live")),
                ("objectEncoding", AmfValue::from(0.0)),
            ]),
        ];
        let decoded = decode_all(encode_all(&values)).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_known_wire_bytes() {
        // "_result", 1.0, null
        let wire = encode_all(&[AmfValue::from("_result"), AmfValue::from(1.0), AmfValue::Null]);
        let mut expected = vec![0x02, 0x00, 0x07];
        expected.extend_from_slice(b"_result");
        expected.push(0x00);
        expected.extend_from_slice(&1.0f64.to_be_bytes());
        expected.push(0x05);
        assert_eq!(&wire[..], &expected[..]);
    }

    #[test]
    fn test_metadata_ecma_array() {
        let meta = AmfValue::EcmaArray(
            [
                ("width".to_string(), AmfValue::Number(1920.0)),
                ("stereo".to_string(), AmfValue::Boolean(true)),
            ]
            .into_iter()
            .collect(),
        );
        let values = vec![AmfValue::from("@setDataFrame"), AmfValue::from("onMetaData"), meta];
        assert_eq!(decode_all(encode_all(&values)).unwrap(), values);
    }

    #[test]
    fn test_nested_and_array_values() {
        let value = AmfValue::object([(
            "inner",
            AmfValue::Array(vec![AmfValue::Boolean(false), AmfValue::Undefined, AmfValue::Date(1.0e12)]),
        )]);
        assert_eq!(decode_all(encode_all(&[value.clone()])).unwrap(), vec![value]);
    }

    #[test]
    fn test_long_string_marker() {
        let long = "x".repeat(70_000);
        let wire = encode_all(&[AmfValue::from(long.as_str())]);
        assert_eq!(wire[0], MARKER_LONG_STRING);
        assert_eq!(decode_all(wire).unwrap(), vec![AmfValue::String(long)]);
    }

    #[test]
    fn test_reference_resolves_earlier_object() {
        let mut wire = BytesMut::new();
        wire.put_slice(&encode_all(&[AmfValue::object([("a", 1.0)])]));
        wire.put_slice(&[MARKER_REFERENCE, 0x00, 0x00]);
        let values = decode_all(wire.freeze()).unwrap();
        assert_eq!(values[0], values[1]);

        let bad = Bytes::from_static(&[MARKER_REFERENCE, 0x00, 0x04]);
        assert_eq!(decode_all(bad), Err(AmfError::InvalidReference(4)));
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let wire = encode_all(&[AmfValue::from("publish"), AmfValue::from(5.0)]);
        let truncated = wire.slice(..wire.len() - 3);
        assert_eq!(decode_all(truncated), Err(AmfError::UnexpectedEof));

        let open_object = Bytes::from_static(&[MARKER_OBJECT, 0x00, 0x01, b'a', MARKER_NULL]);
        assert_eq!(decode_all(open_object), Err(AmfError::UnexpectedEof));
    }

    #[test]
    fn test_bad_object_end() {
        let wire = Bytes::from_static(&[MARKER_OBJECT, 0x00, 0x00, 0x07]);
        assert_eq!(decode_all(wire), Err(AmfError::InvalidObjectEnd));
    }

    #[test]
    fn test_unknown_and_avmplus_markers() {
        assert_eq!(decode_all(Bytes::from_static(&[0x42])), Err(AmfError::UnknownMarker(0x42)));
        assert_eq!(decode_all(Bytes::from_static(&[0x11, 0x01])), Err(AmfError::UnknownMarker(0x11)));
    }

    #[test]
    fn test_invalid_utf8() {
        let wire = Bytes::from_static(&[MARKER_STRING, 0x00, 0x02, 0xC3, 0x28]);
        assert_eq!(decode_all(wire), Err(AmfError::InvalidUtf8));
    }

    #[test]
    fn test_nesting_limit() {
        let mut wire = Vec::new();
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            wire.extend_from_slice(&[MARKER_STRICT_ARRAY, 0, 0, 0, 1]);
        }
        wire.push(MARKER_NULL);
        assert_eq!(decode_all(Bytes::from(wire)), Err(AmfError::NestingTooDeep));
    }
}
