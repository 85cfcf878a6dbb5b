//! AMF0 encoder and decoder
//!
//! Type markers handled:
//! ```text
//! 0x00 Number      0x01 Boolean     0x02 String      0x03 Object
//! 0x05 Null        0x06 Undefined   0x08 ECMA Array  0x09 Object End
//! 0x0A Strict Arr  0x0B Date        0x0C Long String 0x10 Typed Object
//! ```
//! Everything else is rejected, or read as `Undefined` when lenient.

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
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;
const MARKER_TYPED_OBJECT: u8 = 0x10;

/// Limit on object/array nesting
const MAX_NESTING_DEPTH: usize = 32;

/// AMF0 decoder
///
/// Lenient by default: encoders in the field omit object end markers and
/// occasionally emit markers we do not model.
pub struct Amf0Decoder {
    lenient: bool,
    depth: usize,
}

impl Amf0Decoder {
    pub fn new() -> Self {
        Self {
            lenient: true,
            depth: 0,
        }
    }

    pub fn strict() -> Self {
        Self {
            lenient: false,
            depth: 0,
        }
    }

    /// Decode a single value
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode values until the buffer is exhausted
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
                if buf.remaining() < 8 {
                    return Err(AmfError::UnexpectedEof);
                }
                Ok(AmfValue::Number(buf.get_f64()))
            }
            MARKER_BOOLEAN => {
                if buf.is_empty() {
                    return Err(AmfError::UnexpectedEof);
                }
                Ok(AmfValue::Boolean(buf.get_u8() != 0))
            }
            MARKER_STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            MARKER_LONG_STRING => Ok(AmfValue::String(read_utf8_long(buf)?)),
            MARKER_OBJECT => Ok(AmfValue::Object(self.decode_properties(buf)?)),
            MARKER_TYPED_OBJECT => {
                let _class_name = read_utf8(buf)?;
                Ok(AmfValue::Object(self.decode_properties(buf)?))
            }
            MARKER_ECMA_ARRAY => {
                if buf.remaining() < 4 {
                    return Err(AmfError::UnexpectedEof);
                }
                // Count is a hint only; the end marker terminates
                let _count = buf.get_u32();
                Ok(AmfValue::EcmaArray(self.decode_properties(buf)?))
            }
            MARKER_STRICT_ARRAY => {
                if buf.remaining() < 4 {
                    return Err(AmfError::UnexpectedEof);
                }
                let count = buf.get_u32() as usize;
                let mut elements = Vec::with_capacity(count.min(256));
                for _ in 0..count {
                    elements.push(self.decode(buf)?);
                }
                Ok(AmfValue::Array(elements))
            }
            MARKER_DATE => {
                if buf.remaining() < 10 {
                    return Err(AmfError::UnexpectedEof);
                }
                let millis = buf.get_f64();
                let _timezone = buf.get_i16();
                Ok(AmfValue::Date(millis))
            }
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_UNDEFINED | MARKER_UNSUPPORTED => Ok(AmfValue::Undefined),
            _ if self.lenient => Ok(AmfValue::Undefined),
            _ => Err(AmfError::UnknownMarker(marker)),
        }
    }

    /// Read `key, value` pairs up to the `00 00 09` terminator
    fn decode_properties(
        &mut self,
        buf: &mut Bytes,
    ) -> Result<HashMap<String, AmfValue>, AmfError> {
        let mut properties = HashMap::new();

        loop {
            if buf.is_empty() && self.lenient {
                break;
            }
            let key = read_utf8(buf)?;

            if key.is_empty() {
                if buf.is_empty() {
                    if self.lenient {
                        break;
                    }
                    return Err(AmfError::UnexpectedEof);
                }
                let end = buf.get_u8();
                if end == MARKER_OBJECT_END || self.lenient {
                    break;
                }
                return Err(AmfError::InvalidObjectEnd);
            }

            let value = self.decode(buf)?;
            properties.insert(key, value);
        }

        Ok(properties)
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 2 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    read_utf8_bytes(buf, len)
}

fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 4 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u32() as usize;
    read_utf8_bytes(buf, len)
}

fn read_utf8_bytes(buf: &mut Bytes, len: usize) -> Result<String, AmfError> {
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// AMF0 encoder
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
            AmfValue::String(s) => {
                if s.len() > 0xFFFF {
                    self.buf.put_u8(MARKER_LONG_STRING);
                    self.buf.put_u32(s.len() as u32);
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.buf.put_u16(s.len() as u16);
                }
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.encode_properties(props);
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(props.len() as u32);
                self.encode_properties(props);
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
        }
    }

    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    fn encode_properties(&mut self, props: &HashMap<String, AmfValue>) {
        for (key, value) in props {
            let len = key.len().min(0xFFFF);
            self.buf.put_u16(len as u16);
            self.buf.put_slice(&key.as_bytes()[..len]);
            self.encode(value);
        }
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a sequence of values into one payload
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Decode every value in a payload
pub fn decode_all(data: Bytes) -> Result<Vec<AmfValue>, AmfError> {
    let mut buf = data;
    Amf0Decoder::new().decode_all(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_command_values() {
        let command_object = AmfValue::object([
            ("app", AmfValue::from("live")),
            ("tcUrl", AmfValue::from("rtmp://camera.local/live")),
            ("objectEncoding", AmfValue::Number(0.0)),
        ]);
        let values = vec![
            AmfValue::from("connect"),
            AmfValue::Number(1.0),
            command_object.clone(),
        ];

        let decoded = decode_all(encode_all(&values)).unwrap();

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].as_str(), Some("connect"));
        assert_eq!(decoded[1].as_number(), Some(1.0));
        assert_eq!(decoded[2].get_string("app"), Some("live"));
        assert_eq!(decoded[2], command_object);
    }

    #[test]
    fn test_publish_arguments_with_null() {
        let values = vec![
            AmfValue::from("publish"),
            AmfValue::Number(5.0),
            AmfValue::Null,
            AmfValue::from("abc"),
            AmfValue::from("live"),
        ];

        let decoded = decode_all(encode_all(&values)).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_lenient_missing_object_end() {
        // Object with one property and no 00 00 09 terminator
        let data = Bytes::from_static(&[
            MARKER_OBJECT,
            0x00, 0x03, b'a', b'p', b'p',
            MARKER_STRING, 0x00, 0x04, b'l', b'i', b'v', b'e',
        ]);

        let value = decode_all(data).unwrap();
        assert_eq!(value[0].get_string("app"), Some("live"));
    }

    #[test]
    fn test_strict_rejects_unknown_marker() {
        let mut buf = Bytes::from_static(&[0x7F]);
        let result = Amf0Decoder::strict().decode(&mut buf);
        assert_eq!(result, Err(AmfError::UnknownMarker(0x7F)));

        let mut buf = Bytes::from_static(&[0x7F]);
        assert_eq!(Amf0Decoder::new().decode(&mut buf), Ok(AmfValue::Undefined));
    }

    #[test]
    fn test_reference_marker_is_unknown() {
        // 0x07 references are never resolved
        let mut buf = Bytes::from_static(&[0x07, 0x00, 0x01]);
        let result = Amf0Decoder::strict().decode(&mut buf);
        assert_eq!(result, Err(AmfError::UnknownMarker(0x07)));
    }

    #[test]
    fn test_truncated_number() {
        let mut buf = Bytes::from_static(&[MARKER_NUMBER, 0x40, 0x00]);
        assert_eq!(Amf0Decoder::new().decode(&mut buf), Err(AmfError::UnexpectedEof));
    }

    #[test]
    fn test_nesting_limit() {
        let mut value = AmfValue::Null;
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            value = AmfValue::Array(vec![value]);
        }

        let result = decode_all(encode_all(&[value]));
        assert_eq!(result, Err(AmfError::NestingTooDeep));
    }

    #[test]
    fn test_metadata_ecma_array() {
        let mut props = HashMap::new();
        props.insert("width".to_string(), AmfValue::Number(1920.0));
        props.insert("videocodecid".to_string(), AmfValue::Number(7.0));
        let values = vec![
            AmfValue::from("@setDataFrame"),
            AmfValue::from("onMetaData"),
            AmfValue::EcmaArray(props),
        ];

        let decoded = decode_all(encode_all(&values)).unwrap();
        assert_eq!(decoded[2].get_number("width"), Some(1920.0));
        assert_eq!(decoded[2].get_number("videocodecid"), Some(7.0));
    }
}
