//! Compact decoder and encoder for the document tree.

use crate::value::{Map, Value};
use crate::{BencodeError, BencodeResult};

/// Maximum accepted nesting depth for decoded documents.
const MAX_DEPTH: usize = 64;

/// Decode one complete bencoded value, rejecting trailing bytes.
///
/// # Errors
///
/// Returns a [`BencodeError`] describing the first malformed token.
pub fn decode(input: &[u8]) -> BencodeResult<Value> {
    let mut decoder = Decoder { input, offset: 0 };
    let value = decoder.value(0)?;
    if decoder.offset != input.len() {
        return Err(BencodeError::Trailing {
            offset: decoder.offset,
        });
    }
    Ok(value)
}

/// Encode a value into its compact serialized form. Dictionary keys are
/// emitted in sorted order, producing canonical output.
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Integer(number) => {
            out.push(b'i');
            out.extend_from_slice(number.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(bytes) => {
            out.extend_from_slice(bytes.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(bytes);
        }
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Map(entries) => {
            out.push(b'd');
            for (key, item) in entries {
                out.extend_from_slice(key.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(key.as_bytes());
                encode_into(item, out);
            }
            out.push(b'e');
        }
    }
}

struct Decoder<'a> {
    input: &'a [u8],
    offset: usize,
}

impl Decoder<'_> {
    fn peek(&self) -> BencodeResult<u8> {
        self.input
            .get(self.offset)
            .copied()
            .ok_or(BencodeError::Truncated {
                offset: self.offset,
            })
    }

    fn bump(&mut self) -> BencodeResult<u8> {
        let byte = self.peek()?;
        self.offset += 1;
        Ok(byte)
    }

    fn value(&mut self, depth: usize) -> BencodeResult<Value> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::TooDeep { limit: MAX_DEPTH });
        }

        match self.peek()? {
            b'i' => self.integer(),
            b'l' => self.list(depth),
            b'd' => self.dictionary(depth),
            b'0'..=b'9' => Ok(Value::Bytes(self.byte_string()?)),
            byte => Err(BencodeError::Unexpected {
                byte,
                offset: self.offset,
            }),
        }
    }

    fn integer(&mut self) -> BencodeResult<Value> {
        let start = self.offset;
        self.bump()?; // 'i'

        let negative = self.peek()? == b'-';
        if negative {
            self.bump()?;
        }

        let digits_start = self.offset;
        while self.peek()? != b'e' {
            let byte = self.bump()?;
            if !byte.is_ascii_digit() {
                return Err(BencodeError::InvalidInteger { offset: start });
            }
        }
        let digits = &self.input[digits_start..self.offset];
        self.bump()?; // 'e'

        // Reject "i-e", "i-0e" and zero-padded forms.
        if digits.is_empty()
            || (digits.len() > 1 && digits[0] == b'0')
            || (negative && digits == b"0")
        {
            return Err(BencodeError::InvalidInteger { offset: start });
        }

        let text = std::str::from_utf8(digits).expect("digits are ASCII");
        let magnitude: i64 = text
            .parse()
            .map_err(|_| BencodeError::InvalidInteger { offset: start })?;
        Ok(Value::Integer(if negative { -magnitude } else { magnitude }))
    }

    fn byte_string(&mut self) -> BencodeResult<Vec<u8>> {
        let start = self.offset;
        let mut length: usize = 0;
        loop {
            let byte = self.bump()?;
            match byte {
                b'0'..=b'9' => {
                    length = length
                        .checked_mul(10)
                        .and_then(|len| len.checked_add(usize::from(byte - b'0')))
                        .ok_or(BencodeError::InvalidLength { offset: start })?;
                }
                b':' => break,
                _ => return Err(BencodeError::InvalidLength { offset: start }),
            }
        }

        let end = self
            .offset
            .checked_add(length)
            .filter(|end| *end <= self.input.len())
            .ok_or(BencodeError::Truncated {
                offset: self.input.len(),
            })?;
        let bytes = self.input[self.offset..end].to_vec();
        self.offset = end;
        Ok(bytes)
    }

    fn list(&mut self, depth: usize) -> BencodeResult<Value> {
        self.bump()?; // 'l'
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.value(depth + 1)?);
        }
        self.bump()?; // 'e'
        Ok(Value::List(items))
    }

    fn dictionary(&mut self, depth: usize) -> BencodeResult<Value> {
        self.bump()?; // 'd'
        let mut entries = Map::new();
        while self.peek()? != b'e' {
            let key_offset = self.offset;
            let raw_key = self.byte_string()?;
            let key = String::from_utf8(raw_key)
                .map_err(|_| BencodeError::NonUtf8Key { offset: key_offset })?;
            let value = self.value(depth + 1)?;
            entries.insert(key, value);
        }
        self.bump()?; // 'e'
        Ok(Value::Map(entries))
    }
}
