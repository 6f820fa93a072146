//! Codec for PHP `serialize()` blobs stored in legacy Drupal tables.
//!
//! Drupal 6/7 keeps variables, display settings and widget settings as
//! PHP-serialized strings. Source plugins decode them here, once, into
//! [`Value`] trees.
//!
//! Arrays whose keys are exactly `0..n` become [`Value::List`]; any other
//! array becomes a [`Value::Map`] with stringified keys. Objects decode to
//! maps of their properties.

use std::collections::BTreeMap;

use crate::core::value::Value;
use crate::error::{MigrateError, Result};

/// Decode a PHP-serialized string.
pub fn unserialize(input: &str) -> Result<Value> {
    let mut parser = Parser {
        bytes: input.as_bytes(),
        pos: 0,
    };
    let value = parser.value()?;
    if parser.pos != parser.bytes.len() {
        return Err(parser.error("trailing data after value"));
    }
    Ok(value)
}

/// Decode a value that may or may not be serialized.
///
/// Legacy columns sometimes hold plain strings where a serialized array is
/// expected; those pass through unchanged. Empty strings become NULL.
pub fn unserialize_lenient(value: &Value) -> Value {
    match value {
        Value::String(s) if s.is_empty() => Value::Null,
        Value::String(s) => unserialize(s).unwrap_or_else(|_| value.clone()),
        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => unserialize(s).unwrap_or_else(|_| value.clone()),
            Err(_) => value.clone(),
        },
        other => other.clone(),
    }
}

/// Encode a value the way PHP `serialize()` would.
pub fn serialize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("N;"),
        Value::Bool(b) => out.push_str(if *b { "b:1;" } else { "b:0;" }),
        Value::Int(i) => out.push_str(&format!("i:{};", i)),
        Value::Float(f) => out.push_str(&format!("d:{};", f)),
        Value::String(s) => out.push_str(&format!("s:{}:\"{}\";", s.len(), s)),
        Value::Bytes(b) => {
            let s = String::from_utf8_lossy(b);
            out.push_str(&format!("s:{}:\"{}\";", s.len(), s));
        }
        Value::List(items) => {
            out.push_str(&format!("a:{}:{{", items.len()));
            for (i, item) in items.iter().enumerate() {
                out.push_str(&format!("i:{};", i));
                write_value(out, item);
            }
            out.push('}');
        }
        Value::Map(entries) => {
            out.push_str(&format!("a:{}:{{", entries.len()));
            for (key, item) in entries {
                match key.parse::<i64>() {
                    Ok(i) if i.to_string() == *key => out.push_str(&format!("i:{};", i)),
                    _ => out.push_str(&format!("s:{}:\"{}\";", key.len(), key)),
                }
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> MigrateError {
        MigrateError::Codec {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    /// Read up to (not including) `terminator`, consuming the terminator.
    fn until(&mut self, terminator: u8) -> Result<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == terminator {
                let slice = &self.bytes[start..self.pos];
                self.pos += 1;
                return std::str::from_utf8(slice).map_err(|_| self.error("invalid UTF-8"));
            }
            self.pos += 1;
        }
        Err(self.error(&format!("missing '{}'", terminator as char)))
    }

    fn length(&mut self) -> Result<usize> {
        let raw = self.until(b':')?;
        raw.parse().map_err(|_| self.error("invalid length"))
    }

    fn value(&mut self) -> Result<Value> {
        let tag = self.peek().ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        match tag {
            b'N' => {
                self.expect(b';')?;
                Ok(Value::Null)
            }
            b'b' => {
                self.expect(b':')?;
                match self.until(b';')? {
                    "0" => Ok(Value::Bool(false)),
                    "1" => Ok(Value::Bool(true)),
                    _ => Err(self.error("invalid boolean")),
                }
            }
            b'i' => {
                self.expect(b':')?;
                let raw = self.until(b';')?;
                raw.parse()
                    .map(Value::Int)
                    .map_err(|_| self.error("invalid integer"))
            }
            b'd' => {
                self.expect(b':')?;
                let raw = self.until(b';')?;
                let parsed = match raw {
                    "INF" => Some(f64::INFINITY),
                    "-INF" => Some(f64::NEG_INFINITY),
                    "NAN" => Some(f64::NAN),
                    other => other.parse().ok(),
                };
                parsed
                    .map(Value::Float)
                    .ok_or_else(|| self.error("invalid float"))
            }
            b's' => {
                self.expect(b':')?;
                let s = self.string_body()?;
                self.expect(b';')?;
                Ok(Value::String(s))
            }
            b'a' => {
                self.expect(b':')?;
                let count = self.length()?;
                self.array_body(count)
            }
            b'O' => {
                self.expect(b':')?;
                // Class name is dropped; properties become a map.
                let _class = self.string_body()?;
                self.expect(b':')?;
                let count = self.length()?;
                match self.array_body(count)? {
                    Value::List(items) => Ok(Value::Map(
                        items
                            .into_iter()
                            .enumerate()
                            .map(|(i, v)| (i.to_string(), v))
                            .collect(),
                    )),
                    other => Ok(other),
                }
            }
            b'r' | b'R' => {
                self.expect(b':')?;
                self.until(b';')?;
                Ok(Value::Null)
            }
            _ => {
                self.pos -= 1;
                Err(self.error("unknown type tag"))
            }
        }
    }

    /// `<len>:"<bytes>"` where len counts bytes, not characters.
    fn string_body(&mut self) -> Result<String> {
        let len = self.length()?;
        self.expect(b'"')?;
        let slice = self
            .pos
            .checked_add(len)
            .and_then(|end| self.bytes.get(self.pos..end))
            .ok_or_else(|| self.error("string length exceeds input"))?;
        let end = self.pos + slice.len();
        let s = String::from_utf8_lossy(slice).into_owned();
        self.pos = end;
        self.expect(b'"')?;
        Ok(s)
    }

    fn array_body(&mut self, count: usize) -> Result<Value> {
        self.expect(b'{')?;
        // Every entry takes at least one byte, so the input bounds the count.
        let remaining = self.bytes.len().saturating_sub(self.pos);
        let mut entries: Vec<(String, Value)> = Vec::with_capacity(count.min(remaining));
        let mut sequential = true;
        for index in 0..count {
            let key = match self.value()? {
                Value::Int(i) => {
                    if i != index as i64 {
                        sequential = false;
                    }
                    i.to_string()
                }
                Value::String(s) => {
                    sequential = false;
                    s
                }
                _ => return Err(self.error("array key must be int or string")),
            };
            let value = self.value()?;
            entries.push((key, value));
        }
        self.expect(b'}')?;

        if sequential {
            Ok(Value::List(entries.into_iter().map(|(_, v)| v).collect()))
        } else {
            Ok(Value::Map(entries.into_iter().collect::<BTreeMap<_, _>>()))
        }
    }
}
