//! Avro binary encoding primitives.
//!
//! `long`/`int` are zigzag varints, `bytes`/`string` are length-prefixed, arrays are written as a
//! single counted block followed by the zero terminator. Readers accept multi-block arrays,
//! including negative block counts that carry a byte size.

use crate::foundation::SkusError;

const MAX_VARINT_BYTES: usize = 10;

#[derive(Default)]
pub struct AvroWriter {
    buf: Vec<u8>,
}

impl AvroWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn long(&mut self, value: i64) -> &mut Self {
        let mut n = ((value << 1) ^ (value >> 63)) as u64;
        loop {
            if n & !0x7f == 0 {
                self.buf.push(n as u8);
                break;
            }
            self.buf.push(((n & 0x7f) | 0x80) as u8);
            n >>= 7;
        }
        self
    }

    pub fn int(&mut self, value: i32) -> &mut Self {
        self.long(i64::from(value))
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.long(value.len() as i64);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    pub fn enum_index(&mut self, index: i32) -> &mut Self {
        self.int(index)
    }

    /// `["null", "string"]` union.
    pub fn optional_string(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            None => self.long(0),
            Some(value) => self.long(1).string(value),
        }
    }

    pub fn array<T>(&mut self, items: &[T], mut write: impl FnMut(&mut Self, &T)) -> &mut Self {
        if !items.is_empty() {
            self.long(items.len() as i64);
            for item in items {
                write(self, item);
            }
        }
        self.long(0)
    }

    pub fn string_array(&mut self, items: &[String]) -> &mut Self {
        self.array(items, |w, item| {
            w.string(item);
        })
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub struct AvroReader<'a> {
    schema: &'static str,
    input: &'a [u8],
    pos: usize,
}

impl<'a> AvroReader<'a> {
    pub fn new(schema: &'static str, input: &'a [u8]) -> Self {
        Self { schema, input, pos: 0 }
    }

    fn err(&self, details: impl Into<String>) -> SkusError {
        SkusError::codec(self.schema, format!("{} at offset {}", details.into(), self.pos))
    }

    pub fn long(&mut self) -> Result<i64, SkusError> {
        let mut n: u64 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let Some(&byte) = self.input.get(self.pos) else {
                return Err(self.err("truncated varint"));
            };
            self.pos += 1;
            n |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(((n >> 1) as i64) ^ -((n & 1) as i64));
            }
        }
        Err(self.err("varint too long"))
    }

    pub fn int(&mut self) -> Result<i32, SkusError> {
        let value = self.long()?;
        i32::try_from(value).map_err(|_| self.err(format!("int out of range: {value}")))
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, SkusError> {
        let len = self.long()?;
        let len = usize::try_from(len).map_err(|_| self.err(format!("negative length {len}")))?;
        let end = self.pos.checked_add(len).filter(|end| *end <= self.input.len()).ok_or_else(|| self.err("truncated bytes"))?;
        let out = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(out)
    }

    pub fn string(&mut self) -> Result<String, SkusError> {
        let raw = self.bytes()?;
        String::from_utf8(raw).map_err(|err| self.err(format!("invalid utf-8: {err}")))
    }

    pub fn enum_index(&mut self, symbols: usize) -> Result<usize, SkusError> {
        let index = self.int()?;
        usize::try_from(index).ok().filter(|i| *i < symbols).ok_or_else(|| self.err(format!("unknown enum index {index}")))
    }

    pub fn optional_string(&mut self) -> Result<Option<String>, SkusError> {
        match self.long()? {
            0 => Ok(None),
            1 => Ok(Some(self.string()?)),
            branch => Err(self.err(format!("bad union branch {branch}"))),
        }
    }

    pub fn array<T>(&mut self, mut read: impl FnMut(&mut Self) -> Result<T, SkusError>) -> Result<Vec<T>, SkusError> {
        let mut out = Vec::new();
        loop {
            let mut count = self.long()?;
            if count == 0 {
                return Ok(out);
            }
            if count < 0 {
                count = count.checked_neg().ok_or_else(|| self.err("bad block count"))?;
                // block byte size, unused
                self.long()?;
            }
            for _ in 0..count {
                out.push(read(self)?);
            }
        }
    }

    pub fn string_array(&mut self) -> Result<Vec<String>, SkusError> {
        self.array(|r| r.string())
    }

    pub fn finish(self) -> Result<(), SkusError> {
        if self.pos != self.input.len() {
            return Err(self.err(format!("{} trailing bytes", self.input.len() - self.pos)));
        }
        Ok(())
    }
}
