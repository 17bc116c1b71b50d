//! Primitive reader/writer for the snapshot wire format.

use crate::error::{GraphError, Result};

/// Append-only writer over a growable buffer.
#[derive(Debug, Default)]
pub struct SerWriter {
    buf: Vec<u8>,
}

impl SerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed byte buffer.
    pub fn write_buffer(&mut self, bytes: &[u8]) {
        self.write_u64(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed, NUL-terminated string; the prefix counts the
    /// terminator.
    pub fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64 + 1);
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }
}

/// Cursor over a snapshot buffer.
#[derive(Clone, Copy, Debug)]
pub struct SerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SerReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(GraphError::Corruption(format!(
                "snapshot truncated: wanted {n} bytes, {} left",
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    pub fn read_buffer(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u64()? as usize;
        self.take(len)
    }

    pub fn read_str(&mut self) -> Result<String> {
        let bytes = self.read_buffer()?;
        let without_nul = match bytes.last() {
            Some(0) => &bytes[..bytes.len() - 1],
            _ => return Err(GraphError::Corruption("string missing terminator".into())),
        };
        String::from_utf8(without_nul.to_vec())
            .map_err(|_| GraphError::Corruption("string is not valid UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_primitives() {
        let mut w = SerWriter::new();
        w.write_u64(42);
        w.write_i64(-7);
        w.write_f64(1.5);
        w.write_f32(0.25);
        w.write_str("hello");
        w.write_buffer(&[1, 2, 3]);
        let bytes = w.into_bytes();

        let mut r = SerReader::new(&bytes);
        assert_eq!(r.read_u64().unwrap(), 42);
        assert_eq!(r.read_i64().unwrap(), -7);
        assert_eq!(r.read_f64().unwrap(), 1.5);
        assert_eq!(r.read_f32().unwrap(), 0.25);
        assert_eq!(r.read_str().unwrap(), "hello");
        assert_eq!(r.read_buffer().unwrap(), &[1, 2, 3]);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn truncation_is_typed() {
        let mut r = SerReader::new(&[1, 2]);
        assert!(matches!(r.read_u64(), Err(GraphError::Corruption(_))));
    }
}
